use super::Point;

/// An axis-aligned rectangle in logical coordinates.
///
/// The default rectangle is *invalid* (left > right): an invalid rect is the
/// identity for [`Rect::union`] and signals "no area" to callers, so dirty
/// regions and bounds accumulators can start from `Rect::default()`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Default for Rect {
    fn default() -> Self {
        Self {
            left: f32::MAX,
            top: f32::MAX,
            right: -f32::MAX,
            bottom: -f32::MAX,
        }
    }
}

impl Rect {
    /// Construct from left/top/right/bottom edges.
    pub fn ltrb(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Construct from left/top corner plus width and height.
    pub fn ltwh(left: f32, top: f32, w: f32, h: f32) -> Self {
        Self::ltrb(left, top, left + w, top + h)
    }

    /// Construct at the origin with the given size.
    pub fn wh(w: f32, h: f32) -> Self {
        Self::ltrb(0.0, 0.0, w, h)
    }

    /// Construct centered on a point with the given size.
    pub fn centerwh(center: Point, w: f32, h: f32) -> Self {
        Self::ltwh(center.x - w / 2.0, center.y - h / 2.0, w, h)
    }

    /// A rect is valid when it has non-negative extent on both axes.
    pub fn is_valid(&self) -> bool {
        self.right >= self.left && self.bottom >= self.top
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    pub fn origin(&self) -> Point {
        Point::new(self.left, self.top)
    }

    pub fn center(&self) -> Point {
        Point::new(
            (self.left + self.right) / 2.0,
            (self.top + self.bottom) / 2.0,
        )
    }

    /// The same size with the origin moved to (0, 0).
    pub fn to_size(&self) -> Self {
        Self::wh(self.width(), self.height())
    }

    pub fn contains(&self, p: Point) -> bool {
        self.is_valid()
            && p.x >= self.left
            && p.x <= self.right
            && p.y >= self.top
            && p.y <= self.bottom
    }

    /// True if `other` lies entirely within this rect.
    pub fn contains_rect(&self, other: Self) -> bool {
        self.is_valid()
            && other.is_valid()
            && other.left >= self.left
            && other.right <= self.right
            && other.top >= self.top
            && other.bottom <= self.bottom
    }

    pub fn intersects(&self, other: Self) -> bool {
        self.is_valid()
            && other.is_valid()
            && self.left <= other.right
            && other.left <= self.right
            && self.top <= other.bottom
            && other.top <= self.bottom
    }

    /// Union with another rect. Invalid rects act as the identity.
    #[must_use]
    pub fn union(&self, other: Self) -> Self {
        if !self.is_valid() {
            return other;
        }
        if !other.is_valid() {
            return *self;
        }
        Self::ltrb(
            self.left.min(other.left),
            self.top.min(other.top),
            self.right.max(other.right),
            self.bottom.max(other.bottom),
        )
    }

    /// Intersection with another rect; the result may be invalid (empty).
    #[must_use]
    pub fn intersect(&self, other: Self) -> Self {
        Self::ltrb(
            self.left.max(other.left),
            self.top.max(other.top),
            self.right.min(other.right),
            self.bottom.min(other.bottom),
        )
    }

    #[must_use]
    pub fn translate(&self, dx: f32, dy: f32) -> Self {
        Self::ltrb(
            self.left + dx,
            self.top + dy,
            self.right + dx,
            self.bottom + dy,
        )
    }

    /// Grow (or shrink, for negative `d`) the rect on every side.
    #[must_use]
    pub fn pad(&self, d: f32) -> Self {
        Self::ltrb(
            self.left - d,
            self.top - d,
            self.right + d,
            self.bottom + d,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validity() {
        assert!(!Rect::default().is_valid());
        assert!(Rect::wh(0.0, 0.0).is_valid());
        assert!(Rect::wh(10.0, 5.0).is_valid());
    }

    #[test]
    fn union_identity() {
        let r = Rect::ltwh(2.0, 3.0, 4.0, 5.0);
        assert_eq!(Rect::default().union(r), r);
        assert_eq!(r.union(Rect::default()), r);
        let u = r.union(Rect::ltwh(0.0, 0.0, 1.0, 1.0));
        assert_eq!(u, Rect::ltrb(0.0, 0.0, 6.0, 8.0));
    }

    #[test]
    fn containment() {
        let r = Rect::wh(10.0, 10.0);
        assert!(r.contains(Point::new(0.0, 0.0)));
        assert!(r.contains(Point::new(10.0, 10.0)));
        assert!(!r.contains(Point::new(10.1, 0.0)));
        assert!(r.contains_rect(Rect::ltwh(1.0, 1.0, 5.0, 5.0)));
        assert!(!r.contains_rect(Rect::ltwh(6.0, 6.0, 5.0, 5.0)));
    }

    #[test]
    fn intersect_empty() {
        let a = Rect::wh(5.0, 5.0);
        let b = Rect::ltwh(6.0, 6.0, 2.0, 2.0);
        assert!(!a.intersect(b).is_valid());
        assert!(a.intersect(Rect::ltwh(4.0, 4.0, 2.0, 2.0)).is_valid());
    }
}

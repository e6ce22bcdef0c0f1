use std::ops::Mul;

use super::{Point, Rect};

/// A 2D affine transform restricted to scaling followed by translation.
///
/// Layout repositioning composes translations in the parent frame with scales
/// in the local frame; rotation and skew are excluded so the composition
/// stays axis-aligned.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform2D {
    sx: f32,
    sy: f32,
    dx: f32,
    dy: f32,
}

impl Default for Transform2D {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform2D {
    pub fn identity() -> Self {
        Self {
            sx: 1.0,
            sy: 1.0,
            dx: 0.0,
            dy: 0.0,
        }
    }

    pub fn translating(dx: f32, dy: f32) -> Self {
        Self {
            sx: 1.0,
            sy: 1.0,
            dx,
            dy,
        }
    }

    pub fn scaling(sx: f32, sy: f32) -> Self {
        Self {
            sx,
            sy,
            dx: 0.0,
            dy: 0.0,
        }
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::identity()
    }

    pub fn xscale(&self) -> f32 {
        self.sx
    }

    pub fn yscale(&self) -> f32 {
        self.sy
    }

    pub fn xoffset(&self) -> f32 {
        self.dx
    }

    pub fn yoffset(&self) -> f32 {
        self.dy
    }

    pub fn map_point(&self, p: Point) -> Point {
        Point::new(p.x * self.sx + self.dx, p.y * self.sy + self.dy)
    }

    pub fn map_rect(&self, r: Rect) -> Rect {
        if !r.is_valid() {
            return r;
        }
        let a = self.map_point(Point::new(r.left, r.top));
        let b = self.map_point(Point::new(r.right, r.bottom));
        Rect::ltrb(a.x.min(b.x), a.y.min(b.y), a.x.max(b.x), a.y.max(b.y))
    }

    /// Inverse transform. Zero scales invert to zero rather than infinity so
    /// degenerate layouts stay finite.
    #[must_use]
    pub fn inverse(&self) -> Self {
        let sx = if self.sx != 0.0 { 1.0 / self.sx } else { 0.0 };
        let sy = if self.sy != 0.0 { 1.0 / self.sy } else { 0.0 };
        Self {
            sx,
            sy,
            dx: -self.dx * sx,
            dy: -self.dy * sy,
        }
    }
}

/// Composition: `(a * b)` maps a point through `b` first, then `a`.
impl Mul for Transform2D {
    type Output = Self;

    fn mul(self, other: Self) -> Self {
        Self {
            sx: self.sx * other.sx,
            sy: self.sy * other.sy,
            dx: self.sx * other.dx + self.dx,
            dy: self.sy * other.dy + self.dy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compose_order() {
        let t = Transform2D::translating(10.0, 0.0) * Transform2D::scaling(2.0, 2.0);
        // Scale applies first, then the translation.
        assert_eq!(t.map_point(Point::new(1.0, 1.0)), Point::new(12.0, 2.0));
    }

    #[test]
    fn inverse_roundtrip() {
        let t = Transform2D::translating(5.0, -3.0) * Transform2D::scaling(2.0, 4.0);
        let p = Point::new(7.0, 11.0);
        let q = t.inverse().map_point(t.map_point(p));
        assert!((q.x - p.x).abs() < 1e-5);
        assert!((q.y - p.y).abs() < 1e-5);
    }

    #[test]
    fn map_rect_is_normalized() {
        let t = Transform2D::scaling(2.0, 3.0);
        let r = t.map_rect(Rect::ltwh(1.0, 1.0, 2.0, 2.0));
        assert_eq!(r, Rect::ltrb(2.0, 3.0, 6.0, 9.0));
    }
}

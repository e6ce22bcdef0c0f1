use std::sync::mpsc;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the core.
#[derive(PartialEq, Eq, Error, Debug, Clone)]
pub enum Error {
    /// A node key no longer resolves in the tree arena.
    #[error("node not found")]
    NodeNotFound,
    /// The layout solver rejected the prepared item tree.
    #[error("layout")]
    Layout(String),
    /// The event loop channel was disconnected.
    #[error("runloop")]
    RunLoop(String),
    /// A window operation was attempted on a non-window widget.
    #[error("not a window")]
    NotAWindow,
    /// Internal invariant failure that is recoverable for the caller.
    #[error("internal")]
    Internal(String),
}

impl From<mpsc::RecvError> for Error {
    fn from(e: mpsc::RecvError) -> Self {
        Self::RunLoop(e.to_string())
    }
}

impl From<taffy::TaffyError> for Error {
    fn from(e: taffy::TaffyError) -> Self {
        Self::Layout(e.to_string())
    }
}

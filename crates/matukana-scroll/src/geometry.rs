//! Viewport and anchor geometry in document coordinates.
//!
//! All positions are measured from the top of the document, so an anchor's
//! extent does not change while the page scrolls; only the viewport moves.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The visible window onto the document.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Viewport {
    /// Vertical scroll offset (document y of the viewport's top edge).
    pub scroll_y: f64,
    /// Visible height.
    pub height: f64,
}

impl Viewport {
    /// Create a viewport.
    pub const fn new(scroll_y: f64, height: f64) -> Self {
        Self { scroll_y, height }
    }

    /// Top edge.
    pub fn top(&self) -> f64 {
        self.scroll_y
    }

    /// Bottom edge.
    pub fn bottom(&self) -> f64 {
        self.scroll_y + self.height
    }

    /// Vertical midpoint.
    pub fn center(&self) -> f64 {
        self.scroll_y + self.height / 2.0
    }

    /// The same viewport scrolled to `scroll_y`.
    #[must_use]
    pub fn scrolled_to(self, scroll_y: f64) -> Self {
        Self { scroll_y, ..self }
    }
}

/// Resolved position and size of a section anchor.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Extent {
    /// Document y of the top edge.
    pub top: f64,
    /// Height of the box.
    pub height: f64,
}

impl Extent {
    /// Create an extent.
    pub const fn new(top: f64, height: f64) -> Self {
        Self { top, height }
    }

    /// Bottom edge.
    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    /// Vertical midpoint.
    pub fn center(&self) -> f64 {
        self.top + self.height / 2.0
    }

    /// A box with a non-finite position or a negative height is treated as
    /// not yet laid out.
    pub fn is_laid_out(&self) -> bool {
        self.top.is_finite() && self.height.is_finite() && self.height >= 0.0
    }

    /// Whether any part of the box is inside the viewport. Edges count.
    pub fn intersects(&self, viewport: &Viewport) -> bool {
        !(self.bottom() < viewport.top() || self.top > viewport.bottom())
    }

    /// Absolute distance between this box's midpoint and the viewport's.
    pub fn center_distance(&self, viewport: &Viewport) -> f64 {
        (self.center() - viewport.center()).abs()
    }

    /// Length of the overlap with the span `[top, bottom]`.
    pub fn overlap(&self, top: f64, bottom: f64) -> f64 {
        (self.bottom().min(bottom) - self.top.max(top)).max(0.0)
    }
}

//! Signal sampling: the resolver's only view of the page.

use std::collections::HashMap;

use crate::geometry::{Extent, Viewport};
use crate::section::SectionId;

/// Reads page signals on demand.
///
/// Implementations hold no activation state; every call reflects the page
/// as it is right now. Anchors may come and go as content loads, so callers
/// resolve them again on every pass.
pub trait SignalSampler {
    /// Current scroll offset and viewport height.
    fn viewport(&self) -> Viewport;

    /// Raw URL fragment (`"#productos"`, `"productos"` or empty).
    fn fragment(&self) -> Option<String>;

    /// Resolved extent of a section's anchor, if it is on the page yet.
    fn anchor(&self, id: &SectionId) -> Option<Extent>;
}

/// Strip the leading `#` from a fragment. An empty fragment means none.
pub fn normalize_fragment(raw: &str) -> Option<&str> {
    let trimmed = raw.strip_prefix('#').unwrap_or(raw);
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

impl<S: SignalSampler + ?Sized> SignalSampler for &S {
    fn viewport(&self) -> Viewport {
        (**self).viewport()
    }

    fn fragment(&self) -> Option<String> {
        (**self).fragment()
    }

    fn anchor(&self, id: &SectionId) -> Option<Extent> {
        (**self).anchor(id)
    }
}

/// In-memory page used by headless hosts and tests.
#[derive(Debug, Clone, Default)]
pub struct SyntheticSampler {
    viewport: Viewport,
    fragment: Option<String>,
    anchors: HashMap<SectionId, Extent>,
}

impl SyntheticSampler {
    /// A page with the given viewport and no anchors.
    pub fn new(viewport: Viewport) -> Self {
        Self {
            viewport,
            fragment: None,
            anchors: HashMap::new(),
        }
    }

    /// Lay sections out back to back from the top of the document.
    pub fn stacked<I, S>(viewport: Viewport, sections: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<SectionId>,
    {
        let mut sampler = Self::new(viewport);
        let mut top = 0.0;
        for (id, height) in sections {
            sampler.anchors.insert(id.into(), Extent::new(top, height));
            top += height;
        }
        sampler
    }

    /// Add a resolved anchor.
    #[must_use]
    pub fn with_anchor(mut self, id: impl Into<SectionId>, extent: Extent) -> Self {
        self.resolve_anchor(id, extent);
        self
    }

    /// Scroll to an absolute offset.
    pub fn scroll_to(&mut self, scroll_y: f64) {
        self.viewport.scroll_y = scroll_y;
    }

    /// Change the viewport height.
    pub fn resize(&mut self, height: f64) {
        self.viewport.height = height;
    }

    /// Set the URL fragment.
    pub fn set_fragment(&mut self, fragment: impl Into<String>) {
        self.fragment = Some(fragment.into());
    }

    /// Clear the URL fragment.
    pub fn clear_fragment(&mut self) {
        self.fragment = None;
    }

    /// Resolve (or move) an anchor.
    pub fn resolve_anchor(&mut self, id: impl Into<SectionId>, extent: Extent) {
        self.anchors.insert(id.into(), extent);
    }

    /// Remove an anchor, as if its element left the page.
    pub fn remove_anchor(&mut self, id: &str) {
        self.anchors.remove(id);
    }
}

impl SignalSampler for SyntheticSampler {
    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn fragment(&self) -> Option<String> {
        self.fragment.clone()
    }

    fn anchor(&self, id: &SectionId) -> Option<Extent> {
        self.anchors.get(id).copied()
    }
}

//! Browser-backed signal sampler (`dom` feature).

use wasm_bindgen::JsValue;
use web_sys::Window;

use crate::geometry::{Extent, Viewport};
use crate::sampler::SignalSampler;
use crate::section::SectionId;
use crate::trigger::Capabilities;

/// Reads scroll, viewport, fragment and element boxes from the live page.
///
/// Every read goes to the DOM; nothing is cached. Failed reads degrade to
/// "no signal" (zero viewport, no fragment, unresolved anchor).
#[derive(Debug, Clone)]
pub struct DomSampler {
    window: Window,
}

impl DomSampler {
    /// Sampler over the global `window`, if there is one.
    pub fn new() -> Option<Self> {
        web_sys::window().map(|window| Self { window })
    }

    /// Sampler over a specific window.
    pub fn with_window(window: Window) -> Self {
        Self { window }
    }

    /// Detect what this browser supports.
    pub fn capabilities(&self) -> Capabilities {
        let key = JsValue::from_str("IntersectionObserver");
        Capabilities {
            visibility_observer: js_sys::Reflect::has(&self.window, &key).unwrap_or(false),
        }
    }

    fn scroll_y(&self) -> f64 {
        self.window.scroll_y().unwrap_or(0.0)
    }
}

impl SignalSampler for DomSampler {
    fn viewport(&self) -> Viewport {
        let height = self
            .window
            .inner_height()
            .ok()
            .and_then(|h| h.as_f64())
            .unwrap_or(0.0);
        Viewport::new(self.scroll_y(), height)
    }

    fn fragment(&self) -> Option<String> {
        self.window.location().hash().ok()
    }

    fn anchor(&self, id: &SectionId) -> Option<Extent> {
        let element = self.window.document()?.get_element_by_id(id.as_str())?;
        let rect = element.get_bounding_client_rect();
        // Client rects are viewport-relative; shift into document space.
        Some(Extent::new(rect.top() + self.scroll_y(), rect.height()))
    }
}

//! Matukana Scroll
//!
//! Keeps the site navigation in step with what the reader is looking at.
//!
//! # Overview
//!
//! The page is a column of sections (`inicio`, `productos`, `terapias`, ...).
//! The [`ActivationResolver`] picks the single section "in focus": the one
//! whose midpoint sits closest to the viewport midpoint, unless the URL
//! fragment names a section, in which case that one wins.
//!
//! Page signals come through the [`SignalSampler`] trait, so the same logic
//! runs against the live DOM ([`DomSampler`], `dom` feature) or a
//! [`SyntheticSampler`] in tests.
//!
//! The [`ActivationTracker`] turns page events into resolver passes using a
//! [`TriggerStrategy`]: focal-band observation when the browser has a
//! visibility observer, scroll polling otherwise. Both are throttled to one
//! pass per animation frame.
//!
//! # Example
//!
//! ```
//! use matukana_scroll::{
//!     ActivationTracker, Capabilities, ScrollConfig, SyntheticSampler, Viewport,
//! };
//!
//! let page = SyntheticSampler::stacked(
//!     Viewport::new(0.0, 800.0),
//!     [("a", 1000.0), ("b", 1000.0), ("c", 1000.0)],
//! );
//! let mut tracker = ActivationTracker::new(
//!     page,
//!     ["a", "b", "c"],
//!     Capabilities::default(),
//!     ScrollConfig::default(),
//! );
//!
//! tracker.sampler_mut().scroll_to(1050.0);
//! if tracker.on_scroll() {
//!     tracker.on_frame();
//! }
//! assert_eq!(tracker.active().as_str(), "b");
//! ```

mod config;
mod geometry;
mod resolver;
mod sampler;
mod section;
mod tracker;
mod trigger;

#[cfg(feature = "dom")]
mod dom;

pub use config::{ConfigError, ScrollConfig, DEFAULT_FOCAL_FRACTION, DEFAULT_THRESHOLDS};
pub use geometry::{Extent, Viewport};
pub use resolver::{pick_by_viewport_center, Activation, ActivationResolver};
pub use sampler::{normalize_fragment, SignalSampler, SyntheticSampler};
pub use section::{SectionId, TrackedSections};
pub use tracker::ActivationTracker;
pub use trigger::{Capabilities, FocalBand, FrameCoalescer, TriggerStrategy, VisibilityObserver};

#[cfg(feature = "dom")]
pub use dom::DomSampler;

/// Section reported when nothing else is known.
pub const DEFAULT_SECTION_ID: &str = "inicio";

/// Public sections of the site, top to bottom.
pub const PUBLIC_SECTION_IDS: [&str; 7] = [
    "inicio",
    "sobre-agustin",
    "productos",
    "terapias",
    "experiencias",
    "galeria",
    "contacto",
];

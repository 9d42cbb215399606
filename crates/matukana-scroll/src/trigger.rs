//! When to recompute the active section.
//!
//! Two strategies feed the same resolver pass:
//!
//! - **Observation**: sections are watched through a narrow focal band in the
//!   middle of the viewport, and a pass is requested only when a section's
//!   intersection with the band crosses a threshold. This mirrors a native
//!   visibility observer with a shrunken root margin.
//! - **Polled**: every scroll or resize requests a pass.
//!
//! Either way, requests go through a [`FrameCoalescer`] so bursts collapse
//! into at most one pass per rendered frame.

use std::collections::HashMap;

use crate::config::ScrollConfig;
use crate::geometry::{Extent, Viewport};
use crate::sampler::SignalSampler;
use crate::section::{SectionId, TrackedSections};

/// What the host environment can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    /// A native visibility-observation primitive is available.
    pub visibility_observer: bool,
}

/// Central horizontal strip of the viewport used by the observation strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct FocalBand {
    fraction: f64,
    thresholds: Vec<f64>,
}

impl FocalBand {
    /// Band covering `fraction` of the viewport height, reporting at the
    /// given intersection-ratio thresholds.
    pub fn new(fraction: f64, mut thresholds: Vec<f64>) -> Self {
        thresholds.sort_by(f64::total_cmp);
        thresholds.dedup();
        Self {
            fraction: fraction.clamp(0.0, 1.0),
            thresholds,
        }
    }

    /// Band described by a (validated) config.
    pub fn from_config(config: &ScrollConfig) -> Self {
        Self::new(config.focal_fraction, config.thresholds.clone())
    }

    /// Document-space `[top, bottom]` of the band.
    pub fn span(&self, viewport: &Viewport) -> (f64, f64) {
        let margin = viewport.height * (1.0 - self.fraction) / 2.0;
        (viewport.top() + margin, viewport.bottom() - margin)
    }

    /// Which threshold bucket the section sits in, or `None` when it does
    /// not touch the band at all.
    ///
    /// The ratio is measured against the section's own height, like a
    /// visibility observer's intersection ratio.
    pub fn bucket(&self, viewport: &Viewport, extent: &Extent) -> Option<usize> {
        if !extent.is_laid_out() {
            return None;
        }
        let (top, bottom) = self.span(viewport);
        if extent.bottom() < top || extent.top > bottom {
            return None;
        }
        let ratio = if extent.height > 0.0 {
            extent.overlap(top, bottom) / extent.height
        } else {
            1.0
        };
        Some(self.thresholds.iter().filter(|t| ratio >= **t).count())
    }
}

impl Default for FocalBand {
    fn default() -> Self {
        Self::from_config(&ScrollConfig::default())
    }
}

/// Emulated visibility observer over the focal band.
///
/// Remembers the last bucket of every observed section and reports whether
/// any of them changed. The first observation of a section always reports,
/// as a native observer fires once on `observe()`.
#[derive(Debug, Clone, Default)]
pub struct VisibilityObserver {
    band: FocalBand,
    observed: HashMap<SectionId, Option<usize>>,
}

impl VisibilityObserver {
    /// Observer over `band`.
    pub fn new(band: FocalBand) -> Self {
        Self {
            band,
            observed: HashMap::new(),
        }
    }

    /// The band being observed.
    pub fn band(&self) -> &FocalBand {
        &self.band
    }

    /// Sample every resolved anchor; `true` if a callback would fire.
    ///
    /// Sections whose anchors have not resolved are skipped and picked up on
    /// a later sample once they appear.
    pub fn sample<S: SignalSampler + ?Sized>(
        &mut self,
        sections: &TrackedSections,
        sampler: &S,
    ) -> bool {
        let viewport = sampler.viewport();
        let mut fired = false;

        for id in sections.iter() {
            let Some(extent) = sampler.anchor(id) else {
                // Element left the page; observe it afresh if it returns.
                fired |= self.observed.remove(id).is_some();
                continue;
            };
            let bucket = self.band.bucket(&viewport, &extent);
            match self.observed.insert(id.clone(), bucket) {
                Some(previous) if previous == bucket => {}
                _ => fired = true,
            }
        }

        self.observed.retain(|id, _| sections.contains(id.as_str()));
        fired
    }

    /// Stop observing everything.
    pub fn disconnect(&mut self) {
        self.observed.clear();
    }

    /// Number of sections currently observed.
    pub fn observed_len(&self) -> usize {
        self.observed.len()
    }
}

/// Strategy for deciding when a resolver pass is needed.
#[derive(Debug, Clone)]
pub enum TriggerStrategy {
    /// Focal-band observation (preferred).
    Observation(VisibilityObserver),
    /// Every scroll/resize sample requests a pass.
    Polled,
}

impl TriggerStrategy {
    /// Pick the best strategy the environment supports.
    pub fn for_capabilities(capabilities: Capabilities, config: &ScrollConfig) -> Self {
        if capabilities.visibility_observer && !config.force_polling {
            Self::Observation(VisibilityObserver::new(FocalBand::from_config(config)))
        } else {
            Self::Polled
        }
    }

    /// Whether a geometry change warrants a pass.
    pub fn should_recompute<S: SignalSampler + ?Sized>(
        &mut self,
        sections: &TrackedSections,
        sampler: &S,
    ) -> bool {
        match self {
            Self::Observation(observer) => observer.sample(sections, sampler),
            Self::Polled => true,
        }
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Observation(_) => "observation",
            Self::Polled => "polled",
        }
    }
}

/// Collapses recompute requests to at most one per frame.
///
/// Equivalent to the usual "ticking" flag around `requestAnimationFrame`:
/// the first request in a frame asks the host to schedule a frame, later
/// ones are dropped, and the frame callback runs the pass once.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameCoalescer {
    pending: bool,
    dropped: u64,
}

impl FrameCoalescer {
    /// Create an idle coalescer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a pass. Returns `true` if the host must schedule a frame.
    pub fn request(&mut self) -> bool {
        if self.pending {
            self.dropped += 1;
            false
        } else {
            self.pending = true;
            true
        }
    }

    /// Called from the frame callback. Returns `true` if a pass should run.
    pub fn take(&mut self) -> bool {
        std::mem::take(&mut self.pending)
    }

    /// Whether a frame is scheduled.
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Requests absorbed by an already scheduled frame.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

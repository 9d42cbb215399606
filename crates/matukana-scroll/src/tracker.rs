//! Activation tracker: wires page events to resolver passes.

use tokio::sync::watch;
use tracing::{debug, trace};

use crate::config::ScrollConfig;
use crate::resolver::{Activation, ActivationResolver};
use crate::sampler::SignalSampler;
use crate::section::{SectionId, TrackedSections};
use crate::trigger::{Capabilities, FrameCoalescer, TriggerStrategy};

/// Drives an [`ActivationResolver`] from page events.
///
/// The host forwards scroll, resize and hash-change events and calls
/// [`on_frame`](Self::on_frame) from its animation-frame callback whenever
/// [`frame_requested`](Self::frame_requested) is set. Passes caused by
/// geometry never run more than once per frame.
#[derive(Debug)]
pub struct ActivationTracker<S> {
    sampler: S,
    resolver: ActivationResolver,
    strategy: TriggerStrategy,
    frames: FrameCoalescer,
    config: ScrollConfig,
    passes: u64,
    mounted: bool,
}

impl<S: SignalSampler> ActivationTracker<S> {
    /// Mount a tracker and perform the initial pass, so a page opened with a
    /// fragment or a restored scroll offset starts out correct.
    pub fn new<I, T>(
        sampler: S,
        sections: I,
        capabilities: Capabilities,
        config: ScrollConfig,
    ) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<SectionId>,
    {
        let sections = TrackedSections::new(sections);
        let resolver = ActivationResolver::new(sections, &config);
        let strategy = TriggerStrategy::for_capabilities(capabilities, &config);
        debug!(
            sections = resolver.sections().len(),
            strategy = strategy.name(),
            "activation tracker mounted"
        );

        let mut tracker = Self {
            sampler,
            resolver,
            strategy,
            frames: FrameCoalescer::new(),
            config,
            passes: 0,
            mounted: true,
        };
        // Registers every resolved anchor with the observer.
        tracker.strategy.should_recompute(tracker.resolver.sections(), &tracker.sampler);
        tracker.recompute();
        tracker
    }

    /// Currently active section.
    pub fn active(&self) -> &SectionId {
        self.resolver.active()
    }

    /// How the active section was chosen.
    pub fn activation(&self) -> Activation {
        self.resolver.activation()
    }

    /// Subscribe to active-section changes (the navigation binding).
    pub fn subscribe(&self) -> watch::Receiver<SectionId> {
        self.resolver.subscribe()
    }

    /// The sampler, for hosts that own the signals.
    pub fn sampler(&self) -> &S {
        &self.sampler
    }

    /// Mutable sampler access (synthetic pages, tests).
    pub fn sampler_mut(&mut self) -> &mut S {
        &mut self.sampler
    }

    /// Active trigger strategy.
    pub fn strategy(&self) -> &TriggerStrategy {
        &self.strategy
    }

    /// Whether the host should schedule an animation frame.
    pub fn frame_requested(&self) -> bool {
        self.frames.is_pending()
    }

    /// Whether [`unmount`](Self::unmount) has not been called yet.
    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// Number of resolver passes run so far.
    pub fn passes(&self) -> u64 {
        self.passes
    }

    /// Requests absorbed by an already scheduled frame.
    pub fn coalesced(&self) -> u64 {
        self.frames.dropped()
    }

    /// The page scrolled. Returns `true` if a frame must be scheduled.
    pub fn on_scroll(&mut self) -> bool {
        self.on_geometry_change()
    }

    /// The viewport was resized. Returns `true` if a frame must be scheduled.
    pub fn on_resize(&mut self) -> bool {
        self.on_geometry_change()
    }

    /// New content was laid out; anchors may have appeared or moved.
    pub fn on_content_loaded(&mut self) -> bool {
        self.on_geometry_change()
    }

    /// The URL fragment changed. Handled immediately, not on a frame.
    pub fn on_hash_change(&mut self) -> &SectionId {
        if !self.mounted {
            return self.resolver.active();
        }
        self.recompute()
    }

    /// Animation-frame callback. Runs at most one pass.
    pub fn on_frame(&mut self) -> Option<&SectionId> {
        if !self.frames.take() || !self.mounted {
            return None;
        }
        Some(self.recompute())
    }

    /// Replace the tracked sections (e.g. a lazily rendered section list).
    pub fn set_sections<I, T>(&mut self, sections: I)
    where
        I: IntoIterator<Item = T>,
        T: Into<SectionId>,
    {
        let sections = TrackedSections::new(sections);
        self.resolver.set_sections(sections, &self.config);
        if let TriggerStrategy::Observation(observer) = &mut self.strategy {
            observer.disconnect();
        }
        self.on_geometry_change();
    }

    /// Tear down observation. The resolver keeps its last answer and every
    /// later event is ignored.
    pub fn unmount(&mut self) {
        self.mounted = false;
        if let TriggerStrategy::Observation(observer) = &mut self.strategy {
            observer.disconnect();
        }
        self.frames.take();
    }

    fn on_geometry_change(&mut self) -> bool {
        if !self.mounted {
            trace!("event after unmount ignored");
            return false;
        }
        if !self
            .strategy
            .should_recompute(self.resolver.sections(), &self.sampler)
        {
            trace!("geometry change without focal crossing");
            return false;
        }
        self.frames.request()
    }

    fn recompute(&mut self) -> &SectionId {
        self.passes += 1;
        self.resolver.resolve(&self.sampler)
    }
}

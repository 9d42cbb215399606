//! Section Activation Resolver.
//!
//! Decides which tracked section is "in focus". A section is a candidate when
//! its anchor has resolved and intersects the viewport; the candidate whose
//! midpoint is closest to the viewport midpoint wins. A URL fragment naming a
//! tracked section overrides the heuristic while it is present.
//!
//! The resolver never fails. With no candidates it keeps the previous answer,
//! and before any anchor has ever resolved it answers with the configured
//! default section.

use tokio::sync::watch;
use tracing::debug;

use crate::config::ScrollConfig;
use crate::geometry::{Extent, Viewport};
use crate::sampler::{normalize_fragment, SignalSampler};
use crate::section::{SectionId, TrackedSections};
use crate::DEFAULT_SECTION_ID;

/// How the current active section was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    /// No anchor has resolved yet; the default section is active.
    Default,
    /// The URL fragment forced the section.
    Fragment,
    /// Closest to the viewport center.
    Heuristic,
    /// Nothing intersected the viewport; the previous section was kept.
    Retained,
}

/// Index of the tracked section closest to the viewport center.
///
/// Only resolved anchors that intersect the viewport compete. Ties go to the
/// earliest tracked section. Returns `None` when nothing intersects.
pub fn pick_by_viewport_center<F>(
    sections: &TrackedSections,
    viewport: &Viewport,
    mut anchor: F,
) -> Option<usize>
where
    F: FnMut(&SectionId) -> Option<Extent>,
{
    let mut best: Option<(usize, f64)> = None;

    for (index, id) in sections.iter().enumerate() {
        let Some(extent) = anchor(id) else {
            continue;
        };
        if !extent.is_laid_out() || !extent.intersects(viewport) {
            continue;
        }

        let distance = extent.center_distance(viewport);
        match best {
            Some((_, best_distance)) if distance >= best_distance => {}
            _ => best = Some((index, distance)),
        }
    }

    best.map(|(index, _)| index)
}

/// Stateful resolver for one page session.
#[derive(Debug)]
pub struct ActivationResolver {
    sections: TrackedSections,
    default_id: SectionId,
    active: SectionId,
    how: Activation,
    seen_anchor: bool,
    tx: watch::Sender<SectionId>,
}

impl ActivationResolver {
    /// Create a resolver for `sections`.
    ///
    /// The default section is `config.default_section`, else the first
    /// tracked section, else `"inicio"`.
    pub fn new(sections: TrackedSections, config: &ScrollConfig) -> Self {
        let default_id = default_for(&sections, config);
        let (tx, _rx) = watch::channel(default_id.clone());
        Self {
            sections,
            active: default_id.clone(),
            default_id,
            how: Activation::Default,
            seen_anchor: false,
            tx,
        }
    }

    /// Currently active section.
    pub fn active(&self) -> &SectionId {
        &self.active
    }

    /// How the active section was chosen on the last pass.
    pub fn activation(&self) -> Activation {
        self.how
    }

    /// The section reported until an anchor resolves.
    pub fn default_id(&self) -> &SectionId {
        &self.default_id
    }

    /// Tracked sections in order.
    pub fn sections(&self) -> &TrackedSections {
        &self.sections
    }

    /// Subscribe to active-section changes.
    ///
    /// The receiver sees the current value immediately and is notified only
    /// when the active section actually changes.
    pub fn subscribe(&self) -> watch::Receiver<SectionId> {
        self.tx.subscribe()
    }

    /// Replace the tracked set (the page's section list changed).
    ///
    /// The active section survives if it is still tracked.
    pub fn set_sections(&mut self, sections: TrackedSections, config: &ScrollConfig) {
        self.default_id = default_for(&sections, config);
        self.sections = sections;
        if !self.sections.contains(self.active.as_str()) {
            debug!(previous = %self.active, "active section no longer tracked");
            self.seen_anchor = false;
            self.set_active(self.default_id.clone(), Activation::Default);
        }
    }

    /// Run one full pass against the current signals.
    pub fn resolve<S: SignalSampler + ?Sized>(&mut self, sampler: &S) -> &SectionId {
        if let Some(forced) = self.fragment_target(sampler) {
            self.set_active(forced, Activation::Fragment);
            return &self.active;
        }

        let viewport = sampler.viewport();
        let mut any_resolved = false;
        let picked = pick_by_viewport_center(&self.sections, &viewport, |id| {
            let extent = sampler.anchor(id)?;
            any_resolved |= extent.is_laid_out();
            Some(extent)
        });
        self.seen_anchor |= any_resolved;

        let winner = picked.and_then(|index| self.sections.iter().nth(index).cloned());
        match winner {
            Some(id) => self.set_active(id, Activation::Heuristic),
            None if self.seen_anchor => self.how = Activation::Retained,
            None => self.set_active(self.default_id.clone(), Activation::Default),
        }

        &self.active
    }

    fn fragment_target<S: SignalSampler + ?Sized>(&self, sampler: &S) -> Option<SectionId> {
        let raw = sampler.fragment()?;
        let id = normalize_fragment(&raw)?;
        self.sections.find(id).cloned()
    }

    fn set_active(&mut self, id: SectionId, how: Activation) {
        self.how = how;
        if id == self.active {
            return;
        }
        debug!(from = %self.active, to = %id, ?how, "active section changed");
        self.active = id.clone();
        self.tx.send_replace(id);
    }
}

fn default_for(sections: &TrackedSections, config: &ScrollConfig) -> SectionId {
    config
        .default_section
        .clone()
        .or_else(|| sections.first().cloned())
        .unwrap_or_else(|| SectionId::from(DEFAULT_SECTION_ID))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::SyntheticSampler;
    use proptest::prelude::*;

    fn three_sections() -> (ActivationResolver, SyntheticSampler) {
        let sections = TrackedSections::new(["a", "b", "c"]);
        let resolver = ActivationResolver::new(sections, &ScrollConfig::default());
        let sampler = SyntheticSampler::stacked(
            Viewport::new(0.0, 800.0),
            [("a", 1000.0), ("b", 1000.0), ("c", 1000.0)],
        );
        (resolver, sampler)
    }

    #[test]
    fn picks_section_nearest_viewport_center() {
        let (mut resolver, mut sampler) = three_sections();
        sampler.scroll_to(1050.0);

        assert_eq!(resolver.resolve(&sampler), "b");
        assert_eq!(resolver.activation(), Activation::Heuristic);
    }

    #[test]
    fn ties_go_to_earliest_tracked() {
        let sections = TrackedSections::new(["late", "early"]);
        let mut resolver = ActivationResolver::new(sections, &ScrollConfig::default());
        // Both midpoints are 100px from the viewport center at 500.
        let sampler = SyntheticSampler::new(Viewport::new(0.0, 1000.0))
            .with_anchor("early", Extent::new(300.0, 200.0))
            .with_anchor("late", Extent::new(500.0, 200.0));

        assert_eq!(resolver.resolve(&sampler), "late");
    }

    #[test]
    fn keeps_previous_when_nothing_intersects() {
        let (mut resolver, mut sampler) = three_sections();
        sampler.scroll_to(2100.0);
        assert_eq!(resolver.resolve(&sampler), "c");

        // Far past the end of the page.
        sampler.scroll_to(10_000.0);
        assert_eq!(resolver.resolve(&sampler), "c");
        assert_eq!(resolver.activation(), Activation::Retained);
    }

    #[test]
    fn default_until_an_anchor_resolves() {
        let sections = TrackedSections::new(["hero", "about"]);
        let config = ScrollConfig::default().with_default_section("about");
        let mut resolver = ActivationResolver::new(sections, &config);
        let mut sampler = SyntheticSampler::new(Viewport::new(0.0, 800.0));

        assert_eq!(resolver.resolve(&sampler), "about");
        assert_eq!(resolver.activation(), Activation::Default);

        sampler.resolve_anchor("hero", Extent::new(0.0, 900.0));
        assert_eq!(resolver.resolve(&sampler), "hero");
    }

    #[test]
    fn empty_section_list_falls_back_to_inicio() {
        let mut resolver =
            ActivationResolver::new(TrackedSections::default(), &ScrollConfig::default());
        let sampler = SyntheticSampler::new(Viewport::new(0.0, 800.0));
        assert_eq!(resolver.resolve(&sampler), DEFAULT_SECTION_ID);
    }

    #[test]
    fn fragment_overrides_until_cleared() {
        let (mut resolver, mut sampler) = three_sections();
        sampler.set_fragment("#c");
        assert_eq!(resolver.resolve(&sampler), "c");
        assert_eq!(resolver.activation(), Activation::Fragment);

        sampler.scroll_to(0.0);
        assert_eq!(resolver.resolve(&sampler), "c");

        sampler.clear_fragment();
        assert_eq!(resolver.resolve(&sampler), "a");
    }

    #[test]
    fn untracked_fragment_is_ignored() {
        let (mut resolver, mut sampler) = three_sections();
        sampler.set_fragment("#admin");
        sampler.scroll_to(1050.0);
        assert_eq!(resolver.resolve(&sampler), "b");
    }

    #[test]
    fn tracked_fragment_wins_before_its_anchor_resolves() {
        let sections = TrackedSections::new(["hero", "gallery"]);
        let mut resolver = ActivationResolver::new(sections, &ScrollConfig::default());
        let mut sampler = SyntheticSampler::new(Viewport::new(0.0, 800.0))
            .with_anchor("hero", Extent::new(0.0, 900.0));
        sampler.set_fragment("#gallery");
        assert_eq!(resolver.resolve(&sampler), "gallery");
        assert_eq!(resolver.activation(), Activation::Fragment);
    }

    #[test]
    fn subscribers_see_changes_only() {
        let (mut resolver, mut sampler) = three_sections();
        let mut rx = resolver.subscribe();
        assert_eq!(*rx.borrow_and_update(), "a");

        resolver.resolve(&sampler);
        assert!(!rx.has_changed().unwrap());

        sampler.scroll_to(1050.0);
        resolver.resolve(&sampler);
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), "b");
    }

    #[test]
    fn set_sections_resets_untracked_active() {
        let (mut resolver, mut sampler) = three_sections();
        sampler.scroll_to(2100.0);
        resolver.resolve(&sampler);
        assert_eq!(resolver.active(), "c");

        resolver.set_sections(TrackedSections::new(["a", "b"]), &ScrollConfig::default());
        assert_eq!(resolver.active(), "a");

        resolver.set_sections(TrackedSections::new(["b", "a"]), &ScrollConfig::default());
        assert_eq!(resolver.active(), "a");
    }

    proptest! {
        #[test]
        fn resolution_is_deterministic(
            heights in prop::collection::vec(1.0f64..3000.0, 1..8),
            scroll in 0.0f64..20_000.0,
            viewport_height in 100.0f64..2000.0,
        ) {
            let ids: Vec<String> = (0..heights.len()).map(|i| format!("s{i}")).collect();
            let sampler = SyntheticSampler::stacked(
                Viewport::new(scroll, viewport_height),
                ids.iter().cloned().zip(heights.iter().copied()),
            );
            let config = ScrollConfig::default();

            let mut first = ActivationResolver::new(TrackedSections::new(ids.clone()), &config);
            let mut second = ActivationResolver::new(TrackedSections::new(ids), &config);
            let once = first.resolve(&sampler).clone();
            prop_assert_eq!(first.resolve(&sampler), &once);
            prop_assert_eq!(second.resolve(&sampler), &once);
        }

        #[test]
        fn no_intersection_retains_previous(
            heights in prop::collection::vec(1.0f64..3000.0, 1..8),
            scroll in 0.0f64..5000.0,
        ) {
            let ids: Vec<String> = (0..heights.len()).map(|i| format!("s{i}")).collect();
            let total: f64 = heights.iter().sum();
            let mut sampler = SyntheticSampler::stacked(
                Viewport::new(scroll, 800.0),
                ids.iter().cloned().zip(heights.iter().copied()),
            );
            let mut resolver =
                ActivationResolver::new(TrackedSections::new(ids), &ScrollConfig::default());

            let before = resolver.resolve(&sampler).clone();
            sampler.scroll_to(total + 1000.0);
            prop_assert_eq!(resolver.resolve(&sampler), &before);
        }
    }
}

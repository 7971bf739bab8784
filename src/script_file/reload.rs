use super::cache::{MacroDependentOutcome, SaveOutcome, ScriptFileCache};
use crate::breakpoints::BreakpointStore;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Runs the part of a save that follows the ROM write: breakpoint migration and reload.
///
/// The cache already parked the new source maps as temporary marks and replaced the content
/// hash. Files still resident in RAM keep their old marks and breakpoints until the ground
/// engine drops them, which fires the reload from [`ScriptFileCache::close_in_ground_engine`].
pub struct ReloadCoordinator {
    cache: Arc<ScriptFileCache>,
    breakpoints: Arc<BreakpointStore>,
}

impl ReloadCoordinator {
    pub fn new(cache: Arc<ScriptFileCache>, breakpoints: Arc<BreakpointStore>) -> Self {
        Self { cache, breakpoints }
    }

    pub fn finish_save(&self, outcome: &SaveOutcome) {
        let old_offsets = self.breakpoints.latest_offsets(&outcome.filename);
        let new_offsets = match &outcome.previous_map {
            Some(previous) => previous.translate_offsets(&old_offsets, &outcome.new_map),
            // Without the old map only offsets that still start an opcode survive.
            None => old_offsets
                .into_iter()
                .filter(|offset| outcome.new_map.line_col_for(*offset).is_some())
                .collect::<BTreeSet<u32>>(),
        };
        self.breakpoints.resync(&outcome.filename, new_offsets);

        if outcome.ready_to_reload {
            self.cache.force_reload(&outcome.filename);
        } else {
            log::info!(
                "{} is loaded in the game; the new version takes effect once it is unloaded",
                outcome.filename
            );
        }
    }

    pub fn finish_macro_save(&self, outcomes: &[MacroDependentOutcome]) {
        for outcome in outcomes {
            if let MacroDependentOutcome::Recompiled(save) = outcome {
                self.finish_save(save);
            }
        }
    }

    /// Applies a reload on the UI thread: parked marks and breakpoints become active.
    pub fn apply_reload(&self, filename: &str) -> bool {
        if !self.cache.apply_reload(filename) {
            return false;
        }
        self.breakpoints.on_reload(filename);
        true
    }
}

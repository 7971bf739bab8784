use super::snapshot::GroundSnapshot;
use crate::events::{DebuggerEvent, EventSender};
use crate::runtime::{MAX_SSB, MAX_SSX, TALK_HANGER_OFFSET};
use crate::script_file::ScriptFileCache;
use crate::utils::lock;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedSsb {
    pub filename: String,
    /// Content hash of the file when the engine loaded it.
    pub hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct GroundState {
    running: bool,
    ssb_slots: [Option<LoadedSsb>; MAX_SSB],
    /// Indexed by hanger, 0 to MAX_SSX inclusive.
    ssx_slots: [Option<String>; MAX_SSX + 1],
    pending_load_target: Option<usize>,
}

impl Default for GroundState {
    fn default() -> Self {
        Self {
            running: false,
            ssb_slots: Default::default(),
            ssx_slots: Default::default(),
            pending_load_target: None,
        }
    }
}

/// Which SSB files the ground engine holds in RAM, per hanger.
///
/// Fed by the load hooks on the emulator thread. Every file entering or leaving a slot is
/// reported to the script file cache, so the set of occupied slots always equals the set of
/// files flagged as opened in the ground engine.
pub struct GroundEngineTracker {
    state: Mutex<GroundState>,
    cache: Arc<ScriptFileCache>,
    events: EventSender,
}

impl GroundEngineTracker {
    pub fn new(cache: Arc<ScriptFileCache>, events: EventSender) -> Self {
        Self {
            state: Mutex::new(GroundState::default()),
            cache,
            events,
        }
    }

    pub fn running(&self) -> bool {
        lock(&self.state).running
    }

    pub fn ssb_in_hanger(&self, hanger: usize) -> Option<LoadedSsb> {
        lock(&self.state).ssb_slots.get(hanger).cloned().flatten()
    }

    pub fn ssx_in_hanger(&self, hanger: usize) -> Option<String> {
        lock(&self.state).ssx_slots.get(hanger).cloned().flatten()
    }

    pub fn pending_load_target(&self) -> Option<usize> {
        lock(&self.state).pending_load_target
    }

    pub fn loaded_files(&self) -> BTreeSet<String> {
        lock(&self.state)
            .ssb_slots
            .iter()
            .flatten()
            .map(|ssb| ssb.filename.clone())
            .collect()
    }

    pub fn on_ground_start(&self) {
        log::info!("Ground engine started");
        self.reset(false, true);
        self.events.send(DebuggerEvent::GroundStarted);
    }

    pub fn on_ground_quit(&self) {
        log::info!("Ground engine stopped");
        self.reset(false, false);
        self.events.send(DebuggerEvent::GroundQuit);
    }

    pub fn on_map_change(&self) {
        log::debug!("Ground map change");
        self.reset(true, true);
        self.events.send(DebuggerEvent::MapChanged);
    }

    pub fn on_ssb_load(&self, name: &str) {
        let mut state = lock(&self.state);
        let slot = state.pending_load_target.take().unwrap_or(0);
        if slot >= MAX_SSB {
            log::warn!("Discarding load of {} into invalid hanger {}", name, slot);
            return;
        }
        let previous = state.ssb_slots[slot].take();

        if let Err(e) = self.cache.open_in_ground_engine(name) {
            log::warn!("Loaded {} is not known to the cache: {}", name, e);
        }
        let hash = self.cache.content_hash(name).unwrap_or_default();
        log::debug!("Hanger {}: loaded {}", slot, name);
        state.ssb_slots[slot] = Some(LoadedSsb {
            filename: name.to_string(),
            hash,
        });

        if let Some(previous) = previous {
            self.release_if_unused(&state, &previous.filename);
        }
        drop(state);
        self.events.send(DebuggerEvent::SsbLoaded {
            slot,
            filename: name.to_string(),
        });
    }

    pub fn on_ssx_load(&self, hanger: usize, name: &str) {
        {
            let mut state = lock(&self.state);
            if hanger > MAX_SSX {
                log::warn!("Ignoring load of {} into invalid SSX hanger {}", name, hanger);
                return;
            }
            state.ssx_slots[hanger] = Some(name.to_string());
            set_pending(&mut state, hanger);
        }
        self.events.send(DebuggerEvent::SsxLoaded {
            hanger,
            name: name.to_string(),
        });
    }

    pub fn on_talk_load(&self, hanger: usize) {
        let target = if hanger <= MAX_SSX {
            hanger + TALK_HANGER_OFFSET
        } else {
            hanger
        };
        set_pending(&mut lock(&self.state), target);
        self.events.send(DebuggerEvent::TalkLoaded { hanger });
    }

    pub fn snapshot(&self) -> GroundSnapshot {
        let state = lock(&self.state);
        GroundSnapshot {
            running: state.running,
            ssbs: state
                .ssb_slots
                .iter()
                .map(|slot| slot.as_ref().map(|s| (s.filename.clone(), s.hash.clone())))
                .collect(),
            ssxs: state.ssx_slots.to_vec(),
            load_ssb_for: state.pending_load_target,
        }
    }

    /// Replaces the tracked state after a save state was loaded. Returns the loaded files that
    /// changed on disk since the snapshot was taken; their breakpoints stay off until they are
    /// reloaded.
    pub fn restore(&self, snapshot: &GroundSnapshot) -> Vec<String> {
        let mut state = lock(&self.state);
        let previous: Vec<String> = state
            .ssb_slots
            .iter_mut()
            .filter_map(|slot| slot.take().map(|s| s.filename))
            .collect();

        let mut restored = GroundState {
            running: snapshot.running,
            pending_load_target: snapshot.load_ssb_for,
            ..GroundState::default()
        };
        for (slot, entry) in snapshot.ssbs.iter().enumerate().take(MAX_SSB) {
            if let Some((filename, hash)) = entry {
                restored.ssb_slots[slot] = Some(LoadedSsb {
                    filename: filename.clone(),
                    hash: hash.clone(),
                });
            }
        }
        for (hanger, name) in snapshot.ssxs.iter().enumerate().take(MAX_SSX + 1) {
            restored.ssx_slots[hanger] = name.clone();
        }
        *state = restored;

        let now_loaded: BTreeSet<String> = state
            .ssb_slots
            .iter()
            .flatten()
            .map(|s| s.filename.clone())
            .collect();
        for filename in previous.iter().filter(|f| !now_loaded.contains(*f)) {
            self.cache.close_in_ground_engine(filename);
        }

        let mut stale = Vec::new();
        for loaded in state.ssb_slots.iter().flatten() {
            if let Err(e) = self.cache.open_in_ground_engine(&loaded.filename) {
                log::warn!("Restored {} is not known to the cache: {}", loaded.filename, e);
                continue;
            }
            let current = self.cache.content_hash(&loaded.filename).unwrap_or_default();
            if current != loaded.hash && !stale.contains(&loaded.filename) {
                if let Err(e) = self.cache.mark_stale_from_savestate(&loaded.filename) {
                    log::warn!("Could not mark {} as stale: {}", loaded.filename, e);
                }
                stale.push(loaded.filename.clone());
            }
        }
        drop(state);

        if !stale.is_empty() {
            log::warn!("Save state runs outdated scripts: {}", stale.join(", "));
            self.events.send(DebuggerEvent::Warning(format!(
                "The save state was created with older versions of: {}. Breakpoints in these \
                 files are disabled until they are reloaded.",
                stale.join(", ")
            )));
        }
        stale
    }

    fn reset(&self, keep_unionall: bool, running: bool) {
        let mut state = lock(&self.state);
        let unionall = if keep_unionall {
            state.ssb_slots[0].take()
        } else {
            None
        };
        let dropped: Vec<String> = state
            .ssb_slots
            .iter_mut()
            .filter_map(|slot| slot.take().map(|s| s.filename))
            .collect();
        *state = GroundState {
            running,
            ..GroundState::default()
        };
        state.ssb_slots[0] = unionall;
        for filename in dropped {
            self.release_if_unused(&state, &filename);
        }
    }

    /// Closes `filename` in the cache unless another hanger still holds it.
    fn release_if_unused(&self, state: &GroundState, filename: &str) {
        let still_loaded = state
            .ssb_slots
            .iter()
            .flatten()
            .any(|s| s.filename == filename);
        if !still_loaded {
            self.cache.close_in_ground_engine(filename);
        }
    }
}

fn set_pending(state: &mut GroundState, target: usize) {
    if let Some(previous) = state.pending_load_target
        && previous != target
    {
        log::warn!(
            "SSB load target {} overwritten by {} before any SSB was loaded",
            previous,
            target
        );
    }
    state.pending_load_target = Some(target);
}

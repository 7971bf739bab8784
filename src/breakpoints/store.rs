use super::transient::{BreakpointQuery, TransientBreakpoint};
use crate::error::{DebuggerError, Result};
use crate::events::{DebuggerEvent, EventSender};
use crate::script_file::ScriptFileCache;
use crate::utils::{lock, write_atomic};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

type OffsetMap = BTreeMap<String, BTreeSet<u32>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakpointChange {
    Added(u32),
    Removed(u32),
    /// The whole set of the file was replaced after a save or reload.
    Replaced,
}

pub type BreakpointListener = Box<dyn Fn(&str, BreakpointChange) + Send + Sync>;

#[derive(Default)]
struct Persistent {
    primary: OffsetMap,
    /// New offsets of files whose RAM copy is stale, promoted on reload.
    pending: OffsetMap,
}

/// Breakpoints by file and opcode offset, plus the step-control entries of the controller.
///
/// The persistent set is owned by the UI thread; the emulator thread only queries it.
pub struct BreakpointStore {
    path: PathBuf,
    cache: Arc<ScriptFileCache>,
    persistent: Mutex<Persistent>,
    transient: Mutex<Vec<TransientBreakpoint>>,
    listeners: Mutex<Vec<BreakpointListener>>,
    events: EventSender,
}

impl BreakpointStore {
    /// Loads `path`. A missing or corrupt file starts an empty store.
    pub fn load(
        path: impl Into<PathBuf>,
        cache: Arc<ScriptFileCache>,
        events: EventSender,
    ) -> Self {
        let path = path.into();
        let primary = match read_offsets(&path) {
            Ok(primary) => primary,
            Err(e) => {
                if path.exists() {
                    log::warn!("Ignoring breakpoint file {:?}: {}", path, e);
                    events.send(DebuggerEvent::Warning(format!(
                        "Breakpoints could not be loaded: {}",
                        e
                    )));
                }
                OffsetMap::new()
            }
        };
        Self {
            path,
            cache,
            persistent: Mutex::new(Persistent {
                primary,
                pending: OffsetMap::new(),
            }),
            transient: Mutex::new(Vec::new()),
            listeners: Mutex::new(Vec::new()),
            events,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn subscribe(&self, listener: BreakpointListener) {
        lock(&self.listeners).push(listener);
    }

    pub fn add(&self, filename: &str, opcode_offset: u32) {
        let inserted = lock(&self.persistent)
            .primary
            .entry(filename.to_string())
            .or_default()
            .insert(opcode_offset);
        if inserted {
            log::debug!("Breakpoint added: {}@{}", filename, opcode_offset);
            self.persist();
            self.notify(filename, BreakpointChange::Added(opcode_offset));
        }
    }

    pub fn remove(&self, filename: &str, opcode_offset: u32) {
        let removed = {
            let mut persistent = lock(&self.persistent);
            let removed = persistent
                .primary
                .get_mut(filename)
                .is_some_and(|set| set.remove(&opcode_offset));
            if persistent.primary.get(filename).is_some_and(BTreeSet::is_empty) {
                persistent.primary.remove(filename);
            }
            removed
        };
        if removed {
            log::debug!("Breakpoint removed: {}@{}", filename, opcode_offset);
            self.persist();
            self.notify(filename, BreakpointChange::Removed(opcode_offset));
        }
    }

    pub fn toggle(&self, filename: &str, opcode_offset: u32) -> bool {
        if self.contains(filename, opcode_offset) {
            self.remove(filename, opcode_offset);
            false
        } else {
            self.add(filename, opcode_offset);
            true
        }
    }

    /// Persistent breakpoints in effect for the bytecode in RAM.
    pub fn contains(&self, filename: &str, opcode_offset: u32) -> bool {
        lock(&self.persistent)
            .primary
            .get(filename)
            .is_some_and(|set| set.contains(&opcode_offset))
    }

    pub fn offsets(&self, filename: &str) -> BTreeSet<u32> {
        lock(&self.persistent)
            .primary
            .get(filename)
            .cloned()
            .unwrap_or_default()
    }

    /// Offsets a resync after the next save starts from: the pending ones if a stale
    /// compilation already parked some.
    pub fn latest_offsets(&self, filename: &str) -> BTreeSet<u32> {
        let persistent = lock(&self.persistent);
        persistent
            .pending
            .get(filename)
            .or_else(|| persistent.primary.get(filename))
            .cloned()
            .unwrap_or_default()
    }

    pub fn pending(&self, filename: &str) -> Option<BTreeSet<u32>> {
        lock(&self.persistent).pending.get(filename).cloned()
    }

    /// Whether the opcode described by `hit` should halt.
    pub fn has(&self, hit: &BreakpointQuery<'_>) -> bool {
        if self.contains(hit.filename, hit.opcode_offset) && self.cache.is_breakable(hit.filename) {
            return true;
        }
        lock(&self.transient).iter().any(|bp| bp.matches(hit))
    }

    /// Replaces the breakpoints of `filename` with `new_offsets` of a new compilation.
    ///
    /// While RAM still runs the old bytecode the new set is parked and both sets are written,
    /// so the file survives a crash with the union.
    pub fn resync(&self, filename: &str, new_offsets: BTreeSet<u32>) {
        let ram_matches = self.cache.ram_state_matches_disk(filename);
        {
            let mut persistent = lock(&self.persistent);
            if ram_matches {
                persistent.pending.remove(filename);
                set_or_remove(&mut persistent.primary, filename, new_offsets);
            } else {
                log::debug!(
                    "{} is stale in RAM, parking {} breakpoints",
                    filename,
                    new_offsets.len()
                );
                persistent.pending.insert(filename.to_string(), new_offsets);
            }
        }
        self.persist();
        if ram_matches {
            self.notify(filename, BreakpointChange::Replaced);
        }
    }

    /// `filename` was reloaded: parked offsets become the active ones.
    pub fn on_reload(&self, filename: &str) {
        let promoted = {
            let mut persistent = lock(&self.persistent);
            match persistent.pending.remove(filename) {
                Some(offsets) => {
                    set_or_remove(&mut persistent.primary, filename, offsets);
                    true
                }
                None => false,
            }
        };
        if promoted {
            self.persist();
            self.notify(filename, BreakpointChange::Replaced);
        }
    }

    pub fn add_transient(&self, bp: TransientBreakpoint) {
        lock(&self.transient).push(bp);
    }

    pub fn clear_transient(&self) {
        lock(&self.transient).clear();
    }

    pub fn transient(&self) -> Vec<TransientBreakpoint> {
        lock(&self.transient).clone()
    }

    /// Whole-file rewrite. Failures are reported, never fatal.
    fn persist(&self) {
        if let Err(e) = self.write() {
            log::warn!("{}", e);
            self.events.send(DebuggerEvent::Warning(e.to_string()));
        }
    }

    fn write(&self) -> Result<()> {
        let merged = {
            let persistent = lock(&self.persistent);
            let mut merged = persistent.primary.clone();
            for (filename, offsets) in &persistent.pending {
                merged
                    .entry(filename.clone())
                    .or_default()
                    .extend(offsets.iter().copied());
            }
            merged
        };
        let data = serde_json::to_string_pretty(&merged)
            .map_err(|e| DebuggerError::Persistence(e.to_string()))?;
        write_atomic(&self.path, data.as_bytes()).map_err(|e| {
            DebuggerError::Persistence(format!("{}: {}", self.path.display(), e))
        })
    }

    fn notify(&self, filename: &str, change: BreakpointChange) {
        for listener in lock(&self.listeners).iter() {
            listener(filename, change);
        }
        self.events.send(DebuggerEvent::BreakpointsChanged {
            filename: filename.to_string(),
        });
    }
}

fn read_offsets(path: &Path) -> anyhow::Result<OffsetMap> {
    let data = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}

fn set_or_remove(map: &mut OffsetMap, filename: &str, offsets: BTreeSet<u32>) {
    if offsets.is_empty() {
        map.remove(filename);
    } else {
        map.insert(filename.to_string(), offsets);
    }
}

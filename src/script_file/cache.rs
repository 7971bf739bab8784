use super::entry::{ExpsText, MapPair, ScriptFile, ScriptFileFlags, SourceView, SsbsText};
use crate::compiler::{Compilation, Rom, ScriptCompiler, SsbModel};
use crate::error::{DebuggerError, Result};
use crate::events::{DebuggerEvent, EventSender};
use crate::project::ProjectFiles;
use crate::source_map::SourceMap;
use crate::utils::{lock, sha256_hex};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpsLoadMode {
    /// Refuse to load text whose recorded hash does not match the bytecode.
    Strict,
    /// Throw the stale text away and decompile the bytecode again.
    ForceDecompile,
    /// Load the stale text anyway and record the current bytecode hash for it.
    ForceLoadText,
}

/// What a save changed, handed to the reload coordinator.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveOutcome {
    pub filename: String,
    pub view: SourceView,
    /// True when the VM does not hold the file, so the new bytecode can be swapped in now.
    pub ready_to_reload: bool,
    /// Map of the previous compilation for the saved view, if it was known.
    pub previous_map: Option<SourceMap>,
    pub new_map: SourceMap,
    pub content_hash: String,
    pub included_files: BTreeSet<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MacroDependentOutcome {
    Recompiled(SaveOutcome),
    /// The dependent's EXPS text was already out of sync with its bytecode; left untouched.
    SkippedStale { filename: String },
    /// Recompiling the dependent failed; its ROM file and cache entry are unchanged.
    Failed { filename: String, error: String },
}


/// Owns every SSB the user or the VM has touched, keyed by ROM path.
///
/// Each entry has its own lock, held for the duration of flag transitions and saves.
pub struct ScriptFileCache {
    compiler: Arc<dyn ScriptCompiler>,
    rom: Arc<dyn Rom>,
    project: Arc<ProjectFiles>,
    files: RwLock<HashMap<String, Arc<Mutex<ScriptFile>>>>,
    events: EventSender,
}

impl ScriptFileCache {
    pub fn new(
        compiler: Arc<dyn ScriptCompiler>,
        rom: Arc<dyn Rom>,
        project: Arc<ProjectFiles>,
        events: EventSender,
    ) -> Self {
        Self {
            compiler,
            rom,
            project,
            files: RwLock::new(HashMap::new()),
            events,
        }
    }

    pub fn project(&self) -> &Arc<ProjectFiles> {
        &self.project
    }

    /// Returns the entry for `filename`, reading and parsing it from the ROM on first access.
    pub fn get(&self, filename: &str) -> Result<Arc<Mutex<ScriptFile>>> {
        if let Some(entry) = self.cached(filename) {
            return Ok(entry);
        }

        let bytes = self
            .rom
            .read_file(filename)?
            .ok_or_else(|| DebuggerError::NotFound(filename.to_string()))?;
        let model = self.compiler.deserialize(&bytes)?;
        let hash = sha256_hex(&bytes);

        let mut files = self
            .files
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        // Another thread may have loaded it while we were parsing.
        let entry = files
            .entry(filename.to_string())
            .or_insert_with(|| {
                log::debug!("Loaded {} from ROM ({})", filename, hash);
                Arc::new(Mutex::new(ScriptFile::new(
                    filename.to_string(),
                    model,
                    hash,
                )))
            })
            .clone();
        Ok(entry)
    }

    /// Entry for `filename` if it was loaded before; never touches the ROM.
    pub fn cached(&self, filename: &str) -> Option<Arc<Mutex<ScriptFile>>> {
        self.files
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(filename)
            .cloned()
    }

    pub fn model(&self, filename: &str) -> Result<Arc<SsbModel>> {
        Ok(lock(&*self.get(filename)?).model())
    }

    pub fn content_hash(&self, filename: &str) -> Result<String> {
        Ok(lock(&*self.get(filename)?).content_hash.clone())
    }

    pub fn flags(&self, filename: &str) -> Result<ScriptFileFlags> {
        Ok(lock(&*self.get(filename)?).flags)
    }

    /// Files never loaded cannot be stale, so they count as breakable.
    pub fn is_breakable(&self, filename: &str) -> bool {
        self.cached(filename)
            .map(|entry| lock(&entry).is_breakable())
            .unwrap_or(true)
    }

    pub fn ram_state_matches_disk(&self, filename: &str) -> bool {
        self.cached(filename)
            .map(|entry| lock(&entry).flags.ram_state_matches_disk)
            .unwrap_or(true)
    }

    /// Source map matching the bytecode in RAM for `view`.
    pub fn active_source_map(&self, filename: &str, view: SourceView) -> Option<SourceMap> {
        let entry = self.cached(filename)?;
        let file = lock(&entry);
        file.marks.permanent.get(view).cloned()
    }

    pub fn open_in_editor(&self, filename: &str) -> Result<Arc<Mutex<ScriptFile>>> {
        let entry = self.get(filename)?;
        lock(&entry).flags.opened_in_editor = true;
        Ok(entry)
    }

    /// Called by the ground-engine tracker when the VM loads `filename` into a hanger.
    pub fn open_in_ground_engine(&self, filename: &str) -> Result<()> {
        let entry = self.get(filename)?;
        let mut file = lock(&entry);
        let was_open = file.flags.opened_in_ground_engine;
        file.flags.opened_in_ground_engine = true;
        if !was_open && file.clear_stale() {
            // The VM just read the new bytecode from the ROM.
            log::info!("{} reloaded by the game, swapping in the saved version", filename);
            self.events
                .send(DebuggerEvent::ReloadRequested(filename.to_string()));
        }
        Ok(())
    }

    /// Returns whether the editor may close. Closing while RAM is stale asks `confirm` first
    /// and disables the file's breakpoints until the next reload.
    pub fn close_in_editor(&self, filename: &str, confirm: impl FnOnce(&str) -> bool) -> bool {
        let Some(entry) = self.cached(filename) else {
            return true;
        };
        // The prompt may block, so it runs without the entry lock held.
        let stale = !lock(&entry).flags.ram_state_matches_disk;
        if stale && !confirm(filename) {
            return false;
        }
        let mut file = lock(&entry);
        if !file.flags.ram_state_matches_disk {
            file.flags.breakpoints_disabled_because_stale = true;
        }
        file.flags.opened_in_editor = false;
        true
    }

    /// Called by the ground-engine tracker when the VM drops `filename` from every hanger.
    pub fn close_in_ground_engine(&self, filename: &str) {
        let Some(entry) = self.cached(filename) else {
            return;
        };
        let mut file = lock(&entry);
        file.flags.opened_in_ground_engine = false;
        if file.clear_stale() {
            self.events
                .send(DebuggerEvent::ReloadRequested(filename.to_string()));
        }
    }

    /// Marks `filename` as loaded in RAM with bytecode older than the disk (save state restore).
    pub fn mark_stale_from_savestate(&self, filename: &str) -> Result<()> {
        let entry = self.get(filename)?;
        lock(&entry).mark_ram_stale_from_savestate();
        Ok(())
    }

    /// Emits the reload event for `filename` explicitly.
    pub fn force_reload(&self, filename: &str) {
        self.events
            .send(DebuggerEvent::ReloadRequested(filename.to_string()));
    }

    /// Performs a reload on the UI thread: parked marks become the ones the debugger uses.
    ///
    /// Skipped while RAM is stale again, e.g. a save state was loaded after the reload was
    /// requested; the next unload requests it once more.
    pub fn apply_reload(&self, filename: &str) -> bool {
        let Some(entry) = self.cached(filename) else {
            return false;
        };
        let mut file = lock(&entry);
        if !file.flags.ram_state_matches_disk {
            log::debug!("Deferring reload of {}: RAM is stale again", filename);
            return false;
        }
        file.marks.promote();
        true
    }

    pub fn load_ssbs(&self, filename: &str) -> Result<SsbsText> {
        let entry = self.get(filename)?;
        let mut file = lock(&entry);
        if let Some(ssbs) = &file.ssbs {
            return Ok(ssbs.clone());
        }
        let (text, source_map) = self.compiler.decompile_ssbs(&file.model)?;
        file.marks.record_latest(SourceView::Ssbs, source_map.clone());
        let view = SsbsText { text, source_map };
        file.ssbs = Some(view.clone());
        Ok(view)
    }

    pub fn load_exps(&self, filename: &str, mode: ExpsLoadMode) -> Result<ExpsText> {
        let entry = self.get(filename)?;
        let mut file = lock(&entry);
        if let Some(exps) = &file.exps
            && mode == ExpsLoadMode::Strict
        {
            return Ok(exps.clone());
        }

        let absolute_path = self.project.exps_path(filename);
        let hash = file.content_hash.clone();
        let from_disk = self.project.exps_exists(filename) && mode != ExpsLoadMode::ForceDecompile;

        let (text, source_map) = if from_disk {
            if !self.project.exps_hash_is(filename, &hash) {
                if mode == ExpsLoadMode::Strict {
                    return Err(DebuggerError::StaleMapping {
                        filename: filename.to_string(),
                    });
                }
                log::warn!("Loading stale EXPS text of {} on request", filename);
                self.project.exps_save_hash(filename, &hash)?;
            }
            self.project.exps_load(filename)?
        } else {
            let (text, source_map) = self.compiler.decompile_exps(&file.model)?;
            self.project.exps_save(filename, &text, &source_map)?;
            self.project.exps_save_hash(filename, &hash)?;
            (text, source_map)
        };

        file.marks.record_latest(SourceView::Exps, source_map.clone());
        let view = ExpsText {
            text,
            source_map,
            absolute_path,
            bytecode_hash: hash,
        };
        file.exps = Some(view.clone());
        Ok(view)
    }

    pub fn save_from_ssbs(&self, filename: &str, text: &str) -> Result<SaveOutcome> {
        let entry = self.get(filename)?;
        let mut file = lock(&entry);

        let compilation = self.compiler.compile_ssbs(text)?;
        let (bytes, hash) = self.persist(filename, &compilation.model)?;

        let previous_map = file.marks.latest().get(SourceView::Ssbs).cloned();
        let source_map = compilation.source_map.clone();
        self.apply_compilation(&mut file, compilation, SourceView::Ssbs, hash.clone());
        file.ssbs = Some(SsbsText {
            text: text.to_string(),
            source_map: source_map.clone(),
        });
        // The EXPS text no longer describes this bytecode.
        file.exps = None;

        log::info!("Saved {} from SSBS ({} bytes)", filename, bytes);
        Ok(SaveOutcome {
            filename: filename.to_string(),
            view: SourceView::Ssbs,
            ready_to_reload: !file.flags.opened_in_ground_engine,
            previous_map,
            new_map: source_map,
            content_hash: hash,
            included_files: BTreeSet::new(),
        })
    }

    pub fn save_from_exps(&self, filename: &str, text: &str) -> Result<SaveOutcome> {
        let entry = self.get(filename)?;
        let mut file = lock(&entry);

        let lookup_paths = self.project.lookup_paths(filename);
        let compilation = self.compiler.compile_exps(text, &lookup_paths)?;
        let (bytes, hash) = self.persist(filename, &compilation.model)?;

        // The ROM holds the new bytecode from here on, so the cache must follow it even when
        // a sidecar write fails.
        let previous_map = file.marks.latest().get(SourceView::Exps).cloned();
        let source_map = compilation.source_map.clone();
        let included_files = compilation.included_files.clone();
        self.apply_compilation(&mut file, compilation, SourceView::Exps, hash.clone());

        if let Err(e) =
            self.save_exps_sidecars(filename, text, &source_map, &hash, &included_files)
        {
            log::warn!(
                "Saved {} but its EXPS sidecar files are out of date: {}",
                filename,
                e
            );
            self.events.send(DebuggerEvent::Warning(format!(
                "{} was saved but its EXPS files could not be written: {}",
                filename, e
            )));
        }
        file.exps = Some(ExpsText {
            text: text.to_string(),
            source_map: source_map.clone(),
            absolute_path: self.project.exps_path(filename),
            bytecode_hash: hash.clone(),
        });
        file.ssbs = None;

        log::info!(
            "Saved {} from EXPS ({} bytes, {} includes)",
            filename,
            bytes,
            included_files.len()
        );
        Ok(SaveOutcome {
            filename: filename.to_string(),
            view: SourceView::Exps,
            ready_to_reload: !file.flags.opened_in_ground_engine,
            previous_map,
            new_map: source_map,
            content_hash: hash,
            included_files,
        })
    }

    /// Writes a shared macro file and recompiles every dependent SSB whose EXPS text still
    /// matches its bytecode.
    ///
    /// Only a failed macro write is an error. Each dependent gets its own outcome, so the ones
    /// that were recompiled still go through reload coordination when another one fails.
    pub fn save_exps_macro(
        &self,
        macro_path: &Path,
        text: &str,
        dependent_ssbs: &[String],
    ) -> Result<Vec<MacroDependentOutcome>> {
        self.project.write_macro(macro_path, text)?;

        let outcomes = dependent_ssbs
            .iter()
            .map(|ssb| {
                self.recompile_dependent(macro_path, ssb).unwrap_or_else(|e| {
                    log::error!(
                        "Recompiling {} after editing {:?} failed: {}",
                        ssb,
                        macro_path,
                        e
                    );
                    MacroDependentOutcome::Failed {
                        filename: ssb.clone(),
                        error: e.to_string(),
                    }
                })
            })
            .collect();
        Ok(outcomes)
    }

    fn recompile_dependent(&self, macro_path: &Path, ssb: &str) -> Result<MacroDependentOutcome> {
        let hash = self.content_hash(ssb)?;
        if !self.project.exps_hash_is(ssb, &hash) {
            log::warn!(
                "Not recompiling {} after editing {:?}: its EXPS text is out of date",
                ssb,
                macro_path
            );
            return Ok(MacroDependentOutcome::SkippedStale {
                filename: ssb.to_string(),
            });
        }
        let (ssb_text, _) = self.project.exps_load(ssb)?;
        Ok(MacroDependentOutcome::Recompiled(
            self.save_from_exps(ssb, &ssb_text)?,
        ))
    }

    /// Serializes and writes the model to the ROM. Nothing in the cache changes on failure.
    fn persist(&self, filename: &str, model: &SsbModel) -> Result<(usize, String)> {
        let bytes = self.compiler.serialize(model)?;
        let hash = sha256_hex(&bytes);
        let len = bytes.len();
        self.rom.write_file(filename, bytes)?;
        self.rom.save()?;
        Ok((len, hash))
    }

    fn apply_compilation(
        &self,
        file: &mut ScriptFile,
        compilation: Compilation,
        view: SourceView,
        hash: String,
    ) {
        if file.flags.opened_in_ground_engine {
            file.mark_ram_stale();
        }
        // Marks of the new compilation stay parked until the reload event.
        file.marks.temporary = Some(MapPair::only(view, compilation.source_map));
        file.model = Arc::new(compilation.model);
        file.content_hash = hash;
    }

    fn save_exps_sidecars(
        &self,
        filename: &str,
        text: &str,
        source_map: &SourceMap,
        hash: &str,
        included: &BTreeSet<PathBuf>,
    ) -> Result<()> {
        self.project.exps_save(filename, text, source_map)?;
        self.project.exps_save_hash(filename, hash)?;
        self.update_include_usage(filename, included)
    }

    fn update_include_usage(&self, filename: &str, included: &BTreeSet<PathBuf>) -> Result<()> {
        let previous = self.project.inclusions(filename);
        for removed in previous.difference(included) {
            self.project.include_usage_remove(removed, filename)?;
        }
        for added in included.difference(&previous) {
            self.project.include_usage_add(added, filename)?;
        }
        self.project.save_inclusions(filename, included)?;
        Ok(())
    }
}

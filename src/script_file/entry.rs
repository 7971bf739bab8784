use crate::compiler::SsbModel;
use crate::source_map::SourceMap;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceView {
    Ssbs,
    Exps,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptFileFlags {
    pub opened_in_editor: bool,
    pub opened_in_ground_engine: bool,
    /// False while the VM still runs bytecode from before the last save.
    pub ram_state_matches_disk: bool,
    /// Set when the editor was closed while RAM still held a stale version of the file.
    pub breakpoints_disabled_because_stale: bool,
}

impl Default for ScriptFileFlags {
    fn default() -> Self {
        Self {
            opened_in_editor: false,
            opened_in_ground_engine: false,
            ram_state_matches_disk: true,
            breakpoints_disabled_because_stale: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SsbsText {
    pub text: String,
    pub source_map: SourceMap,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExpsText {
    pub text: String,
    pub source_map: SourceMap,
    pub absolute_path: PathBuf,
    /// Hash of the bytecode this text was last compiled to.
    pub bytecode_hash: String,
}

/// Source maps of one compilation, per textual view.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapPair {
    pub ssbs: Option<SourceMap>,
    pub exps: Option<SourceMap>,
}

impl MapPair {
    pub fn only(view: SourceView, map: SourceMap) -> Self {
        let mut pair = Self::default();
        pair.set(view, map);
        pair
    }

    pub fn get(&self, view: SourceView) -> Option<&SourceMap> {
        match view {
            SourceView::Ssbs => self.ssbs.as_ref(),
            SourceView::Exps => self.exps.as_ref(),
        }
    }

    pub fn set(&mut self, view: SourceView, map: SourceMap) {
        match view {
            SourceView::Ssbs => self.ssbs = Some(map),
            SourceView::Exps => self.exps = Some(map),
        }
    }
}

/// Opcode <-> source anchors used by editors and the debugger.
///
/// `permanent` always describes the bytecode the VM executes. `temporary` holds the maps of a
/// newer compilation until the next reload event promotes them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceMarks {
    pub permanent: MapPair,
    pub temporary: Option<MapPair>,
}

impl SourceMarks {
    /// Maps of the most recent compilation, parked or not.
    pub fn latest(&self) -> &MapPair {
        self.temporary.as_ref().unwrap_or(&self.permanent)
    }

    pub fn record_latest(&mut self, view: SourceView, map: SourceMap) {
        match self.temporary.as_mut() {
            Some(temporary) => temporary.set(view, map),
            None => self.permanent.set(view, map),
        }
    }

    pub fn promote(&mut self) -> bool {
        match self.temporary.take() {
            Some(temporary) => {
                self.permanent = temporary;
                true
            }
            None => false,
        }
    }
}

/// Cached state of one SSB file.
#[derive(Debug)]
pub struct ScriptFile {
    pub(crate) filename: String,
    pub(crate) model: Arc<SsbModel>,
    pub(crate) ssbs: Option<SsbsText>,
    pub(crate) exps: Option<ExpsText>,
    pub(crate) content_hash: String,
    pub(crate) flags: ScriptFileFlags,
    pub(crate) marks: SourceMarks,
}

impl ScriptFile {
    pub(crate) fn new(filename: String, model: SsbModel, content_hash: String) -> Self {
        Self {
            filename,
            model: Arc::new(model),
            ssbs: None,
            exps: None,
            content_hash,
            flags: ScriptFileFlags::default(),
            marks: SourceMarks::default(),
        }
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Immutable snapshot of the compiled model; stays valid across later saves.
    pub fn model(&self) -> Arc<SsbModel> {
        self.model.clone()
    }

    pub fn ssbs(&self) -> Option<&SsbsText> {
        self.ssbs.as_ref()
    }

    pub fn exps(&self) -> Option<&ExpsText> {
        self.exps.as_ref()
    }

    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    pub fn flags(&self) -> ScriptFileFlags {
        self.flags
    }

    pub fn marks(&self) -> &SourceMarks {
        &self.marks
    }

    pub fn is_breakable(&self) -> bool {
        !self.flags.breakpoints_disabled_because_stale
    }

    /// The map that matches the bytecode in RAM. Prefers EXPS when both are known.
    pub fn ram_source_map(&self) -> Option<(SourceView, &SourceMap)> {
        if let Some(map) = self.marks.permanent.get(SourceView::Exps) {
            return Some((SourceView::Exps, map));
        }
        self.marks
            .permanent
            .get(SourceView::Ssbs)
            .map(|map| (SourceView::Ssbs, map))
    }

    /// Marks the RAM copy as out of date; the current marks stay in use until the next reload.
    pub(crate) fn mark_ram_stale(&mut self) {
        if self.flags.ram_state_matches_disk {
            self.flags.ram_state_matches_disk = false;
            if self.marks.temporary.is_none() {
                self.marks.temporary = Some(MapPair::default());
            }
        }
    }

    /// A save state put older bytecode into RAM: the current maps describe the disk, not RAM.
    pub(crate) fn mark_ram_stale_from_savestate(&mut self) {
        if self.flags.ram_state_matches_disk {
            let current = std::mem::take(&mut self.marks.permanent);
            self.marks.temporary = Some(current);
        }
        self.flags.ram_state_matches_disk = false;
        self.flags.breakpoints_disabled_because_stale = true;
    }

    pub(crate) fn clear_stale(&mut self) -> bool {
        let was_stale = !self.flags.ram_state_matches_disk;
        self.flags.ram_state_matches_disk = true;
        self.flags.breakpoints_disabled_because_stale = false;
        was_stale
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source_map::SourceMapEntry;

    fn map(line: u32) -> SourceMap {
        let mut map = SourceMap::new();
        map.insert(0, SourceMapEntry::new(line, 0));
        map
    }

    #[test]
    fn test_default_flags_match_ram() {
        let flags = ScriptFileFlags::default();
        assert!(flags.ram_state_matches_disk);
        assert!(!flags.opened_in_editor);
        assert!(!flags.opened_in_ground_engine);
        assert!(!flags.breakpoints_disabled_because_stale);
    }

    #[test]
    fn test_marks_record_latest_and_promote() {
        let mut marks = SourceMarks::default();
        marks.record_latest(SourceView::Ssbs, map(1));
        assert_eq!(marks.permanent.get(SourceView::Ssbs), Some(&map(1)));

        marks.temporary = Some(MapPair::only(SourceView::Exps, map(2)));
        marks.record_latest(SourceView::Ssbs, map(3));
        assert_eq!(marks.latest().get(SourceView::Ssbs), Some(&map(3)));
        assert_eq!(marks.permanent.get(SourceView::Ssbs), Some(&map(1)));

        assert!(marks.promote());
        assert_eq!(marks.permanent.get(SourceView::Exps), Some(&map(2)));
        assert!(!marks.promote());
    }

    #[test]
    fn test_ram_source_map_prefers_exps() {
        let mut file = ScriptFile::new("a.ssb".to_string(), SsbModel::default(), "h".into());
        assert!(file.ram_source_map().is_none());
        file.marks.permanent.set(SourceView::Ssbs, map(1));
        assert_eq!(file.ram_source_map().unwrap().0, SourceView::Ssbs);
        file.marks.permanent.set(SourceView::Exps, map(2));
        assert_eq!(file.ram_source_map().unwrap().0, SourceView::Exps);
    }

    #[test]
    fn test_stale_transitions() {
        let mut file = ScriptFile::new("a.ssb".to_string(), SsbModel::default(), "h".into());
        file.mark_ram_stale();
        assert!(!file.flags.ram_state_matches_disk);
        assert!(file.marks.temporary.is_some());
        file.flags.breakpoints_disabled_because_stale = true;
        assert!(!file.is_breakable());
        assert!(file.clear_stale());
        assert!(file.is_breakable());
        assert!(!file.clear_stale());
    }

    #[test]
    fn test_savestate_stale_parks_current_maps() {
        let mut file = ScriptFile::new("a.ssb".to_string(), SsbModel::default(), "h".into());
        file.marks.permanent.set(SourceView::Ssbs, map(1));
        file.mark_ram_stale_from_savestate();
        assert!(!file.is_breakable());
        assert!(file.ram_source_map().is_none());
        assert!(file.marks.promote());
        assert_eq!(file.ram_source_map().unwrap().1, &map(1));
    }
}

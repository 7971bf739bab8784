//! Mapping between opcode offsets of a compiled SSB and positions in its SSBS/EXPS text.
//!
//! The forward direction (offset -> position) is authoritative; the reverse direction
//! (line -> offsets) is derived on demand when the user clicks a line to set a breakpoint.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Where an inlined macro was called from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacroCallSite {
    /// Absolute path of the EXPS file containing the call; `None` for the SSB's own EXPS file.
    #[serde(default)]
    pub file: Option<PathBuf>,
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MacroInfo {
    /// Absolute path of the included EXPS file the opcode originated from.
    #[serde(default)]
    pub macro_path: Option<PathBuf>,
    #[serde(default)]
    pub called_in: Option<MacroCallSite>,
    /// Opcode offset execution continues at after the macro returns.
    #[serde(default)]
    pub return_addr: Option<u32>,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

impl MacroInfo {
    /// Only the first opcode of an inlined macro carries both the call site and the return address.
    pub fn is_call_site(&self) -> bool {
        self.called_in.is_some() && self.return_addr.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMapEntry {
    pub line: u32,
    pub column: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub macro_info: Option<MacroInfo>,
}

impl SourceMapEntry {
    pub fn new(line: u32, column: u32) -> Self {
        Self {
            line,
            column,
            macro_info: None,
        }
    }

    pub fn in_macro(line: u32, column: u32, macro_info: MacroInfo) -> Self {
        Self {
            line,
            column,
            macro_info: Some(macro_info),
        }
    }

    pub fn macro_path(&self) -> Option<&Path> {
        self.macro_info.as_ref()?.macro_path.as_deref()
    }

    pub fn is_macro_call_site(&self) -> bool {
        self.macro_info.as_ref().is_some_and(MacroInfo::is_call_site)
    }

    /// Line of the macro call in the SSB's own text, for the first opcode of an inlined macro.
    fn own_call_line(&self) -> Option<u32> {
        let info = self.macro_info.as_ref().filter(|info| info.is_call_site())?;
        let site = info.called_in.as_ref()?;
        site.file.is_none().then_some(site.line)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SourceMap {
    entries: BTreeMap<u32, SourceMapEntry>,
}

impl SourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, opcode_offset: u32, entry: SourceMapEntry) {
        self.entries.insert(opcode_offset, entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn line_col_for(&self, opcode_offset: u32) -> Option<&SourceMapEntry> {
        self.entries.get(&opcode_offset)
    }

    /// Offsets whose source position lies on `line` of the SSB's own text.
    /// Opcodes that originate inside an included macro belong to the macro file, not this one,
    /// except the first one, which also stands for the call in this text.
    pub fn opcodes_at_line(&self, line: u32) -> Vec<u32> {
        self.entries
            .iter()
            .filter(|(_, e)| match e.own_call_line() {
                Some(call_line) => call_line == line,
                None => e.line == line && e.macro_path().is_none(),
            })
            .map(|(offset, _)| *offset)
            .collect()
    }

    /// Offsets whose source position lies on `line` of the included macro file `macro_path`.
    pub fn opcodes_at_macro_line(&self, macro_path: &Path, line: u32) -> Vec<u32> {
        self.entries
            .iter()
            .filter(|(_, e)| e.line == line && e.macro_path() == Some(macro_path))
            .map(|(offset, _)| *offset)
            .collect()
    }

    /// Finite and restartable: every call yields the full map in offset order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &SourceMapEntry)> + '_ {
        self.entries.iter().map(|(offset, entry)| (*offset, entry))
    }

    pub fn included_macros(&self) -> BTreeSet<PathBuf> {
        self.entries
            .values()
            .filter_map(|e| e.macro_path().map(Path::to_path_buf))
            .collect()
    }

    /// Maps offsets of this map onto another compilation of the same text by source line.
    ///
    /// Each offset is translated to its line here and to the first opcode on that line in
    /// `new_map`. Offsets whose line no longer produces an opcode are dropped.
    pub fn translate_offsets<'a>(
        &self,
        offsets: impl IntoIterator<Item = &'a u32>,
        new_map: &SourceMap,
    ) -> BTreeSet<u32> {
        let mut translated = BTreeSet::new();
        for offset in offsets {
            let Some(entry) = self.line_col_for(*offset) else {
                continue;
            };
            let candidates = match (entry.own_call_line(), entry.macro_path()) {
                (Some(call_line), _) => new_map.opcodes_at_line(call_line),
                (None, Some(path)) => new_map.opcodes_at_macro_line(path, entry.line),
                (None, None) => new_map.opcodes_at_line(entry.line),
            };
            if let Some(first) = candidates.first() {
                translated.insert(*first);
            }
        }
        translated
    }
}

impl FromIterator<(u32, SourceMapEntry)> for SourceMap {
    fn from_iter<I: IntoIterator<Item = (u32, SourceMapEntry)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

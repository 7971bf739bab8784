//! Contracts for the script compilers and the ROM container.
//!
//! Both are provided by the host; the debugger only relies on the signatures below.

use crate::error::CompileError;
use crate::source_map::SourceMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RoutineKind {
    #[default]
    Generic,
    Actor,
    Object,
    Performer,
    Coroutine,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SsbRoutine {
    pub kind: RoutineKind,
    /// Entity the routine is bound to; -1 when unbound.
    pub linked_to: i16,
    pub opcode_offset: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SsbOpcode {
    /// Offset in 16-bit words from the start of the routine table.
    pub offset: u32,
    pub id: u16,
    pub name: String,
    #[serde(default)]
    pub params: Vec<i32>,
}

/// Parsed contents of a compiled SSB script.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SsbModel {
    pub routines: Vec<SsbRoutine>,
    pub opcodes: Vec<SsbOpcode>,
    #[serde(default)]
    pub strings: BTreeMap<String, Vec<String>>,
}

impl SsbModel {
    pub fn opcode_at(&self, offset: u32) -> Option<&SsbOpcode> {
        self.opcodes
            .binary_search_by_key(&offset, |op| op.offset)
            .ok()
            .map(|idx| &self.opcodes[idx])
    }

    /// The opcode following `offset` in the same routine, if any.
    pub fn next_opcode_in_routine(&self, offset: u32) -> Option<&SsbOpcode> {
        let idx = self
            .opcodes
            .binary_search_by_key(&offset, |op| op.offset)
            .ok()?;
        let next = self.opcodes.get(idx + 1)?;
        let starts_new_routine = self
            .routines
            .iter()
            .any(|r| r.opcode_offset == next.offset);
        if starts_new_routine { None } else { Some(next) }
    }
}

/// Result of compiling script text.
#[derive(Debug, Clone, PartialEq)]
pub struct Compilation {
    pub model: SsbModel,
    pub source_map: SourceMap,
    /// Absolute paths of every EXPS file included, directly or transitively. Empty for SSBS.
    pub included_files: BTreeSet<PathBuf>,
}

pub trait ScriptCompiler: Send + Sync {
    fn deserialize(&self, bytes: &[u8]) -> anyhow::Result<SsbModel>;

    fn serialize(&self, model: &SsbModel) -> anyhow::Result<Vec<u8>>;

    fn compile_ssbs(&self, text: &str) -> Result<Compilation, CompileError>;

    fn compile_exps(
        &self,
        text: &str,
        lookup_paths: &[PathBuf],
    ) -> Result<Compilation, CompileError>;

    fn decompile_ssbs(&self, model: &SsbModel) -> anyhow::Result<(String, SourceMap)>;

    fn decompile_exps(&self, model: &SsbModel) -> anyhow::Result<(String, SourceMap)>;
}

pub trait Rom: Send + Sync {
    /// `Ok(None)` when the ROM has no file at `path`.
    fn read_file(&self, path: &str) -> anyhow::Result<Option<Vec<u8>>>;

    fn write_file(&self, path: &str, data: Vec<u8>) -> anyhow::Result<()>;

    /// Flushes written files to the ROM image on disk.
    fn save(&self) -> anyhow::Result<()>;
}

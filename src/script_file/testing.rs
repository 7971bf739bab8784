//! In-crate fixtures for unit tests of the cache and the components built on it.

use super::ScriptFileCache;
use crate::compiler::{
    Compilation, Rom, RoutineKind, ScriptCompiler, SsbModel, SsbOpcode, SsbRoutine,
};
use crate::error::CompileError;
use crate::events::{self, DebuggerEvent, EventSender};
use crate::project::ProjectFiles;
use crate::source_map::{SourceMap, SourceMapEntry};
use crate::utils::lock;
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};

/// One opcode per non-empty line, `Name [param]`, two words apart in a single routine.
/// Bytecode is the model as JSON.
pub struct LineCompiler;

impl LineCompiler {
    fn compile(text: &str) -> Result<Compilation, CompileError> {
        let mut model = SsbModel {
            routines: vec![SsbRoutine {
                kind: RoutineKind::Generic,
                linked_to: -1,
                opcode_offset: 0,
            }],
            ..SsbModel::default()
        };
        let mut source_map = SourceMap::new();
        for (idx, line) in text.lines().enumerate() {
            let mut tokens = line.split_whitespace();
            let Some(name) = tokens.next() else {
                continue;
            };
            let number = idx as u32 + 1;
            let params = tokens
                .map(|t| t.parse().map_err(|_| CompileError::parse("bad parameter", number, 1)))
                .collect::<Result<Vec<i32>, _>>()?;
            let offset = model.opcodes.len() as u32 * 2;
            model.opcodes.push(SsbOpcode {
                offset,
                id: 0,
                name: name.to_string(),
                params,
            });
            source_map.insert(offset, SourceMapEntry::new(number, 1));
        }
        Ok(Compilation {
            model,
            source_map,
            included_files: BTreeSet::new(),
        })
    }

    fn decompile(model: &SsbModel) -> (String, SourceMap) {
        let mut text = String::new();
        let mut source_map = SourceMap::new();
        for (idx, op) in model.opcodes.iter().enumerate() {
            text.push_str(&op.name);
            for param in &op.params {
                text.push_str(&format!(" {}", param));
            }
            text.push('\n');
            source_map.insert(op.offset, SourceMapEntry::new(idx as u32 + 1, 1));
        }
        (text, source_map)
    }
}

impl ScriptCompiler for LineCompiler {
    fn deserialize(&self, bytes: &[u8]) -> anyhow::Result<SsbModel> {
        Ok(serde_json::from_slice(bytes)?)
    }

    fn serialize(&self, model: &SsbModel) -> anyhow::Result<Vec<u8>> {
        Ok(serde_json::to_vec(model)?)
    }

    fn compile_ssbs(&self, text: &str) -> Result<Compilation, CompileError> {
        Self::compile(text)
    }

    fn compile_exps(&self, text: &str, _: &[PathBuf]) -> Result<Compilation, CompileError> {
        Self::compile(text)
    }

    fn decompile_ssbs(&self, model: &SsbModel) -> anyhow::Result<(String, SourceMap)> {
        Ok(Self::decompile(model))
    }

    fn decompile_exps(&self, model: &SsbModel) -> anyhow::Result<(String, SourceMap)> {
        Ok(Self::decompile(model))
    }
}

#[derive(Default)]
pub struct MapRom {
    files: Mutex<HashMap<String, Vec<u8>>>,
}

impl MapRom {
    pub fn insert_script(&self, path: &str, text: &str) {
        lock(&self.files).insert(path.to_string(), compiled(text));
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        lock(&self.files).get(path).cloned()
    }
}

impl Rom for MapRom {
    fn read_file(&self, path: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.file(path))
    }

    fn write_file(&self, path: &str, data: Vec<u8>) -> anyhow::Result<()> {
        lock(&self.files).insert(path.to_string(), data);
        Ok(())
    }

    fn save(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

pub fn compiled(text: &str) -> Vec<u8> {
    serde_json::to_vec(&LineCompiler::compile(text).unwrap().model).unwrap()
}

/// A cache over an in-memory ROM and a fresh project directory under the temp dir.
pub struct Fixture {
    pub cache: Arc<ScriptFileCache>,
    pub rom: Arc<MapRom>,
    pub root: PathBuf,
    pub sender: EventSender,
    pub events: Receiver<DebuggerEvent>,
}

impl Fixture {
    pub fn new(name: &str) -> Self {
        let mut root = std::env::temp_dir();
        root.push(format!("ssb_debugger_unit_{}_{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&root);
        let (tx, events) = events::channel();
        let rom = Arc::new(MapRom::default());
        let cache = Arc::new(ScriptFileCache::new(
            Arc::new(LineCompiler),
            rom.clone(),
            Arc::new(ProjectFiles::open(&root, "unit")),
            tx.clone(),
        ));
        Self {
            cache,
            rom,
            root,
            sender: tx,
            events,
        }
    }

    pub fn drain(&self) -> Vec<DebuggerEvent> {
        self.events.try_iter().collect()
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.root);
    }
}

use crate::source_map::SourceMap;
use crate::utils::{lock, write_atomic};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const MACROS_DIR: &str = "Macros";
pub const DEBUGGER_DIR: &str = "debugger";
const INCLUDE_USAGE_FILE: &str = "include_usage.json";

// BTreeMap keeps the index file stable across saves.
#[derive(Debug, Default, Serialize, Deserialize)]
struct IncludeUsage {
    #[serde(default)]
    used_by: BTreeMap<PathBuf, BTreeSet<String>>,
}

/// Per-ROM project directory: EXPS sources and their sidecars, shared macros and debugger state.
///
/// Layout for `SCRIPT/D01P11A/m01a_01.ssb`:
/// - `SCRIPT/D01P11A/m01a_01.exps` the EXPS text
/// - `SCRIPT/D01P11A/m01a_01.hash` hex SHA-256 of the SSB the text was last compiled to
/// - `SCRIPT/D01P11A/m01a_01.inclusion.json` absolute paths of the macros it includes
/// - `SCRIPT/D01P11A/m01a_01.sourcemap.json` the source map of that compilation
pub struct ProjectFiles {
    root: PathBuf,
    rom_name: String,
    usage: Mutex<IncludeUsage>,
}

impl ProjectFiles {
    pub fn open(root: impl Into<PathBuf>, rom_name: impl Into<String>) -> Self {
        let root = root.into();
        let usage_path = root.join(DEBUGGER_DIR).join(INCLUDE_USAGE_FILE);
        let usage = match std::fs::read_to_string(&usage_path) {
            Ok(data) => serde_json::from_str(&data).unwrap_or_else(|e| {
                log::warn!("Ignoring corrupt include index {:?}: {}", usage_path, e);
                IncludeUsage::default()
            }),
            Err(_) => IncludeUsage::default(),
        };
        Self {
            root,
            rom_name: rom_name.into(),
            usage: Mutex::new(usage),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn macros_dir(&self) -> PathBuf {
        self.root.join(MACROS_DIR)
    }

    pub fn debugger_dir(&self) -> PathBuf {
        self.root.join(DEBUGGER_DIR)
    }

    pub fn breakpoints_path(&self) -> PathBuf {
        self.debugger_dir()
            .join(format!("{}.breakpoints.json", self.rom_name))
    }

    pub fn savestate_sidecar_path(&self, slot: u32) -> PathBuf {
        self.debugger_dir()
            .join(format!("{}.save.{}.ge.json", self.rom_name, slot))
    }

    pub fn exps_path(&self, ssb_name: &str) -> PathBuf {
        self.sidecar(ssb_name, "exps")
    }

    fn sidecar(&self, ssb_name: &str, extension: &str) -> PathBuf {
        let mut path = self.root.join(ssb_name);
        path.set_extension(extension);
        path
    }

    /// Directories searched for includes when compiling the EXPS of `ssb_name`.
    pub fn lookup_paths(&self, ssb_name: &str) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Some(dir) = self.exps_path(ssb_name).parent() {
            paths.push(dir.to_path_buf());
        }
        paths.push(self.macros_dir());
        paths
    }

    pub fn exps_exists(&self, ssb_name: &str) -> bool {
        self.exps_path(ssb_name).is_file()
    }

    pub fn exps_load(&self, ssb_name: &str) -> anyhow::Result<(String, SourceMap)> {
        let path = self.exps_path(ssb_name);
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("read EXPS source {}", path.display()))?;
        let map_path = self.sidecar(ssb_name, "sourcemap.json");
        let source_map = match std::fs::read_to_string(&map_path) {
            Ok(data) => serde_json::from_str(&data)
                .with_context(|| format!("parse source map {}", map_path.display()))?,
            Err(_) => SourceMap::new(),
        };
        Ok((text, source_map))
    }

    pub fn exps_save(
        &self,
        ssb_name: &str,
        text: &str,
        source_map: &SourceMap,
    ) -> anyhow::Result<()> {
        let path = self.exps_path(ssb_name);
        write_atomic(&path, text.as_bytes())
            .with_context(|| format!("write EXPS source {}", path.display()))?;
        let map_path = self.sidecar(ssb_name, "sourcemap.json");
        write_atomic(&map_path, serde_json::to_string(source_map)?.as_bytes())
            .with_context(|| format!("write source map {}", map_path.display()))?;
        Ok(())
    }

    pub fn exps_hash_is(&self, ssb_name: &str, hash: &str) -> bool {
        std::fs::read_to_string(self.sidecar(ssb_name, "hash"))
            .map(|stored| stored.trim() == hash)
            .unwrap_or(false)
    }

    pub fn exps_save_hash(&self, ssb_name: &str, hash: &str) -> anyhow::Result<()> {
        let path = self.sidecar(ssb_name, "hash");
        write_atomic(&path, hash.as_bytes())
            .with_context(|| format!("write hash {}", path.display()))
    }

    pub fn inclusions(&self, ssb_name: &str) -> BTreeSet<PathBuf> {
        std::fs::read_to_string(self.sidecar(ssb_name, "inclusion.json"))
            .ok()
            .and_then(|data| serde_json::from_str(&data).ok())
            .unwrap_or_default()
    }

    pub fn save_inclusions(
        &self,
        ssb_name: &str,
        included: &BTreeSet<PathBuf>,
    ) -> anyhow::Result<()> {
        let path = self.sidecar(ssb_name, "inclusion.json");
        write_atomic(&path, serde_json::to_string_pretty(included)?.as_bytes())
            .with_context(|| format!("write inclusion list {}", path.display()))
    }

    pub fn include_usage_add(&self, macro_path: &Path, ssb_name: &str) -> anyhow::Result<()> {
        let mut usage = lock(&self.usage);
        usage
            .used_by
            .entry(macro_path.to_path_buf())
            .or_default()
            .insert(ssb_name.to_string());
        self.write_usage(&usage)
    }

    pub fn include_usage_remove(&self, macro_path: &Path, ssb_name: &str) -> anyhow::Result<()> {
        let mut usage = lock(&self.usage);
        if let Some(users) = usage.used_by.get_mut(macro_path) {
            users.remove(ssb_name);
            if users.is_empty() {
                usage.used_by.remove(macro_path);
            }
        }
        self.write_usage(&usage)
    }

    /// SSB names whose last compilation reported `macro_path` among its included files.
    ///
    /// A macro reached only through another macro shows up here only if the compiler reports
    /// nested includes.
    pub fn dependents_of(&self, macro_path: &Path) -> Vec<String> {
        lock(&self.usage)
            .used_by
            .get(macro_path)
            .map(|users| users.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn write_macro(&self, macro_path: &Path, text: &str) -> anyhow::Result<()> {
        write_atomic(macro_path, text.as_bytes())
            .with_context(|| format!("write macro {}", macro_path.display()))
    }

    fn write_usage(&self, usage: &IncludeUsage) -> anyhow::Result<()> {
        let path = self.debugger_dir().join(INCLUDE_USAGE_FILE);
        write_atomic(&path, serde_json::to_string_pretty(usage)?.as_bytes())
            .with_context(|| format!("write include index {}", path.display()))
    }
}

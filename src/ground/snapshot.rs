use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Ground engine state stored next to an emulator save state.
///
/// `ssbs` holds `[filename, content_hash]` pairs so a restore can tell which loaded scripts were
/// edited since the save state was taken.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundSnapshot {
    pub running: bool,
    pub ssbs: Vec<Option<(String, String)>>,
    pub ssxs: Vec<Option<String>>,
    #[serde(default)]
    pub load_ssb_for: Option<usize>,
}

impl GroundSnapshot {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("read ground state {}", path.display()))?;
        serde_json::from_str(&data)
            .with_context(|| format!("parse ground state {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let data = serde_json::to_string_pretty(self)?;
        crate::utils::write_atomic(path, data.as_bytes())
            .with_context(|| format!("write ground state {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sidecar_format() {
        let snapshot = GroundSnapshot {
            running: true,
            ssbs: vec![
                Some(("SCRIPT/COMMON/unionall.ssb".to_string(), "aa".to_string())),
                None,
            ],
            ssxs: vec![None, Some("SCRIPT/D01P11A/m01a01a.ssa".to_string())],
            load_ssb_for: Some(4),
        };
        let json: serde_json::Value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["ssbs"][0][0], "SCRIPT/COMMON/unionall.ssb");
        assert_eq!(json["ssbs"][0][1], "aa");
        assert!(json["ssbs"][1].is_null());
        assert_eq!(json["load_ssb_for"], 4);
    }

    #[test]
    fn test_save_and_load() {
        let mut path = std::env::temp_dir();
        path.push(format!("ssb_debugger_ground_{}.ge.json", std::process::id()));
        let snapshot = GroundSnapshot {
            running: false,
            ssbs: vec![None; 7],
            ssxs: vec![None; 4],
            load_ssb_for: None,
        };
        snapshot.save(&path).unwrap();
        assert_eq!(GroundSnapshot::load(&path).unwrap(), snapshot);
        let _ = std::fs::remove_file(&path);
    }
}

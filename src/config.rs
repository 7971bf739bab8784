use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const APPLICATION: &str = "skytemple-ssb-debugger";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebuggerConfig {
    #[serde(default = "default_true")]
    pub breakpoints_enabled: bool,
    #[serde(default = "default_false")]
    pub boost: bool,
    #[serde(default = "default_false")]
    pub debug_mode: bool,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_true")]
    pub confirm_close_stale: bool,
}

fn default_true() -> bool {
    true
}

fn default_false() -> bool {
    false
}

fn default_poll_interval_ms() -> u64 {
    33
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for DebuggerConfig {
    fn default() -> Self {
        Self {
            breakpoints_enabled: true,
            boost: false,
            debug_mode: false,
            poll_interval_ms: 33,
            log_level: "info".to_string(),
            confirm_close_stale: true,
        }
    }
}

impl DebuggerConfig {
    pub fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", APPLICATION).map(|dirs| dirs.config_dir().join("config.json"))
    }

    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Missing or unreadable files fall back to the defaults.
    pub fn load_from(path: &Path) -> Self {
        if path.exists()
            && let Ok(data) = std::fs::read_to_string(path)
        {
            match serde_json::from_str(&data) {
                Ok(config) => return config,
                Err(e) => log::warn!("Ignoring invalid config {:?}: {}", path, e),
            }
        }
        Self::default()
    }

    pub fn save(&self) -> anyhow::Result<()> {
        if let Some(path) = Self::config_path() {
            self.save_to(&path)?;
        }
        Ok(())
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let data = serde_json::to_string_pretty(self)?;
        std::fs::write(path, data)?;
        Ok(())
    }

    pub fn log_level_filter(&self) -> log::LevelFilter {
        self.log_level
            .parse()
            .unwrap_or(log::LevelFilter::Info)
    }
}

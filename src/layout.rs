//! Static data of the game binary: hook addresses, register conventions and name tables.
//!
//! One file per ROM region, kept as JSON next to the project. The core never hardcodes
//! game addresses.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookAddresses {
    /// Start of the opcode dispatch of the script engine.
    #[serde(default)]
    pub script_debug: Vec<u32>,
    #[serde(default)]
    pub ssb_load: Vec<u32>,
    #[serde(default)]
    pub ssx_load: Vec<u32>,
    #[serde(default)]
    pub talk_load: Vec<u32>,
    #[serde(default)]
    pub ground_start: Vec<u32>,
    #[serde(default)]
    pub ground_quit: Vec<u32>,
    #[serde(default)]
    pub ground_map_change: Vec<u32>,
    /// printf-like functions whose format string is in r0.
    #[serde(default)]
    pub printf_r0: Vec<u32>,
    /// printf-like functions whose format string is in r1.
    #[serde(default)]
    pub printf_r1: Vec<u32>,
    /// Handler of the debug_Print family of opcodes.
    #[serde(default)]
    pub script_print: Vec<u32>,
    #[serde(default)]
    pub debug_flag_get_1: Vec<u32>,
    #[serde(default)]
    pub debug_flag_get_2: Vec<u32>,
    #[serde(default)]
    pub debug_flag_set_1: Vec<u32>,
    #[serde(default)]
    pub debug_flag_set_2: Vec<u32>,
    /// Point where the engine checks whether developer assertions are enabled.
    #[serde(default)]
    pub script_debug_mode: Vec<u32>,
    /// Word holding the address unionall.ssb is loaded at.
    #[serde(default)]
    pub unionall_pointer: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookRegisters {
    /// Pointer to the script runtime struct at the opcode dispatch.
    #[serde(default = "default_runtime")]
    pub script_runtime: u8,
    #[serde(default = "default_one")]
    pub ssb_load_name: u8,
    #[serde(default = "default_two")]
    pub ssx_load_hanger: u8,
    #[serde(default = "default_three")]
    pub ssx_load_name: u8,
    #[serde(default)]
    pub talk_load_hanger: u8,
    /// Pointer to the runtime struct in the debug_Print handler.
    #[serde(default = "default_print_runtime")]
    pub script_print_runtime: u8,
    /// Pointer to the string in the debug_Print handler.
    #[serde(default = "default_one")]
    pub script_print_string: u8,
    /// Register receiving the result of the debug-mode check.
    #[serde(default)]
    pub debug_mode_result: u8,
}

fn default_runtime() -> u8 {
    6
}

fn default_print_runtime() -> u8 {
    4
}

fn default_one() -> u8 {
    1
}

fn default_two() -> u8 {
    2
}

fn default_three() -> u8 {
    3
}

impl Default for HookRegisters {
    fn default() -> Self {
        Self {
            script_runtime: 6,
            ssb_load_name: 1,
            ssx_load_hanger: 2,
            ssx_load_name: 3,
            talk_load_hanger: 0,
            script_print_runtime: 4,
            script_print_string: 1,
            debug_mode_result: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptEngineLayout {
    pub addresses: HookAddresses,
    #[serde(default)]
    pub registers: HookRegisters,
    /// Opcode names indexed by opcode id.
    #[serde(default)]
    pub opcodes: Vec<String>,
    /// Game variable names indexed by variable id.
    #[serde(default)]
    pub game_variables: Vec<String>,
}

impl ScriptEngineLayout {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("read script engine layout {}", path.display()))?;
        serde_json::from_str(&data)
            .with_context(|| format!("parse script engine layout {}", path.display()))
    }

    pub fn opcode_name(&self, id: u16) -> Option<&str> {
        self.opcodes.get(id as usize).map(String::as_str)
    }

    pub fn game_variable_name(&self, id: u16) -> Option<&str> {
        self.game_variables.get(id as usize).map(String::as_str)
    }
}

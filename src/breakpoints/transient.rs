use crate::runtime::{ScriptRuntimeRecord, ScriptTargetType};

/// Step-control breakpoint. `None` fields match anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransientBreakpoint {
    pub script_target_type: ScriptTargetType,
    pub script_target_slot: u16,
    pub is_in_unionall: Option<bool>,
    /// Absolute address of the opcode to stop at.
    pub opcode_addr: Option<u32>,
}

impl TransientBreakpoint {
    /// Any opcode run by the given script target.
    pub fn for_target(script_target_type: ScriptTargetType, script_target_slot: u16) -> Self {
        Self {
            script_target_type,
            script_target_slot,
            is_in_unionall: None,
            opcode_addr: None,
        }
    }

    pub fn in_unionall(mut self, is_in_unionall: bool) -> Self {
        self.is_in_unionall = Some(is_in_unionall);
        self
    }

    pub fn at_addr(mut self, opcode_addr: u32) -> Self {
        self.opcode_addr = Some(opcode_addr);
        self
    }

    pub fn matches(&self, hit: &BreakpointQuery<'_>) -> bool {
        self.script_target_type == hit.script_target_type
            && self.script_target_slot == hit.script_target_slot
            && self.is_in_unionall.is_none_or(|u| u == hit.is_in_unionall)
            && self.opcode_addr.is_none_or(|a| a == hit.opcode_addr)
    }
}

/// The opcode about to execute, as asked of the breakpoint store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakpointQuery<'a> {
    pub filename: &'a str,
    pub opcode_offset: u32,
    pub opcode_addr: u32,
    pub is_in_unionall: bool,
    pub script_target_type: ScriptTargetType,
    pub script_target_slot: u16,
}

impl<'a> BreakpointQuery<'a> {
    pub fn from_runtime(filename: &'a str, runtime: &ScriptRuntimeRecord) -> Self {
        Self {
            filename,
            opcode_offset: runtime.current_opcode_offset,
            opcode_addr: runtime.current_opcode_addr,
            is_in_unionall: runtime.is_in_unionall,
            script_target_type: runtime.script_target_type,
            script_target_slot: runtime.script_target_slot,
        }
    }
}

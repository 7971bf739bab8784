//! Snapshot of the script engine's runtime struct for the opcode about to execute.

use crate::emulator::{Emulator, MemoryExt};
use crate::error::{DebuggerError, Result};
use byteorder::{LittleEndian, ReadBytesExt};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of SSB hangers: unionall, three scene-bound ones and three talk ones.
pub const MAX_SSB: usize = 7;
/// Number of SSX hangers.
pub const MAX_SSX: usize = 3;
/// Talk scripts of hanger `h` live in SSB hanger `h + TALK_HANGER_OFFSET`.
pub const TALK_HANGER_OFFSET: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScriptTargetType {
    Generic,
    Actor,
    Object,
    Performer,
    Coroutine,
}

impl ScriptTargetType {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            1 => Some(ScriptTargetType::Generic),
            3 => Some(ScriptTargetType::Actor),
            4 => Some(ScriptTargetType::Object),
            5 => Some(ScriptTargetType::Performer),
            9 => Some(ScriptTargetType::Coroutine),
            _ => None,
        }
    }

    /// Entities own a slot id; global scripts and coroutines do not.
    pub fn has_slot(self) -> bool {
        matches!(
            self,
            ScriptTargetType::Actor | ScriptTargetType::Object | ScriptTargetType::Performer
        )
    }
}

impl fmt::Display for ScriptTargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScriptTargetType::Generic => "GENERIC",
            ScriptTargetType::Actor => "ACTOR",
            ScriptTargetType::Object => "OBJECT",
            ScriptTargetType::Performer => "PERFORMER",
            ScriptTargetType::Coroutine => "COROUTINE",
        };
        write!(f, "{}", name)
    }
}

/// Return frame of a script that called into another routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallFrame {
    pub start_addr_of_routine_table: u32,
    /// Absolute address execution resumes at when the callee returns.
    pub opcode_addr: u32,
}

impl CallFrame {
    pub fn opcode_offset(&self) -> u32 {
        self.opcode_addr.wrapping_sub(self.start_addr_of_routine_table) / 2
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptRuntimeRecord {
    pub pointer: u32,
    pub script_target_type: ScriptTargetType,
    pub script_target_addr: u32,
    pub script_target_slot: u16,
    pub start_addr_of_routine_table: u32,
    pub start_addr_of_opcode_table: u32,
    pub start_addr_of_str_table: u32,
    pub current_opcode_addr: u32,
    pub current_opcode_offset: u32,
    pub is_in_unionall: bool,
    pub hanger_ssb: usize,
    pub call_stack: Option<CallFrame>,
}

impl ScriptRuntimeRecord {
    /// Size of the part of the runtime struct that is read.
    pub const SIZE: usize = 0x34;

    /// Reads the runtime struct at `pointer`, the argument of the opcode dispatch hook.
    pub fn from_hook(emu: &dyn Emulator, pointer: u32, unionall_load_addr: u32) -> Result<Self> {
        if pointer == 0 {
            return Err(DebuggerError::Probe("null runtime pointer".to_string()));
        }
        let buffer = emu
            .read_bytes(pointer, Self::SIZE)
            .map_err(|e| DebuggerError::Probe(format!("read 0x{:08x}: {}", pointer, e)))?;
        let record = Self::parse(pointer, &buffer, unionall_load_addr)?;

        let script_target_slot = if record.script_target_type.has_slot()
            && record.script_target_addr != 0
        {
            emu.read_u16(record.script_target_addr).map_err(|e| {
                DebuggerError::Probe(format!(
                    "read target 0x{:08x}: {}",
                    record.script_target_addr, e
                ))
            })?
        } else {
            0
        };
        Ok(Self {
            script_target_slot,
            ..record
        })
    }

    fn parse(pointer: u32, buffer: &[u8], unionall_load_addr: u32) -> Result<Self> {
        let field_error = |offset: usize, e: std::io::Error| {
            DebuggerError::Probe(format!("field 0x{:02x}: {}", offset, e))
        };
        let word = |offset: usize| {
            let mut field = buffer.get(offset..).unwrap_or_default();
            field
                .read_u32::<LittleEndian>()
                .map_err(|e| field_error(offset, e))
        };

        let script_target_addr = word(0x04)?;
        let raw_type = word(0x08)?;
        let hanger = buffer
            .get(0x10..)
            .unwrap_or_default()
            .read_i16::<LittleEndian>()
            .map_err(|e| field_error(0x10, e))?;
        let start_addr_of_routine_table = word(0x14)?;
        let start_addr_of_opcode_table = word(0x18)?;
        let current_opcode_addr = word(0x1c)?;
        let start_addr_of_str_table = word(0x20)?;
        let call_stack_routine_table = word(0x24)?;
        let call_stack_opcode_addr = word(0x2c)?;

        let Some(script_target_type) = ScriptTargetType::from_raw(raw_type) else {
            return Err(DebuggerError::Probe(format!(
                "unknown script target type {}",
                raw_type
            )));
        };
        if current_opcode_addr < start_addr_of_routine_table {
            return Err(DebuggerError::Probe(format!(
                "opcode 0x{:08x} before routine table 0x{:08x}",
                current_opcode_addr, start_addr_of_routine_table
            )));
        }

        let is_in_unionall =
            unionall_load_addr != 0 && start_addr_of_routine_table == unionall_load_addr;
        let hanger_ssb = if is_in_unionall {
            0
        } else if hanger < 0 || hanger as usize >= MAX_SSB {
            return Err(DebuggerError::Probe(format!("hanger {} out of range", hanger)));
        } else {
            hanger as usize
        };

        let call_stack = (call_stack_opcode_addr > 0).then_some(CallFrame {
            start_addr_of_routine_table: call_stack_routine_table,
            opcode_addr: call_stack_opcode_addr,
        });

        Ok(Self {
            pointer,
            script_target_type,
            script_target_addr,
            script_target_slot: 0,
            start_addr_of_routine_table,
            start_addr_of_opcode_table,
            start_addr_of_str_table,
            current_opcode_addr,
            current_opcode_offset: (current_opcode_addr - start_addr_of_routine_table) / 2,
            is_in_unionall,
            hanger_ssb,
            call_stack,
        })
    }

    pub fn has_call_stack(&self) -> bool {
        self.call_stack.is_some()
    }

    /// Absolute address of the opcode at `offset` in the current routine table.
    pub fn opcode_addr_for(&self, offset: u32) -> u32 {
        self.start_addr_of_routine_table.wrapping_add(offset * 2)
    }
}

impl fmt::Display for ScriptRuntimeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} hanger {}{} @ {} (0x{:08x})",
            self.script_target_type,
            self.script_target_slot,
            self.hanger_ssb,
            if self.is_in_unionall { " [unionall]" } else { "" },
            self.current_opcode_offset,
            self.current_opcode_addr
        )
    }
}

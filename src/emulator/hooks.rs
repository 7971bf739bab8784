use super::memory::{MemoryExt, StringEncoding};
use super::{Emulator, HookCallback, HookId, Register, SharedEmulator};
use crate::debugger::print::format_printf;
use crate::error::{DebuggerError, Result};
use crate::events::{DebugFlagVar, LogKind};
use crate::layout::HookRegisters;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

/// Unregisters its hook when dropped.
pub struct HookHandle {
    emulator: SharedEmulator,
    id: HookId,
    address: u32,
}

impl HookHandle {
    pub fn address(&self) -> u32 {
        self.address
    }
}

impl Drop for HookHandle {
    fn drop(&mut self) {
        self.emulator.unregister_hook(self.id);
    }
}

impl std::fmt::Debug for HookHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HookHandle({} @ 0x{:08x})", self.id, self.address)
    }
}

/// Typed hooks of the script engine on top of the raw emulator hooks.
#[derive(Clone)]
pub struct HookSurface {
    emulator: SharedEmulator,
    registers: HookRegisters,
}

impl HookSurface {
    pub fn new(emulator: SharedEmulator, registers: HookRegisters) -> Self {
        Self {
            emulator,
            registers,
        }
    }

    pub fn emulator(&self) -> &SharedEmulator {
        &self.emulator
    }

    pub fn registers(&self) -> &HookRegisters {
        &self.registers
    }

    pub fn register_execution_hook(
        &self,
        address: u32,
        callback: impl Fn(&dyn Emulator, u32) + Send + Sync + 'static,
    ) -> Result<HookHandle> {
        self.exec(address, Arc::new(callback))
    }

    pub fn register_write_hook(
        &self,
        address: u32,
        size: u32,
        callback: impl Fn(&dyn Emulator, u32) + Send + Sync + 'static,
    ) -> Result<HookHandle> {
        let id = self
            .emulator
            .register_write_hook(address, size, Arc::new(callback))
            .map_err(|e| DebuggerError::HookRegistration {
                address,
                reason: e.to_string(),
            })?;
        Ok(self.handle(id, address))
    }

    /// Hooks every address with the same callback. Already registered hooks are released again
    /// if one registration fails.
    pub fn register_execution_hooks(
        &self,
        addresses: &[u32],
        callback: impl Fn(&dyn Emulator, u32) + Send + Sync + 'static,
    ) -> Result<Vec<HookHandle>> {
        let callback: HookCallback = Arc::new(callback);
        addresses
            .iter()
            .map(|&address| self.exec(address, callback.clone()))
            .collect()
    }

    /// `callback(name)` when the engine loads an SSB file.
    pub fn register_ssb_load_hook(
        &self,
        addresses: &[u32],
        callback: impl Fn(String) + Send + Sync + 'static,
    ) -> Result<Vec<HookHandle>> {
        let name_reg = self.registers.ssb_load_name;
        self.register_execution_hooks(addresses, move |emu, address| {
            match read_string_register(emu, name_reg) {
                Ok(name) => callback(name),
                Err(e) => log::debug!("SSB load at 0x{:08x}: unreadable name: {}", address, e),
            }
        })
    }

    /// `callback(hanger, name)` when the engine loads an SSA/SSE/SSS scene.
    pub fn register_ssx_load_hook(
        &self,
        addresses: &[u32],
        callback: impl Fn(usize, String) + Send + Sync + 'static,
    ) -> Result<Vec<HookHandle>> {
        let hanger_reg = self.registers.ssx_load_hanger;
        let name_reg = self.registers.ssx_load_name;
        self.register_execution_hooks(addresses, move |emu, address| {
            let hanger = emu.register(hanger_reg) as usize;
            match read_string_register(emu, name_reg) {
                Ok(name) => callback(hanger, name),
                Err(e) => log::debug!("SSX load at 0x{:08x}: unreadable name: {}", address, e),
            }
        })
    }

    /// `callback(hanger)` when the engine loads the talk script of an entity.
    pub fn register_talk_load_hook(
        &self,
        addresses: &[u32],
        callback: impl Fn(usize) + Send + Sync + 'static,
    ) -> Result<Vec<HookHandle>> {
        let hanger_reg = self.registers.talk_load_hanger;
        self.register_execution_hooks(addresses, move |emu, _| {
            callback(emu.register(hanger_reg) as usize)
        })
    }

    /// printf-style logging of the game. The format string is in `format_register`, the
    /// arguments in the registers after it.
    pub fn register_debug_print_hook(
        &self,
        addresses: &[u32],
        format_register: Register,
        callback: impl Fn(LogKind, String) + Send + Sync + 'static,
    ) -> Result<Vec<HookHandle>> {
        self.register_execution_hooks(addresses, move |emu, address| {
            let format = match read_string_register(emu, format_register) {
                Ok(format) => format,
                Err(e) => {
                    log::debug!("printf at 0x{:08x}: unreadable format: {}", address, e);
                    return;
                }
            };
            let message = format_printf(
                &format,
                |i| emu.register(format_register + 1 + i as Register),
                |ptr| {
                    emu.read_string(ptr, StringEncoding::Latin1)
                        .unwrap_or_else(|_| format!("<0x{:08x}>", ptr))
                },
            );
            callback(LogKind::Printfs, message);
        })
    }

    /// Hooks the getter and setter of one of the two debug flag banks.
    ///
    /// Getters are hooked twice: at entry to remember the requested flag, and one instruction
    /// later to replace the result in r0 with `value(var, flag_id)`.
    pub fn register_debug_flag_hooks(
        &self,
        var: DebugFlagVar,
        getter_addrs: &[u32],
        setter_addrs: &[u32],
        value: impl Fn(DebugFlagVar, u32) -> bool + Send + Sync + 'static,
        on_set: impl Fn(DebugFlagVar, u32, bool) + Send + Sync + 'static,
    ) -> Result<Vec<HookHandle>> {
        let requested = Arc::new(AtomicU32::new(0));
        let mut handles = Vec::with_capacity(getter_addrs.len() * 2 + setter_addrs.len());

        let input = requested.clone();
        let entries: Vec<u32> = getter_addrs.to_vec();
        handles.extend(self.register_execution_hooks(&entries, move |emu, _| {
            input.store(emu.register(0), Ordering::SeqCst);
        })?);

        let returns: Vec<u32> = getter_addrs.iter().map(|a| a.wrapping_add(4)).collect();
        handles.extend(self.register_execution_hooks(&returns, move |emu, _| {
            let flag_id = requested.load(Ordering::SeqCst);
            emu.set_register(0, u32::from(value(var, flag_id)));
        })?);

        handles.extend(self.register_execution_hooks(setter_addrs, move |emu, _| {
            on_set(var, emu.register(0), emu.register(1) != 0);
        })?);
        Ok(handles)
    }

    pub fn tick_count(&self) -> u64 {
        self.emulator.tick_count()
    }

    pub fn pause(&self) {
        self.emulator.pause();
    }

    pub fn resume(&self) {
        self.emulator.resume();
    }

    pub fn cycle_one_frame(&self) {
        self.emulator.cycle_one_frame();
    }

    fn exec(&self, address: u32, callback: HookCallback) -> Result<HookHandle> {
        let id = self
            .emulator
            .register_exec_hook(address, callback)
            .map_err(|e| DebuggerError::HookRegistration {
                address,
                reason: e.to_string(),
            })?;
        Ok(self.handle(id, address))
    }

    fn handle(&self, id: HookId, address: u32) -> HookHandle {
        HookHandle {
            emulator: self.emulator.clone(),
            id,
            address,
        }
    }
}

fn read_string_register(emu: &dyn Emulator, reg: Register) -> anyhow::Result<String> {
    let ptr = emu.register(reg);
    if ptr == 0 {
        anyhow::bail!("null pointer in r{}", reg);
    }
    emu.read_string(ptr, StringEncoding::Latin1)
}

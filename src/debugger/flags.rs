use crate::emulator::{HookHandle, HookSurface};
use crate::error::Result;
use crate::events::{DebugFlagVar, DebuggerEvent, EventSender};
use crate::layout::HookAddresses;
use crate::utils::lock;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Debug switches of the game, forced from the UI.
///
/// The flag getters of the game are hooked so they return the values set here; the debug
/// mode check is hooked so developer assertions run while `debug_mode` is on.
#[derive(Default)]
pub struct DebugFlags {
    set: Mutex<[BTreeSet<u32>; 2]>,
    debug_mode: AtomicBool,
}

impl DebugFlags {
    pub fn new(debug_mode: bool) -> Self {
        Self {
            set: Mutex::new(Default::default()),
            debug_mode: AtomicBool::new(debug_mode),
        }
    }

    pub fn get(&self, var: DebugFlagVar, bit: u32) -> bool {
        lock(&self.set)[var.index()].contains(&bit)
    }

    pub fn set(&self, var: DebugFlagVar, bit: u32, value: bool) {
        let mut set = lock(&self.set);
        if value {
            set[var.index()].insert(bit);
        } else {
            set[var.index()].remove(&bit);
        }
    }

    pub fn debug_mode(&self) -> bool {
        self.debug_mode.load(Ordering::SeqCst)
    }

    pub fn set_debug_mode(&self, value: bool) {
        self.debug_mode.store(value, Ordering::SeqCst);
    }

    /// Hooks both flag banks and the debug mode check.
    pub fn register(
        self: &Arc<Self>,
        surface: &HookSurface,
        addresses: &HookAddresses,
        events: &EventSender,
    ) -> Result<Vec<HookHandle>> {
        let banks = [
            (
                DebugFlagVar::Flag1,
                &addresses.debug_flag_get_1,
                &addresses.debug_flag_set_1,
            ),
            (
                DebugFlagVar::Flag2,
                &addresses.debug_flag_get_2,
                &addresses.debug_flag_set_2,
            ),
        ];

        let mut handles = Vec::new();
        for (var, getters, setters) in banks {
            let read = self.clone();
            let write = self.clone();
            let events = events.clone();
            handles.extend(surface.register_debug_flag_hooks(
                var,
                getters,
                setters,
                move |var, bit| read.get(var, bit),
                move |var, flag_id, value| {
                    write.set(var, flag_id, value);
                    events.send(DebuggerEvent::DebugFlagChanged {
                        var,
                        flag_id,
                        value,
                    });
                },
            )?);
        }

        let flags = self.clone();
        let result_reg = surface.registers().debug_mode_result;
        handles.extend(surface.register_execution_hooks(
            &addresses.script_debug_mode,
            move |emu, _| {
                if flags.debug_mode() {
                    emu.set_register(result_reg, 1);
                }
            },
        )?);
        Ok(handles)
    }
}

use crate::emulator::{Emulator, HookHandle, HookSurface, MemoryExt};
use crate::error::Result;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

/// Tracks where unionall.ssb is loaded, the routine table that identifies global scripts.
pub struct UnionallWatcher {
    pointer: u32,
    load_address: AtomicU32,
}

impl UnionallWatcher {
    pub fn new(pointer: u32) -> Self {
        Self {
            pointer,
            load_address: AtomicU32::new(0),
        }
    }

    /// 0 until the game loads unionall.ssb for the first time.
    pub fn unionall_load_address(&self) -> u32 {
        self.load_address.load(Ordering::SeqCst)
    }

    pub fn refresh_unionall_load_address(&self, emu: &dyn Emulator) {
        match emu.read_u32(self.pointer) {
            Ok(address) => {
                let previous = self.load_address.swap(address, Ordering::SeqCst);
                if previous != address {
                    log::debug!("unionall.ssb now at 0x{:08x}", address);
                }
            }
            Err(e) => log::debug!("Could not read unionall pointer: {}", e),
        }
    }

    pub fn register(self: &Arc<Self>, surface: &HookSurface) -> Result<HookHandle> {
        self.refresh_unionall_load_address(&**surface.emulator());
        let watcher = self.clone();
        surface.register_write_hook(self.pointer, 4, move |emu, _| {
            watcher.refresh_unionall_load_address(emu)
        })
    }
}

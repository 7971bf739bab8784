//! Contract over the emulator the debugger instruments.
//!
//! The emulator itself is provided by the host. Everything the core needs from it is the
//! [`Emulator`] trait; [`HookSurface`] builds the typed hooks of the script engine on top.

pub mod hooks;
pub mod memory;
pub mod thread;

pub use hooks::{HookHandle, HookSurface};
pub use memory::{MemoryExt, StringEncoding};
pub use thread::{EmulatorCommand, EmulatorThread};

use std::sync::Arc;

pub type HookId = u64;

/// Called on the emulator thread with the hooked address. The emulator is paused meanwhile.
pub type HookCallback = Arc<dyn Fn(&dyn Emulator, u32) + Send + Sync>;

/// ARM9 general purpose register index.
pub type Register = u8;

pub trait Emulator: Send + Sync {
    /// Calls `callback` right before the instruction at `address` executes.
    fn register_exec_hook(&self, address: u32, callback: HookCallback) -> anyhow::Result<HookId>;

    /// Calls `callback` after `size` bytes at `address` were written.
    fn register_write_hook(
        &self,
        address: u32,
        size: u32,
        callback: HookCallback,
    ) -> anyhow::Result<HookId>;

    fn unregister_hook(&self, id: HookId);

    fn read_memory(&self, address: u32, buf: &mut [u8]) -> anyhow::Result<()>;

    fn register(&self, reg: Register) -> u32;

    fn set_register(&self, reg: Register, value: u32);

    /// Value of a script engine game variable (`var_id`, array `index`).
    fn read_game_variable(&self, var_id: u16, index: u16) -> anyhow::Result<i32>;

    /// Frames emulated since power on.
    fn tick_count(&self) -> u64;

    fn pause(&self);

    fn resume(&self);

    fn is_running(&self) -> bool;

    fn cycle_one_frame(&self);
}

/// Shared handle the rest of the core keeps to the emulator.
pub type SharedEmulator = Arc<dyn Emulator>;

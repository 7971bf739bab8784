#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

pub mod compiler;
pub mod runtime;
pub mod source_map;

pub mod breakpoints;
pub mod debugger;
pub mod emulator;
pub mod ground;
pub mod script_file;
pub mod session;

pub mod config;
pub mod error;
pub mod events;
pub mod layout;
pub mod logging;
pub mod project;
pub mod utils;

pub use config::DebuggerConfig;
pub use debugger::{HaltRecord, ResumeDecision};
pub use error::{DebuggerError, Result};
pub use events::DebuggerEvent;
pub use session::DebuggerSession;

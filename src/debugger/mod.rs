pub mod controller;
pub mod file_state;
pub mod flags;
pub mod halt;
pub mod print;
pub mod unionall;

pub use controller::{ControllerState, DebugController};
pub use file_state::HaltFileState;
pub use flags::DebugFlags;
pub use halt::{HaltRecord, ReleaseHook, StackFrame};
pub use unionall::UnionallWatcher;

/// How the user resumes a halted script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeDecision {
    /// Resume and ignore every breakpoint for the rest of the current tick.
    FailHard,
    Resume,
    /// Break on the very next opcode, whichever script runs it.
    StepNext,
    StepInto,
    StepOver,
    StepOut,
    /// Break when the same script reaches this absolute opcode address.
    StepManual(u32),
}

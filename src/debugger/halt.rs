use super::ResumeDecision;
use super::file_state::HaltFileState;
use crate::runtime::ScriptRuntimeRecord;
use crate::utils::lock;
use std::sync::{Condvar, Mutex, MutexGuard};

pub type ReleaseHook = Box<dyn FnOnce(ResumeDecision) + Send>;

/// One frame of the script call stack at a halt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackFrame {
    pub opcode_offset: u32,
    pub opcode_addr: u32,
}

/// A script halted at a breakpoint.
///
/// Created by the controller on the emulator thread, which then blocks in [`HaltRecord::wait`]
/// until the UI calls [`HaltRecord::release`]. Can be released exactly once.
pub struct HaltRecord {
    runtime: ScriptRuntimeRecord,
    file_state: Mutex<HaltFileState>,
    decision: Mutex<Option<ResumeDecision>>,
    released: Condvar,
    release_hooks: Mutex<Vec<ReleaseHook>>,
}

impl HaltRecord {
    pub fn new(runtime: ScriptRuntimeRecord, file_state: HaltFileState) -> Self {
        Self {
            runtime,
            file_state: Mutex::new(file_state),
            decision: Mutex::new(None),
            released: Condvar::new(),
            release_hooks: Mutex::new(Vec::new()),
        }
    }

    pub fn runtime(&self) -> &ScriptRuntimeRecord {
        &self.runtime
    }

    pub fn file_state(&self) -> HaltFileState {
        lock(&self.file_state).clone()
    }

    pub fn file_state_mut(&self) -> MutexGuard<'_, HaltFileState> {
        lock(&self.file_state)
    }

    pub fn hanger_ssb(&self) -> usize {
        self.runtime.hanger_ssb
    }

    pub fn current_opcode_offset(&self) -> u32 {
        self.runtime.current_opcode_offset
    }

    pub fn halted_on_call(&self) -> bool {
        lock(&self.file_state).halted_on_call
    }

    /// Source navigation only: show the halt inside the macro called at this opcode.
    pub fn step_into_macro_call(&self) -> bool {
        lock(&self.file_state).step_into_macro_call()
    }

    /// Runs `hook` on the emulator thread once the halt is released, before it resumes.
    pub fn add_release_hook(&self, hook: ReleaseHook) {
        lock(&self.release_hooks).push(hook);
    }

    /// Wakes the emulator thread with `decision`. Returns false if the halt was already
    /// released.
    pub fn release(&self, decision: ResumeDecision) -> bool {
        let decision = lock(&self.file_state).resolve(decision, &self.runtime);
        let mut slot = lock(&self.decision);
        if slot.is_some() {
            log::warn!("Halt {} was already released", self.describe());
            return false;
        }
        log::debug!("Releasing halt {} with {:?}", self.describe(), decision);
        *slot = Some(decision);
        self.released.notify_all();
        true
    }

    pub fn is_released(&self) -> bool {
        lock(&self.decision).is_some()
    }

    /// Blocks until [`HaltRecord::release`] and runs the release hooks.
    pub fn wait(&self) -> ResumeDecision {
        let mut slot = lock(&self.decision);
        let decision = loop {
            if let Some(decision) = *slot {
                break decision;
            }
            slot = self
                .released
                .wait(slot)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
        };
        drop(slot);

        let hooks = std::mem::take(&mut *lock(&self.release_hooks));
        for hook in hooks {
            hook(decision);
        }
        decision
    }

    /// Current frame first, then the frame the script returns to.
    pub fn call_stack(&self) -> Vec<StackFrame> {
        let mut frames = vec![StackFrame {
            opcode_offset: self.runtime.current_opcode_offset,
            opcode_addr: self.runtime.current_opcode_addr,
        }];
        if let Some(caller) = self.runtime.call_stack {
            frames.push(StackFrame {
                opcode_offset: caller.opcode_offset(),
                opcode_addr: caller.opcode_addr,
            });
        }
        frames
    }

    pub fn describe(&self) -> String {
        let file_state = lock(&self.file_state);
        match file_state.position {
            Some((line, column)) => format!(
                "{} ({}:{}) {}",
                file_state.ssb_filename, line, column, self.runtime
            ),
            None => format!("{} {}", file_state.ssb_filename, self.runtime),
        }
    }
}

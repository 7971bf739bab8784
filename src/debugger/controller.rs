use super::ResumeDecision;
use super::file_state::HaltFileState;
use super::halt::HaltRecord;
use super::unionall::UnionallWatcher;
use crate::breakpoints::{BreakpointQuery, BreakpointStore, TransientBreakpoint};
use crate::emulator::{Emulator, HookHandle, HookSurface, Register};
use crate::error::Result;
use crate::events::{DebuggerEvent, EventSender};
use crate::ground::GroundEngineTracker;
use crate::runtime::ScriptRuntimeRecord;
use crate::script_file::ScriptFileCache;
use crate::utils::lock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

const NO_TICK: u64 = u64::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Running,
    Stopped,
}

/// Decides on every script opcode whether to halt, and turns the user's resume decision
/// into transient breakpoints.
pub struct DebugController {
    breakpoints: Arc<BreakpointStore>,
    ground: Arc<GroundEngineTracker>,
    cache: Arc<ScriptFileCache>,
    unionall: Arc<UnionallWatcher>,
    events: EventSender,
    runtime_register: Register,
    breakpoints_enabled: AtomicBool,
    boost: AtomicBool,
    disabled_for_tick: AtomicU64,
    /// Set by STEP_NEXT, consumed by the first opcode that reaches the breakpoint check.
    force_break: AtomicBool,
    current_halt: Mutex<Option<Arc<HaltRecord>>>,
}

impl DebugController {
    pub fn new(
        breakpoints: Arc<BreakpointStore>,
        ground: Arc<GroundEngineTracker>,
        cache: Arc<ScriptFileCache>,
        unionall: Arc<UnionallWatcher>,
        events: EventSender,
        runtime_register: Register,
    ) -> Self {
        Self {
            breakpoints,
            ground,
            cache,
            unionall,
            events,
            runtime_register,
            breakpoints_enabled: AtomicBool::new(true),
            boost: AtomicBool::new(false),
            disabled_for_tick: AtomicU64::new(NO_TICK),
            force_break: AtomicBool::new(false),
            current_halt: Mutex::new(None),
        }
    }

    pub fn register(
        self: &Arc<Self>,
        surface: &HookSurface,
        addresses: &[u32],
    ) -> Result<Vec<HookHandle>> {
        let controller = self.clone();
        surface.register_execution_hooks(addresses, move |emu, _| controller.on_opcode(emu))
    }

    pub fn set_breakpoints_enabled(&self, enabled: bool) {
        log::info!("Breakpoints {}", if enabled { "enabled" } else { "disabled" });
        self.breakpoints_enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn breakpoints_enabled(&self) -> bool {
        self.breakpoints_enabled.load(Ordering::SeqCst)
    }

    pub fn set_boost(&self, boost: bool) {
        self.boost.store(boost, Ordering::SeqCst);
    }

    pub fn boost(&self) -> bool {
        self.boost.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> ControllerState {
        if lock(&self.current_halt).is_some() {
            ControllerState::Stopped
        } else {
            ControllerState::Running
        }
    }

    pub fn current_halt(&self) -> Option<Arc<HaltRecord>> {
        lock(&self.current_halt).clone()
    }

    /// Opcode dispatch hook. Runs on the emulator thread and blocks it while halted.
    pub fn on_opcode(&self, emu: &dyn Emulator) {
        if self.boost() {
            return;
        }
        let pointer = emu.register(self.runtime_register);
        let runtime = match ScriptRuntimeRecord::from_hook(
            emu,
            pointer,
            self.unionall.unionall_load_address(),
        ) {
            Ok(runtime) => runtime,
            Err(e) => {
                log::debug!("Skipping opcode: {}", e);
                return;
            }
        };

        if !self.breakpoints_enabled()
            || self.disabled_for_tick.load(Ordering::SeqCst) == emu.tick_count()
        {
            return;
        }

        let Some(loaded) = self.ground.ssb_in_hanger(runtime.hanger_ssb) else {
            return;
        };

        let query = BreakpointQuery::from_runtime(&loaded.filename, &runtime);
        let forced = self.force_break.swap(false, Ordering::SeqCst);
        if !forced && !self.breakpoints.has(&query) {
            return;
        }

        let decision = self.halt(&loaded.filename, runtime.clone());
        self.apply(decision, &runtime, emu.tick_count());
    }

    fn halt(&self, filename: &str, runtime: ScriptRuntimeRecord) -> ResumeDecision {
        self.breakpoints.clear_transient();

        let offset = runtime.current_opcode_offset;
        let file_state = match self.cache.cached(filename) {
            Some(entry) => {
                let file = lock(&entry);
                HaltFileState::new(filename, offset, file.ram_source_map())
            }
            None => HaltFileState::new(filename, offset, None),
        };
        let halt = Arc::new(HaltRecord::new(runtime, file_state));
        log::info!("Halted at {}", halt.describe());

        *lock(&self.current_halt) = Some(halt.clone());
        self.events.send(DebuggerEvent::Halted(halt.clone()));
        let decision = halt.wait();
        *lock(&self.current_halt) = None;
        decision
    }

    fn apply(&self, decision: ResumeDecision, runtime: &ScriptRuntimeRecord, tick: u64) {
        let target = TransientBreakpoint::for_target(
            runtime.script_target_type,
            runtime.script_target_slot,
        );
        match decision {
            ResumeDecision::FailHard => {
                self.disabled_for_tick.store(tick, Ordering::SeqCst);
            }
            ResumeDecision::Resume => {}
            ResumeDecision::StepNext => {
                self.force_break.store(true, Ordering::SeqCst);
            }
            ResumeDecision::StepInto => {
                self.breakpoints.add_transient(target);
            }
            ResumeDecision::StepOver => {
                self.breakpoints
                    .add_transient(target.in_unionall(runtime.is_in_unionall));
                // The current opcode may end the routine; then the caller runs next.
                if let Some(caller) = runtime.call_stack {
                    self.breakpoints.add_transient(target.at_addr(caller.opcode_addr));
                }
            }
            ResumeDecision::StepOut => {
                if let Some(caller) = runtime.call_stack {
                    self.breakpoints.add_transient(target.at_addr(caller.opcode_addr));
                }
            }
            ResumeDecision::StepManual(opcode_addr) => {
                self.breakpoints.add_transient(
                    target
                        .in_unionall(runtime.is_in_unionall)
                        .at_addr(opcode_addr),
                );
            }
        }
    }
}

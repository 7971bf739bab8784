//! Wires the debugger together for a host UI.
//!
//! The host owns the GUI thread and calls [`DebuggerSession::poll`] about every
//! `poll_interval_ms`. Hooks run on the emulator thread and only talk to the UI through the
//! event channel.

use crate::breakpoints::BreakpointStore;
use crate::compiler::{Rom, ScriptCompiler};
use crate::config::DebuggerConfig;
use crate::debugger::print::format_script_print;
use crate::debugger::{DebugController, DebugFlags, HaltRecord, ResumeDecision, UnionallWatcher};
use crate::emulator::{HookHandle, HookSurface, SharedEmulator};
use crate::error::{DebuggerError, Result};
use crate::events::{self, DebugFlagVar, DebuggerEvent, EventSender, LogKind};
use crate::ground::{GroundEngineTracker, GroundSnapshot};
use crate::layout::ScriptEngineLayout;
use crate::project::ProjectFiles;
use crate::runtime::ScriptRuntimeRecord;
use crate::script_file::{
    MacroDependentOutcome, ReloadCoordinator, SaveOutcome, ScriptFileCache, SourceView,
};
use std::path::Path;
use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::time::Duration;

pub struct DebuggerSession {
    config: DebuggerConfig,
    layout: Arc<ScriptEngineLayout>,
    surface: HookSurface,
    project: Arc<ProjectFiles>,
    cache: Arc<ScriptFileCache>,
    breakpoints: Arc<BreakpointStore>,
    ground: Arc<GroundEngineTracker>,
    reload: ReloadCoordinator,
    controller: Arc<DebugController>,
    flags: Arc<DebugFlags>,
    unionall: Arc<UnionallWatcher>,
    events: EventSender,
    event_rx: Receiver<DebuggerEvent>,
    hooks: Vec<HookHandle>,
}

impl DebuggerSession {
    pub fn new(
        emulator: SharedEmulator,
        compiler: Arc<dyn ScriptCompiler>,
        rom: Arc<dyn Rom>,
        project: ProjectFiles,
        layout: ScriptEngineLayout,
        config: DebuggerConfig,
    ) -> Self {
        let (events, event_rx) = events::channel();
        let project = Arc::new(project);
        let cache = Arc::new(ScriptFileCache::new(
            compiler,
            rom,
            project.clone(),
            events.clone(),
        ));
        let breakpoints = Arc::new(BreakpointStore::load(
            project.breakpoints_path(),
            cache.clone(),
            events.clone(),
        ));
        let ground = Arc::new(GroundEngineTracker::new(cache.clone(), events.clone()));
        let reload = ReloadCoordinator::new(cache.clone(), breakpoints.clone());
        let unionall = Arc::new(UnionallWatcher::new(layout.addresses.unionall_pointer));
        let surface = HookSurface::new(emulator, layout.registers);
        let controller = Arc::new(DebugController::new(
            breakpoints.clone(),
            ground.clone(),
            cache.clone(),
            unionall.clone(),
            events.clone(),
            layout.registers.script_runtime,
        ));
        controller.set_breakpoints_enabled(config.breakpoints_enabled);
        controller.set_boost(config.boost);
        let flags = Arc::new(DebugFlags::new(config.debug_mode));

        Self {
            config,
            layout: Arc::new(layout),
            surface,
            project,
            cache,
            breakpoints,
            ground,
            reload,
            controller,
            flags,
            unionall,
            events,
            event_rx,
            hooks: Vec::new(),
        }
    }

    pub fn config(&self) -> &DebuggerConfig {
        &self.config
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.config.poll_interval_ms)
    }

    pub fn project(&self) -> &Arc<ProjectFiles> {
        &self.project
    }

    pub fn cache(&self) -> &Arc<ScriptFileCache> {
        &self.cache
    }

    pub fn breakpoints(&self) -> &Arc<BreakpointStore> {
        &self.breakpoints
    }

    pub fn ground(&self) -> &Arc<GroundEngineTracker> {
        &self.ground
    }

    pub fn controller(&self) -> &Arc<DebugController> {
        &self.controller
    }

    pub fn surface(&self) -> &HookSurface {
        &self.surface
    }

    pub fn is_debugging(&self) -> bool {
        !self.hooks.is_empty()
    }

    /// Registers every hook. Only the opcode hook is required; other features that fail to
    /// hook are reported and left out.
    pub fn enable_debugging(&mut self) -> Result<()> {
        if self.is_debugging() {
            return Ok(());
        }
        let addresses = self.layout.addresses.clone();
        let mut hooks = self
            .controller
            .register(&self.surface, &addresses.script_debug)?;

        if addresses.unionall_pointer != 0 {
            let unionall = self.unionall.register(&self.surface).map(|h| vec![h]);
            self.add_feature("unionall watcher", unionall, &mut hooks);
        }
        let ground = self.register_ground_hooks();
        self.add_feature("ground engine tracking", ground, &mut hooks);
        let prints = self.register_print_hooks();
        self.add_feature("debug output", prints, &mut hooks);
        let flags = self.flags.register(&self.surface, &addresses, &self.events);
        self.add_feature("debug flags", flags, &mut hooks);

        log::info!("Debugging enabled ({} hooks)", hooks.len());
        self.hooks = hooks;
        Ok(())
    }

    /// Drops every hook. An outstanding halt is failed first so the emulator thread runs on.
    pub fn disable_debugging(&mut self) {
        self.release_outstanding_halt();
        self.hooks.clear();
        log::info!("Debugging disabled");
    }

    /// Drains the emulator thread's events and performs scheduled reloads on this thread.
    pub fn poll(&self) -> Vec<DebuggerEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.event_rx.try_recv() {
            match event {
                DebuggerEvent::ReloadRequested(filename) => {
                    if self.reload.apply_reload(&filename) {
                        log::debug!("Reloaded {}", filename);
                        out.push(DebuggerEvent::FileReloaded(filename));
                    }
                }
                event => out.push(event),
            }
        }
        out
    }

    pub fn current_halt(&self) -> Option<Arc<HaltRecord>> {
        self.controller.current_halt()
    }

    /// Releases the current halt, if any.
    pub fn resume(&self, decision: ResumeDecision) -> bool {
        match self.controller.current_halt() {
            Some(halt) => halt.release(decision),
            None => false,
        }
    }

    pub fn save_ssbs(&self, filename: &str, text: &str) -> Result<SaveOutcome> {
        let outcome = self.cache.save_from_ssbs(filename, text)?;
        self.reload.finish_save(&outcome);
        Ok(outcome)
    }

    pub fn save_exps(&self, filename: &str, text: &str) -> Result<SaveOutcome> {
        let outcome = self.cache.save_from_exps(filename, text)?;
        self.reload.finish_save(&outcome);
        Ok(outcome)
    }

    /// Saves a shared macro and recompiles every SSB including it.
    pub fn save_macro(
        &self,
        macro_path: &Path,
        text: &str,
    ) -> Result<Vec<MacroDependentOutcome>> {
        let dependents = self.project.dependents_of(macro_path);
        let outcomes = self.cache.save_exps_macro(macro_path, text, &dependents)?;
        self.reload.finish_macro_save(&outcomes);
        for outcome in &outcomes {
            if let MacroDependentOutcome::Failed { filename, error } = outcome {
                self.events.send(DebuggerEvent::Warning(format!(
                    "{} was not recompiled after editing {}: {}",
                    filename,
                    macro_path.display(),
                    error
                )));
            }
        }
        Ok(outcomes)
    }

    /// Closes an editor. While RAM is stale `confirm` is asked first, unless disabled in the
    /// config.
    pub fn close_in_editor(&self, filename: &str, confirm: impl FnOnce(&str) -> bool) -> bool {
        if self.config.confirm_close_stale {
            self.cache.close_in_editor(filename, confirm)
        } else {
            self.cache.close_in_editor(filename, |_| true)
        }
    }

    /// Toggles the breakpoint on the first opcode of `line` of the SSB's own text. Returns
    /// whether a breakpoint is now set, or `None` if the line has no opcode or the file waits
    /// for a reload.
    pub fn toggle_breakpoint_at_line(
        &self,
        filename: &str,
        view: SourceView,
        line: u32,
    ) -> Option<bool> {
        self.toggle_at(filename, view, |map| map.opcodes_at_line(line))
    }

    /// Like [`Self::toggle_breakpoint_at_line`], for a line of a macro included by `filename`.
    pub fn toggle_breakpoint_at_macro_line(
        &self,
        filename: &str,
        macro_path: &Path,
        line: u32,
    ) -> Option<bool> {
        self.toggle_at(filename, SourceView::Exps, |map| {
            map.opcodes_at_macro_line(macro_path, line)
        })
    }

    pub fn set_breakpoints_enabled(&self, enabled: bool) {
        self.controller.set_breakpoints_enabled(enabled);
    }

    pub fn set_boost(&self, boost: bool) {
        self.controller.set_boost(boost);
    }

    pub fn set_debug_mode(&self, value: bool) {
        self.flags.set_debug_mode(value);
    }

    pub fn set_debug_flag(&self, var: DebugFlagVar, bit: u32, value: bool) {
        self.flags.set(var, bit, value);
    }

    pub fn unionall_load_address(&self) -> u32 {
        self.unionall.unionall_load_address()
    }

    pub fn refresh_unionall_load_address(&self) {
        self.unionall
            .refresh_unionall_load_address(&**self.surface.emulator());
    }

    pub fn save_ground_state(&self, slot: u32) -> Result<()> {
        let path = self.project.savestate_sidecar_path(slot);
        self.ground
            .snapshot()
            .save(&path)
            .map_err(|e| DebuggerError::Persistence(format!("{:#}", e)))
    }

    /// Restores the ground engine state stored with save state `slot`. Returns the loaded
    /// SSBs that changed since.
    pub fn load_ground_state(&self, slot: u32) -> Result<Vec<String>> {
        let path = self.project.savestate_sidecar_path(slot);
        let snapshot = GroundSnapshot::load(&path)
            .map_err(|e| DebuggerError::Persistence(format!("{:#}", e)))?;
        Ok(self.ground.restore(&snapshot))
    }

    /// Fails any outstanding halt and drops every hook. Must run before the emulator thread is
    /// joined.
    pub fn shutdown(mut self) {
        self.disable_debugging();
    }

    fn release_outstanding_halt(&self) {
        if let Some(halt) = self.controller.current_halt() {
            log::warn!("Failing outstanding halt at {}", halt.describe());
            halt.release(ResumeDecision::FailHard);
        }
    }

    fn toggle_at(
        &self,
        filename: &str,
        view: SourceView,
        opcodes: impl FnOnce(&crate::source_map::SourceMap) -> Vec<u32>,
    ) -> Option<bool> {
        if !self.cache.ram_state_matches_disk(filename) {
            log::info!("Breakpoints of {} can be changed once it is reloaded", filename);
            return None;
        }
        let map = match self.cache.active_source_map(filename, view) {
            Some(map) => map,
            None => {
                log::debug!("No {:?} source map for {}", view, filename);
                return None;
            }
        };
        let offset = *opcodes(&map).first()?;
        Some(self.breakpoints.toggle(filename, offset))
    }

    fn add_feature(
        &self,
        name: &str,
        result: Result<Vec<HookHandle>>,
        hooks: &mut Vec<HookHandle>,
    ) {
        match result {
            Ok(handles) => hooks.extend(handles),
            Err(e) => {
                log::error!("Disabling {}: {}", name, e);
                self.events
                    .send(DebuggerEvent::Warning(format!("{} unavailable: {}", name, e)));
            }
        }
    }

    fn register_ground_hooks(&self) -> Result<Vec<HookHandle>> {
        let addresses = &self.layout.addresses;
        let mut hooks = Vec::new();

        let ground = self.ground.clone();
        hooks.extend(
            self.surface
                .register_ssb_load_hook(&addresses.ssb_load, move |name| {
                    ground.on_ssb_load(&name)
                })?,
        );
        let ground = self.ground.clone();
        hooks.extend(self.surface.register_ssx_load_hook(
            &addresses.ssx_load,
            move |hanger, name| ground.on_ssx_load(hanger, &name),
        )?);
        let ground = self.ground.clone();
        hooks.extend(
            self.surface
                .register_talk_load_hook(&addresses.talk_load, move |hanger| {
                    ground.on_talk_load(hanger)
                })?,
        );
        let ground = self.ground.clone();
        hooks.extend(
            self.surface
                .register_execution_hooks(&addresses.ground_start, move |_, _| {
                    ground.on_ground_start()
                })?,
        );
        let ground = self.ground.clone();
        hooks.extend(
            self.surface
                .register_execution_hooks(&addresses.ground_quit, move |_, _| {
                    ground.on_ground_quit()
                })?,
        );
        let ground = self.ground.clone();
        hooks.extend(
            self.surface
                .register_execution_hooks(&addresses.ground_map_change, move |_, _| {
                    ground.on_map_change()
                })?,
        );
        Ok(hooks)
    }

    fn register_print_hooks(&self) -> Result<Vec<HookHandle>> {
        let addresses = &self.layout.addresses;
        let mut hooks = Vec::new();

        for (functions, format_register) in [(&addresses.printf_r0, 0), (&addresses.printf_r1, 1)] {
            let events = self.events.clone();
            hooks.extend(self.surface.register_debug_print_hook(
                functions,
                format_register,
                move |kind, message| events.send(DebuggerEvent::DebugPrint { kind, message }),
            )?);
        }

        let events = self.events.clone();
        let layout = self.layout.clone();
        let unionall = self.unionall.clone();
        let registers = self.layout.registers;
        hooks.extend(
            self.surface
                .register_execution_hooks(&addresses.script_print, move |emu, _| {
                    let pointer = emu.register(registers.script_print_runtime);
                    let runtime = match ScriptRuntimeRecord::from_hook(
                        emu,
                        pointer,
                        unionall.unionall_load_address(),
                    ) {
                        Ok(runtime) => runtime,
                        Err(e) => {
                            log::debug!("debug_Print: {}", e);
                            return;
                        }
                    };
                    let string_ptr = emu.register(registers.script_print_string);
                    match format_script_print(emu, &layout, &runtime, string_ptr) {
                        Ok(Some(message)) => events.send(DebuggerEvent::DebugPrint {
                            kind: LogKind::DebugPrint,
                            message,
                        }),
                        Ok(None) => {}
                        Err(e) => log::debug!("debug_Print: {}", e),
                    }
                })?,
        );
        Ok(hooks)
    }
}

//! Fakes shared by the integration tests: an emulator with hookable memory and registers, a
//! line-based script compiler and an in-memory ROM.
#![allow(dead_code)]

use ssb_debugger::compiler::{
    Compilation, Rom, RoutineKind, ScriptCompiler, SsbModel, SsbOpcode, SsbRoutine,
};
use ssb_debugger::config::DebuggerConfig;
use ssb_debugger::debugger::HaltRecord;
use ssb_debugger::emulator::{Emulator, HookCallback, HookId, Register};
use ssb_debugger::error::CompileError;
use ssb_debugger::events::DebuggerEvent;
use ssb_debugger::layout::{HookAddresses, HookRegisters, ScriptEngineLayout};
use ssb_debugger::project::ProjectFiles;
use ssb_debugger::source_map::{MacroCallSite, MacroInfo, SourceMap, SourceMapEntry};
use ssb_debugger::{DebuggerSession, ResumeDecision};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

pub const SCRIPT_DEBUG: u32 = 0x0204_0000;
pub const SSB_LOAD: u32 = 0x0204_0100;
pub const SSX_LOAD: u32 = 0x0204_0200;
pub const TALK_LOAD: u32 = 0x0204_0300;
pub const GROUND_START: u32 = 0x0204_0400;
pub const GROUND_QUIT: u32 = 0x0204_0500;
pub const MAP_CHANGE: u32 = 0x0204_0600;
pub const PRINTF_R0: u32 = 0x0204_0700;
pub const PRINTF_R1: u32 = 0x0204_0800;
pub const SCRIPT_PRINT: u32 = 0x0204_0900;
pub const FLAG_GET_1: u32 = 0x0204_0a00;
pub const FLAG_SET_1: u32 = 0x0204_0b00;
pub const FLAG_GET_2: u32 = 0x0204_0c00;
pub const FLAG_SET_2: u32 = 0x0204_0d00;
pub const DEBUG_MODE: u32 = 0x0204_0e00;
pub const UNIONALL_POINTER: u32 = 0x020a_0000;

pub const RUNTIME_PTR: u32 = 0x0210_0000;
pub const TARGET_BASE: u32 = 0x0211_0000;
pub const ROUTINE_TABLE: u32 = 0x0220_0000;
pub const UNIONALL_TABLE: u32 = 0x0228_0000;
pub const STRING_AREA: u32 = 0x0230_0000;

pub const OPCODES: &[&str] = &[
    "Null",
    "Wait",
    "Move",
    "End",
    "debug_Print",
    "debug_PrintFlag",
    "PrintScenario",
];

pub const GAME_VARIABLES: &[&str] = &["VERSION", "SCENARIO_MAIN", "SCENARIO_SUB1"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HookKind {
    Exec,
    Write(u32),
}

struct Hook {
    kind: HookKind,
    address: u32,
    callback: HookCallback,
}

/// Memory is sparse and reads as zero where nothing was written.
#[derive(Default)]
pub struct FakeEmulator {
    memory: Mutex<BTreeMap<u32, u8>>,
    registers: Mutex<[u32; 16]>,
    hooks: Mutex<HashMap<HookId, Hook>>,
    next_id: AtomicU64,
    tick: AtomicU64,
    running: AtomicBool,
    unhookable: Mutex<BTreeSet<u32>>,
    variables: Mutex<HashMap<u16, i32>>,
}

impl FakeEmulator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn write_bytes(&self, address: u32, data: &[u8]) {
        let mut memory = self.memory.lock().unwrap();
        for (i, b) in data.iter().enumerate() {
            memory.insert(address + i as u32, *b);
        }
    }

    pub fn write_u16(&self, address: u32, value: u16) {
        self.write_bytes(address, &value.to_le_bytes());
    }

    pub fn write_u32(&self, address: u32, value: u32) {
        self.write_bytes(address, &value.to_le_bytes());
    }

    pub fn write_cstr(&self, address: u32, s: &str) {
        let mut data = s.as_bytes().to_vec();
        data.push(0);
        self.write_bytes(address, &data);
    }

    pub fn set_reg(&self, reg: Register, value: u32) {
        self.registers.lock().unwrap()[reg as usize] = value;
    }

    pub fn reg(&self, reg: Register) -> u32 {
        self.registers.lock().unwrap()[reg as usize]
    }

    pub fn set_variable(&self, var_id: u16, value: i32) {
        self.variables.lock().unwrap().insert(var_id, value);
    }

    pub fn refuse_hooks_at(&self, address: u32) {
        self.unhookable.lock().unwrap().insert(address);
    }

    pub fn advance_tick(&self) {
        self.tick.fetch_add(1, Ordering::SeqCst);
    }

    pub fn hook_count(&self) -> usize {
        self.hooks.lock().unwrap().len()
    }

    pub fn is_hooked(&self, address: u32) -> bool {
        self.hooks
            .lock()
            .unwrap()
            .values()
            .any(|h| h.kind == HookKind::Exec && h.address == address)
    }

    /// Runs every execution hook at `address` on the calling thread, like the CPU reaching it.
    pub fn fire_exec(&self, address: u32) {
        let callbacks: Vec<HookCallback> = self
            .hooks
            .lock()
            .unwrap()
            .values()
            .filter(|h| h.kind == HookKind::Exec && h.address == address)
            .map(|h| h.callback.clone())
            .collect();
        for callback in callbacks {
            callback(self, address);
        }
    }

    /// Runs every write hook covering `address`.
    pub fn fire_write(&self, address: u32) {
        let callbacks: Vec<HookCallback> = self
            .hooks
            .lock()
            .unwrap()
            .values()
            .filter(|h| match h.kind {
                HookKind::Write(size) => address >= h.address && address < h.address + size,
                HookKind::Exec => false,
            })
            .map(|h| h.callback.clone())
            .collect();
        for callback in callbacks {
            callback(self, address);
        }
    }

    fn add_hook(&self, kind: HookKind, address: u32, callback: HookCallback) -> anyhow::Result<u64> {
        if self.unhookable.lock().unwrap().contains(&address) {
            anyhow::bail!("address 0x{:08x} is not mapped", address);
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.hooks.lock().unwrap().insert(
            id,
            Hook {
                kind,
                address,
                callback,
            },
        );
        Ok(id)
    }
}

impl Emulator for FakeEmulator {
    fn register_exec_hook(&self, address: u32, callback: HookCallback) -> anyhow::Result<HookId> {
        self.add_hook(HookKind::Exec, address, callback)
    }

    fn register_write_hook(
        &self,
        address: u32,
        size: u32,
        callback: HookCallback,
    ) -> anyhow::Result<HookId> {
        self.add_hook(HookKind::Write(size), address, callback)
    }

    fn unregister_hook(&self, id: HookId) {
        self.hooks.lock().unwrap().remove(&id);
    }

    fn read_memory(&self, address: u32, buf: &mut [u8]) -> anyhow::Result<()> {
        let memory = self.memory.lock().unwrap();
        for (i, b) in buf.iter_mut().enumerate() {
            *b = memory.get(&(address + i as u32)).copied().unwrap_or(0);
        }
        Ok(())
    }

    fn register(&self, reg: Register) -> u32 {
        self.reg(reg)
    }

    fn set_register(&self, reg: Register, value: u32) {
        self.set_reg(reg, value);
    }

    fn read_game_variable(&self, var_id: u16, _index: u16) -> anyhow::Result<i32> {
        self.variables
            .lock()
            .unwrap()
            .get(&var_id)
            .copied()
            .ok_or_else(|| anyhow::anyhow!("unknown game variable {}", var_id))
    }

    fn tick_count(&self) -> u64 {
        self.tick.load(Ordering::SeqCst)
    }

    fn pause(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    fn resume(&self) {
        self.running.store(true, Ordering::SeqCst);
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn cycle_one_frame(&self) {
        self.advance_tick();
        std::thread::sleep(Duration::from_millis(1));
    }
}

#[derive(Default)]
pub struct MemoryRom {
    files: Mutex<HashMap<String, Vec<u8>>>,
    saves: AtomicU64,
    fail_writes: AtomicBool,
}

impl MemoryRom {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, path: &str, data: Vec<u8>) {
        self.files.lock().unwrap().insert(path.to_string(), data);
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(path).cloned()
    }

    pub fn save_count(&self) -> u64 {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl Rom for MemoryRom {
    fn read_file(&self, path: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.file(path))
    }

    fn write_file(&self, path: &str, data: Vec<u8>) -> anyhow::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            anyhow::bail!("ROM is read-only");
        }
        self.insert(path, data);
        Ok(())
    }

    fn save(&self) -> anyhow::Result<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Compiles a line-based script text. Both views share the syntax:
///
/// ```text
/// routine Actor 1     starts a routine
///     Wait 30         an opcode, two words long
/// @46                 continues at opcode offset 46
///     call walk       EXPS only: inlines walk.exps found in the lookup paths
/// ```
pub struct FakeCompiler;

struct Line<'a> {
    number: u32,
    column: u32,
    tokens: Vec<&'a str>,
}

fn lines(text: &str) -> impl Iterator<Item = Line<'_>> {
    text.lines().enumerate().filter_map(|(i, raw)| {
        let trimmed = raw.trim_start();
        if trimmed.is_empty() || trimmed.starts_with("//") {
            return None;
        }
        Some(Line {
            number: i as u32 + 1,
            column: (raw.len() - trimmed.len()) as u32,
            tokens: trimmed.split_whitespace().collect(),
        })
    })
}

fn parse_opcode(line: &Line<'_>, offset: u32) -> Result<SsbOpcode, CompileError> {
    let name = line.tokens[0];
    let id = OPCODES
        .iter()
        .position(|op| *op == name)
        .ok_or_else(|| CompileError::semantic(format!("unknown opcode {}", name), line.number, line.column))?;
    let params = line.tokens[1..]
        .iter()
        .map(|p| {
            p.parse::<i32>()
                .map_err(|_| CompileError::parse(format!("bad parameter {}", p), line.number, line.column))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(SsbOpcode {
        offset,
        id: id as u16,
        name: name.to_string(),
        params,
    })
}

fn parse_kind(token: &str) -> Option<RoutineKind> {
    match token {
        "Generic" => Some(RoutineKind::Generic),
        "Actor" => Some(RoutineKind::Actor),
        "Object" => Some(RoutineKind::Object),
        "Performer" => Some(RoutineKind::Performer),
        "Coroutine" => Some(RoutineKind::Coroutine),
        _ => None,
    }
}

impl FakeCompiler {
    fn compile(
        &self,
        text: &str,
        lookup_paths: Option<&[PathBuf]>,
    ) -> Result<Compilation, CompileError> {
        let mut model = SsbModel::default();
        let mut source_map = SourceMap::new();
        let mut included_files = BTreeSet::new();
        let mut offset = 0u32;

        for line in lines(text) {
            match line.tokens[0] {
                "routine" => {
                    let kind = line
                        .tokens
                        .get(1)
                        .and_then(|t| parse_kind(t))
                        .ok_or_else(|| CompileError::parse("bad routine kind", line.number, line.column))?;
                    let linked_to = line
                        .tokens
                        .get(2)
                        .and_then(|t| t.parse::<i16>().ok())
                        .unwrap_or(-1);
                    model.routines.push(SsbRoutine {
                        kind,
                        linked_to,
                        opcode_offset: offset,
                    });
                }
                t if t.starts_with('@') => {
                    let target: u32 = t[1..]
                        .parse()
                        .map_err(|_| CompileError::parse("bad offset", line.number, line.column))?;
                    if target < offset {
                        return Err(CompileError::parse("offset goes back", line.number, line.column));
                    }
                    offset = target;
                }
                "call" => {
                    let Some(lookup_paths) = lookup_paths else {
                        return Err(CompileError::semantic(
                            "macros need EXPS",
                            line.number,
                            line.column,
                        ));
                    };
                    let name = line.tokens.get(1).copied().unwrap_or_default();
                    let path = lookup_paths
                        .iter()
                        .map(|dir| dir.join(format!("{}.exps", name)))
                        .find(|p| p.is_file())
                        .ok_or_else(|| {
                            CompileError::semantic(format!("macro {} not found", name), line.number, line.column)
                        })?;
                    let macro_text = std::fs::read_to_string(&path)
                        .map_err(|e| CompileError::semantic(e.to_string(), line.number, line.column))?;
                    let body: Vec<Line<'_>> = lines(&macro_text).collect();
                    let return_addr = offset + 2 * body.len() as u32;
                    for (i, macro_line) in body.iter().enumerate() {
                        model.opcodes.push(parse_opcode(macro_line, offset)?);
                        let first = i == 0;
                        source_map.insert(
                            offset,
                            SourceMapEntry::in_macro(
                                macro_line.number,
                                macro_line.column,
                                MacroInfo {
                                    macro_path: Some(path.clone()),
                                    called_in: first.then_some(MacroCallSite {
                                        file: None,
                                        line: line.number,
                                        column: line.column,
                                    }),
                                    return_addr: first.then_some(return_addr),
                                    parameters: BTreeMap::new(),
                                },
                            ),
                        );
                        offset += 2;
                    }
                    included_files.insert(path);
                }
                _ => {
                    model.opcodes.push(parse_opcode(&line, offset)?);
                    source_map.insert(offset, SourceMapEntry::new(line.number, line.column));
                    offset += 2;
                }
            }
        }
        Ok(Compilation {
            model,
            source_map,
            included_files,
        })
    }

    fn decompile(&self, model: &SsbModel) -> (String, SourceMap) {
        let mut text = String::new();
        let mut source_map = SourceMap::new();
        let mut line = 0u32;
        let mut expected = 0u32;
        for (i, routine) in model.routines.iter().enumerate() {
            let end = model
                .routines
                .get(i + 1)
                .map(|r| r.opcode_offset)
                .unwrap_or(u32::MAX);
            if routine.opcode_offset != expected {
                line += 1;
                text.push_str(&format!("@{}\n", routine.opcode_offset));
                expected = routine.opcode_offset;
            }
            line += 1;
            text.push_str(&format!("routine {:?} {}\n", routine.kind, routine.linked_to));
            for op in model
                .opcodes
                .iter()
                .filter(|op| op.offset >= routine.opcode_offset && op.offset < end)
            {
                if op.offset != expected {
                    line += 1;
                    text.push_str(&format!("@{}\n", op.offset));
                }
                line += 1;
                text.push_str("    ");
                text.push_str(&op.name);
                for param in &op.params {
                    text.push_str(&format!(" {}", param));
                }
                text.push('\n');
                source_map.insert(op.offset, SourceMapEntry::new(line, 4));
                expected = op.offset + 2;
            }
        }
        (text, source_map)
    }
}

impl ScriptCompiler for FakeCompiler {
    fn deserialize(&self, bytes: &[u8]) -> anyhow::Result<SsbModel> {
        Ok(serde_json::from_slice(bytes)?)
    }

    fn serialize(&self, model: &SsbModel) -> anyhow::Result<Vec<u8>> {
        Ok(serde_json::to_vec(model)?)
    }

    fn compile_ssbs(&self, text: &str) -> Result<Compilation, CompileError> {
        self.compile(text, None)
    }

    fn compile_exps(
        &self,
        text: &str,
        lookup_paths: &[PathBuf],
    ) -> Result<Compilation, CompileError> {
        self.compile(text, Some(lookup_paths))
    }

    fn decompile_ssbs(&self, model: &SsbModel) -> anyhow::Result<(String, SourceMap)> {
        Ok(self.decompile(model))
    }

    fn decompile_exps(&self, model: &SsbModel) -> anyhow::Result<(String, SourceMap)> {
        Ok(self.decompile(model))
    }
}

/// Bytes of `text` compiled as SSBS, as stored in the ROM.
pub fn compiled(text: &str) -> Vec<u8> {
    let compilation = FakeCompiler.compile_ssbs(text).unwrap();
    FakeCompiler.serialize(&compilation.model).unwrap()
}

pub fn temp_root(name: &str) -> PathBuf {
    let mut root = std::env::temp_dir();
    root.push(format!("ssb_debugger_it_{}_{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&root);
    root
}

pub fn layout() -> ScriptEngineLayout {
    ScriptEngineLayout {
        addresses: HookAddresses {
            script_debug: vec![SCRIPT_DEBUG],
            ssb_load: vec![SSB_LOAD],
            ssx_load: vec![SSX_LOAD],
            talk_load: vec![TALK_LOAD],
            ground_start: vec![GROUND_START],
            ground_quit: vec![GROUND_QUIT],
            ground_map_change: vec![MAP_CHANGE],
            printf_r0: vec![PRINTF_R0],
            printf_r1: vec![PRINTF_R1],
            script_print: vec![SCRIPT_PRINT],
            debug_flag_get_1: vec![FLAG_GET_1],
            debug_flag_get_2: vec![FLAG_GET_2],
            debug_flag_set_1: vec![FLAG_SET_1],
            debug_flag_set_2: vec![FLAG_SET_2],
            script_debug_mode: vec![DEBUG_MODE],
            unionall_pointer: UNIONALL_POINTER,
        },
        registers: HookRegisters::default(),
        opcodes: OPCODES.iter().map(|s| s.to_string()).collect(),
        game_variables: GAME_VARIABLES.iter().map(|s| s.to_string()).collect(),
    }
}

/// Where a script is when it reaches the opcode dispatch.
#[derive(Debug, Clone, Copy)]
pub struct ScriptPos {
    pub hanger: i16,
    pub slot: u16,
    pub offset: u32,
    pub caller_offset: Option<u32>,
    pub routine_table: u32,
    /// Routine table of the caller when it lives in another script, e.g. a unionall routine
    /// called from an actor script.
    pub caller_table: Option<u32>,
}

impl ScriptPos {
    pub fn actor(hanger: i16, slot: u16, offset: u32) -> Self {
        Self {
            hanger,
            slot,
            offset,
            caller_offset: None,
            routine_table: ROUTINE_TABLE,
            caller_table: None,
        }
    }

    pub fn opcode_addr(&self) -> u32 {
        self.routine_table + self.offset * 2
    }
}

/// A debugger session on top of the fakes, with every hook registered.
pub struct Harness {
    pub emu: Arc<FakeEmulator>,
    pub rom: Arc<MemoryRom>,
    pub root: PathBuf,
    pub session: DebuggerSession,
    seen: RefCell<Vec<DebuggerEvent>>,
    strings: RefCell<u32>,
}

impl Harness {
    pub fn new(name: &str) -> Self {
        Self::with_config(name, DebuggerConfig::default())
    }

    pub fn with_config(name: &str, config: DebuggerConfig) -> Self {
        let emu = FakeEmulator::new();
        let rom = MemoryRom::new();
        let root = temp_root(name);
        let project = ProjectFiles::open(&root, "eos_us");
        let mut session = DebuggerSession::new(
            emu.clone(),
            Arc::new(FakeCompiler),
            rom.clone(),
            project,
            layout(),
            config,
        );
        session.enable_debugging().unwrap();
        Self {
            emu,
            rom,
            root,
            session,
            seen: RefCell::new(Vec::new()),
            strings: RefCell::new(STRING_AREA),
        }
    }

    pub fn put_script(&self, filename: &str, text: &str) {
        self.rom.insert(filename, compiled(text));
    }

    pub fn write_macro(&self, name: &str, text: &str) -> PathBuf {
        let path = self.session.project().macros_dir().join(format!("{}.exps", name));
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, text).unwrap();
        path
    }

    /// Places `s` in emulator memory and returns its address.
    pub fn string(&self, s: &str) -> u32 {
        let mut next = self.strings.borrow_mut();
        let address = *next;
        self.emu.write_cstr(address, s);
        *next += (s.len() as u32 + 16) & !3;
        address
    }

    pub fn start_ground(&self) {
        self.emu.fire_exec(GROUND_START);
    }

    pub fn quit_ground(&self) {
        self.emu.fire_exec(GROUND_QUIT);
    }

    /// Loads an SSB the way the engine does: hanger 0 directly, scene hangers through the
    /// SSX load that announces them.
    pub fn load_ssb(&self, hanger: u32, filename: &str) {
        if hanger > 0 {
            let scene = self.string("SCRIPT/D01P11A/m01a0101.sse");
            self.emu.set_reg(2, hanger);
            self.emu.set_reg(3, scene);
            self.emu.fire_exec(SSX_LOAD);
        }
        let name = self.string(filename);
        self.emu.set_reg(1, name);
        self.emu.fire_exec(SSB_LOAD);
    }

    /// Writes the runtime struct of an actor script at `pos` and points the dispatch register
    /// at it.
    pub fn prepare_opcode(&self, pos: ScriptPos) {
        let target = TARGET_BASE + u32::from(pos.slot) * 0x100;
        self.emu.write_u16(target, pos.slot);

        let mut record = vec![0u8; 0x34];
        record[0x04..0x08].copy_from_slice(&target.to_le_bytes());
        record[0x08..0x0c].copy_from_slice(&3u32.to_le_bytes());
        record[0x10..0x12].copy_from_slice(&pos.hanger.to_le_bytes());
        record[0x14..0x18].copy_from_slice(&pos.routine_table.to_le_bytes());
        record[0x18..0x1c].copy_from_slice(&(pos.routine_table + 0x40).to_le_bytes());
        record[0x1c..0x20].copy_from_slice(&pos.opcode_addr().to_le_bytes());
        record[0x20..0x24].copy_from_slice(&(pos.routine_table + 0x1000).to_le_bytes());
        if let Some(caller) = pos.caller_offset {
            let caller_table = pos.caller_table.unwrap_or(pos.routine_table);
            record[0x24..0x28].copy_from_slice(&caller_table.to_le_bytes());
            let caller_addr = caller_table + caller * 2;
            record[0x2c..0x30].copy_from_slice(&caller_addr.to_le_bytes());
        }
        self.emu.write_bytes(RUNTIME_PTR, &record);
        self.emu.set_reg(6, RUNTIME_PTR);
    }

    /// Dispatches the opcode at `pos` on a separate "emulator" thread.
    pub fn spawn_opcode(&self, pos: ScriptPos) -> JoinHandle<()> {
        self.prepare_opcode(pos);
        let emu = self.emu.clone();
        std::thread::spawn(move || emu.fire_exec(SCRIPT_DEBUG))
    }

    pub fn wait_for_halt(&self) -> Arc<HaltRecord> {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(halt) = self.session.current_halt() {
                return halt;
            }
            assert!(Instant::now() < deadline, "no halt within 5s");
            self.poll();
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    /// Dispatches the opcode at `pos` and returns the halt it raised.
    pub fn expect_halt(&self, pos: ScriptPos) -> (Arc<HaltRecord>, JoinHandle<()>) {
        let handle = self.spawn_opcode(pos);
        (self.wait_for_halt(), handle)
    }

    /// Dispatches the opcode at `pos` and fails if it halts.
    pub fn expect_no_halt(&self, pos: ScriptPos) {
        let handle = self.spawn_opcode(pos);
        let deadline = Instant::now() + Duration::from_secs(5);
        while !handle.is_finished() {
            if let Some(halt) = self.session.current_halt() {
                halt.release(ResumeDecision::FailHard);
                handle.join().unwrap();
                panic!("unexpected halt at offset {}", pos.offset);
            }
            assert!(Instant::now() < deadline, "opcode hook did not return");
            std::thread::sleep(Duration::from_millis(2));
        }
        handle.join().unwrap();
    }

    /// Releases `halt` and waits until the emulator thread ran on.
    pub fn resume(&self, halt: &HaltRecord, handle: JoinHandle<()>, decision: ResumeDecision) {
        assert!(halt.release(decision));
        handle.join().unwrap();
        self.poll();
    }

    /// Polls the session and keeps the events for [`Harness::take_events`].
    pub fn poll(&self) {
        let events = self.session.poll();
        self.seen.borrow_mut().extend(events);
    }

    pub fn take_events(&self) -> Vec<DebuggerEvent> {
        self.poll();
        std::mem::take(&mut *self.seen.borrow_mut())
    }

    pub fn opened_in_ground_engine(&self) -> BTreeSet<String> {
        let cache = self.session.cache();
        ["SCRIPT/D01P11A/m01a_01.ssb", "SCRIPT/D01P11A/m01a_02.ssb", "SCRIPT/COMMON/unionall.ssb"]
            .iter()
            .filter(|f| {
                cache
                    .cached(f)
                    .is_some_and(|entry| entry.lock().unwrap().flags().opened_in_ground_engine)
            })
            .map(|f| f.to_string())
            .collect()
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        if let Some(halt) = self.session.current_halt() {
            halt.release(ResumeDecision::FailHard);
        }
        let _ = std::fs::remove_dir_all(&self.root);
    }
}

pub fn breakpoints_file(path: &Path) -> serde_json::Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

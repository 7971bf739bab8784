use super::ResumeDecision;
use crate::runtime::ScriptRuntimeRecord;
use crate::script_file::SourceView;
use crate::source_map::{SourceMap, SourceMapEntry};

/// Which source file and line a halt is shown in.
///
/// Usually the SSB's own text, but opcodes inlined from a macro are shown in the macro's EXPS
/// file. The first opcode of an inlined macro is a call site: it is shown at the call in the
/// caller until the user descends into the macro.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HaltFileState {
    pub ssb_filename: String,
    /// SSB filename, or absolute path of the macro file the halt is shown in.
    pub handler_filename: String,
    pub view: Option<SourceView>,
    pub opcode_offset: u32,
    /// Line and column in `handler_filename`, if the opcode is mapped.
    pub position: Option<(u32, u32)>,
    pub halted_on_call: bool,
    entry: Option<SourceMapEntry>,
}

impl HaltFileState {
    pub fn new(
        ssb_filename: &str,
        opcode_offset: u32,
        source_map: Option<(SourceView, &SourceMap)>,
    ) -> Self {
        let view = source_map.map(|(view, _)| view);
        let entry = source_map.and_then(|(_, map)| map.line_col_for(opcode_offset).cloned());

        let mut state = Self {
            ssb_filename: ssb_filename.to_string(),
            handler_filename: ssb_filename.to_string(),
            view,
            opcode_offset,
            position: None,
            halted_on_call: false,
            entry: entry.clone(),
        };
        let Some(entry) = entry else {
            return state;
        };

        let call_site = entry
            .macro_info
            .as_ref()
            .filter(|info| info.is_call_site())
            .and_then(|info| info.called_in.clone());
        match call_site {
            Some(site) => {
                state.halted_on_call = true;
                if let Some(file) = site.file {
                    state.handler_filename = file.to_string_lossy().into_owned();
                }
                state.position = Some((site.line, site.column));
            }
            None => {
                if let Some(path) = entry.macro_path() {
                    state.handler_filename = path.to_string_lossy().into_owned();
                }
                state.position = Some((entry.line, entry.column));
            }
        }
        state
    }

    pub fn source_entry(&self) -> Option<&SourceMapEntry> {
        self.entry.as_ref()
    }

    /// Shows the halt inside the called macro instead of at the call. The emulator does not
    /// move. Returns false if the halt is not on a macro call.
    pub fn step_into_macro_call(&mut self) -> bool {
        if !self.halted_on_call {
            return false;
        }
        let Some(entry) = &self.entry else {
            return false;
        };
        let Some(path) = entry.macro_path() else {
            return false;
        };
        self.handler_filename = path.to_string_lossy().into_owned();
        self.position = Some((entry.line, entry.column));
        self.halted_on_call = false;
        true
    }

    /// On a macro call, stepping over means running until the macro returns.
    pub fn resolve(
        &self,
        decision: ResumeDecision,
        runtime: &ScriptRuntimeRecord,
    ) -> ResumeDecision {
        if decision != ResumeDecision::StepOver || !self.halted_on_call {
            return decision;
        }
        let return_offset = self
            .entry
            .as_ref()
            .and_then(|e| e.macro_info.as_ref())
            .and_then(|info| info.return_addr);
        match return_offset {
            Some(offset) => ResumeDecision::StepManual(runtime.opcode_addr_for(offset)),
            None => decision,
        }
    }
}

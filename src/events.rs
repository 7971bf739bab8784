use crate::debugger::HaltRecord;
use std::fmt;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    /// Output of the game's printf-style debug functions.
    Printfs,
    /// Output of `debug_Print` and related script opcodes.
    DebugPrint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DebugFlagVar {
    Flag1,
    Flag2,
}

impl DebugFlagVar {
    pub fn index(self) -> usize {
        match self {
            DebugFlagVar::Flag1 => 0,
            DebugFlagVar::Flag2 => 1,
        }
    }
}

/// Messages posted from the emulator thread (and from cache transitions) to the UI thread.
///
/// `ReloadRequested` is consumed by the session's poll loop, which performs the reload on the UI
/// thread and forwards `FileReloaded` instead.
pub enum DebuggerEvent {
    Halted(Arc<HaltRecord>),
    DebugPrint { kind: LogKind, message: String },
    DebugFlagChanged {
        var: DebugFlagVar,
        flag_id: u32,
        value: bool,
    },
    GroundStarted,
    GroundQuit,
    MapChanged,
    SsbLoaded { slot: usize, filename: String },
    SsxLoaded { hanger: usize, name: String },
    TalkLoaded { hanger: usize },
    ReloadRequested(String),
    FileReloaded(String),
    BreakpointsChanged { filename: String },
    /// Non-fatal problem the user should see (persistence failures, stale files on restore).
    Warning(String),
}

impl fmt::Debug for DebuggerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DebuggerEvent::Halted(halt) => write!(f, "Halted({})", halt.describe()),
            DebuggerEvent::DebugPrint { kind, message } => {
                write!(f, "DebugPrint({:?}, {:?})", kind, message)
            }
            DebuggerEvent::DebugFlagChanged {
                var,
                flag_id,
                value,
            } => write!(f, "DebugFlagChanged({:?}, {}, {})", var, flag_id, value),
            DebuggerEvent::GroundStarted => write!(f, "GroundStarted"),
            DebuggerEvent::GroundQuit => write!(f, "GroundQuit"),
            DebuggerEvent::MapChanged => write!(f, "MapChanged"),
            DebuggerEvent::SsbLoaded { slot, filename } => {
                write!(f, "SsbLoaded({}, {})", slot, filename)
            }
            DebuggerEvent::SsxLoaded { hanger, name } => {
                write!(f, "SsxLoaded({}, {})", hanger, name)
            }
            DebuggerEvent::TalkLoaded { hanger } => write!(f, "TalkLoaded({})", hanger),
            DebuggerEvent::ReloadRequested(name) => write!(f, "ReloadRequested({})", name),
            DebuggerEvent::FileReloaded(name) => write!(f, "FileReloaded({})", name),
            DebuggerEvent::BreakpointsChanged { filename } => {
                write!(f, "BreakpointsChanged({})", filename)
            }
            DebuggerEvent::Warning(msg) => write!(f, "Warning({})", msg),
        }
    }
}

/// Cloneable sending half handed to every component that reports to the UI.
#[derive(Clone)]
pub struct EventSender {
    tx: Sender<DebuggerEvent>,
}

impl EventSender {
    /// Never blocks; a closed UI side only drops the event.
    pub fn send(&self, event: DebuggerEvent) {
        if self.tx.send(event).is_err() {
            log::debug!("Debugger event dropped: UI receiver is gone");
        }
    }
}

pub fn channel() -> (EventSender, Receiver<DebuggerEvent>) {
    let (tx, rx) = mpsc::channel();
    (EventSender { tx }, rx)
}

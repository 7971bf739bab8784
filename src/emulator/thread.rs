use super::SharedEmulator;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmulatorCommand {
    Run,
    Pause,
    /// Emulate a single frame, then stay paused.
    StepFrame,
    Shutdown,
}

/// Drives the emulator's frame loop on a dedicated thread. All hooks fire on this thread.
pub struct EmulatorThread {
    cmd_tx: Sender<EmulatorCommand>,
    handle: Option<JoinHandle<()>>,
}

impl EmulatorThread {
    pub fn spawn(emulator: SharedEmulator) -> anyhow::Result<Self> {
        let (cmd_tx, cmd_rx) = mpsc::channel::<EmulatorCommand>();
        let handle = thread::Builder::new()
            .name("emulator".to_string())
            .spawn(move || run_loop(emulator, cmd_rx))?;
        Ok(Self {
            cmd_tx,
            handle: Some(handle),
        })
    }

    pub fn send(&self, cmd: EmulatorCommand) {
        if self.cmd_tx.send(cmd).is_err() {
            log::warn!("Emulator thread is gone, dropping {:?}", cmd);
        }
    }

    /// Stops the loop and waits for the thread. Any halt must be released before this.
    pub fn join(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let _ = self.cmd_tx.send(EmulatorCommand::Shutdown);
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            log::error!("Emulator thread panicked");
        }
    }
}

impl Drop for EmulatorThread {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_loop(emulator: SharedEmulator, cmd_rx: Receiver<EmulatorCommand>) {
    let mut running = false;
    loop {
        let cmd = if running {
            match cmd_rx.try_recv() {
                Ok(cmd) => Some(cmd),
                Err(TryRecvError::Empty) => None,
                Err(TryRecvError::Disconnected) => break,
            }
        } else {
            match cmd_rx.recv() {
                Ok(cmd) => Some(cmd),
                Err(_) => break,
            }
        };

        match cmd {
            Some(EmulatorCommand::Run) => {
                emulator.resume();
                running = true;
            }
            Some(EmulatorCommand::Pause) => {
                emulator.pause();
                running = false;
            }
            Some(EmulatorCommand::StepFrame) => {
                emulator.pause();
                running = false;
                emulator.cycle_one_frame();
            }
            Some(EmulatorCommand::Shutdown) => break,
            None => {}
        }

        if running {
            emulator.cycle_one_frame();
        }
    }
    log::debug!("Emulator thread stopped");
}

use crate::error::{ConvertError, Result};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Wait,
    Started,
    Prepare,
    CopyShape,
    GenBlocks,
    ProcessTier1,
    ProcessTier2,
    ProcessTier3,
    CreateAliases,
    Finished,
}

impl Stage {
    pub fn label(self) -> &'static str {
        match self {
            Stage::Wait => "Wait for convertation",
            Stage::Started => "Convert STARTED",
            Stage::Prepare => "Convert prepare",
            Stage::CopyShape => "Copy videls shape",
            Stage::GenBlocks => "Generate kvr layers",
            Stage::ProcessTier1 => "Process PHL1.dbf",
            Stage::ProcessTier2 => "Process PHL2.dbf",
            Stage::ProcessTier3 => "Process PHL3.dbf",
            Stage::CreateAliases => "Create aliases",
            Stage::Finished => "Convert FINISHED",
        }
    }
}

/// Cooperative cancellation flag. Once set it stays set.
#[derive(Debug, Clone, Default)]
pub struct InterruptHandle(Arc<AtomicBool>);

impl InterruptHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn interrupt(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub type StatusCallback = Box<dyn FnMut(&str) + Send>;

/// Current stage, status delivery and the cancellation checkpoint.
pub struct Progress {
    stage: Stage,
    callback: Option<StatusCallback>,
    interrupt: InterruptHandle,
    last_message: String,
}

impl Progress {
    pub fn new(interrupt: InterruptHandle, callback: Option<StatusCallback>) -> Self {
        Self {
            stage: Stage::Wait,
            callback,
            interrupt,
            last_message: String::new(),
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn enter(&mut self, stage: Stage) {
        self.stage = stage;
        info!(stage = stage.label(), "stage entered");
        self.message("Set");
    }

    /// Delivers "<stage>: <msg>" and returns it.
    pub fn message(&mut self, msg: &str) -> String {
        let line = format!("{}: {}", self.stage.label(), msg);
        if let Some(cb) = self.callback.as_mut() {
            cb(&line);
        }
        self.last_message = line.clone();
        line
    }

    pub fn last_message(&self) -> &str {
        &self.last_message
    }

    pub fn checkpoint(&self) -> Result<()> {
        if self.interrupt.is_set() {
            return Err(ConvertError::Interrupted);
        }
        Ok(())
    }
}

use std::collections::HashMap;
use std::thread::JoinHandle;

use lesis2sqlite::{ConvertResult, InterruptHandle, RecordError, RunReport};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Final state of a conversion job.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub result: ConvertResult,
    pub errors: Vec<RecordError>,
    pub report: RunReport,
    pub status: String,
}

pub struct Job {
    pub interrupt: InterruptHandle,
    pub started_at: String,
    pub handle: Option<JoinHandle<JobOutcome>>,
    pub outcome: Option<JobOutcome>,
}

#[derive(Default)]
pub struct AppState {
    pub jobs: HashMap<String, Job>,
}

impl AppState {
    /// Interrupts every running job and waits for its thread to exit.
    pub fn shutdown(&mut self) {
        for job in self.jobs.values() {
            job.interrupt.interrupt();
        }
        for (id, job) in self.jobs.iter_mut() {
            if let Some(handle) = job.handle.take() {
                match handle.join() {
                    Ok(outcome) => job.outcome = Some(outcome),
                    Err(_) => tracing::warn!(job = %id, "conversion thread panicked"),
                }
            }
        }
    }
}

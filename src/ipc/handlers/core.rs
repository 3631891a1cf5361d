use crate::ipc::error::ok;
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    let running = state
        .jobs
        .values()
        .filter(|j| j.handle.as_ref().is_some_and(|h| !h.is_finished()))
        .count();
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "jobs": state.jobs.len(),
            "running": running
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        _ => None,
    }
}

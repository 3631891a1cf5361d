use super::handlers;
use super::types::{AppState, Request};
use crate::ipc::error::{err, Code};

pub fn handle_request(state: &mut AppState, req: Request) -> serde_json::Value {
    if let Some(resp) = handlers::core::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::convert::try_handle(state, &req) {
        return resp;
    }

    err(
        &req.id,
        Code::NotImplemented,
        format!("unknown method: {}", req.method),
        None,
    )
}

use serde_json::json;

/// Error codes the sidecar answers with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Code {
    BadParams,
    NotFound,
    NotImplemented,
    SpawnFailed,
    JobFailed,
}

impl Code {
    pub fn as_str(self) -> &'static str {
        match self {
            Code::BadParams => "bad_params",
            Code::NotFound => "not_found",
            Code::NotImplemented => "not_implemented",
            Code::SpawnFailed => "spawn_failed",
            Code::JobFailed => "job_failed",
        }
    }
}

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({ "id": id, "ok": true, "result": result })
}

pub fn err(
    id: &str,
    code: Code,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({ "code": code.as_str(), "message": message.into() });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({ "id": id, "ok": false, "error": error })
}

pub fn bad_param(id: &str, name: &str) -> serde_json::Value {
    err(
        id,
        Code::BadParams,
        format!("missing params.{name}"),
        Some(json!({ "param": name })),
    )
}

pub fn unknown_job(id: &str, job_id: &str) -> serde_json::Value {
    err(
        id,
        Code::NotFound,
        format!("unknown job: {job_id}"),
        Some(json!({ "jobId": job_id })),
    )
}

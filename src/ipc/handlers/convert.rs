use crate::ipc::emit;
use crate::ipc::error::{bad_param, err, ok, unknown_job, Code};
use crate::ipc::types::{AppState, Job, JobOutcome, Request};
use lesis2sqlite::{ConvertRequest, ConvertSettings, Converter};
use serde_json::json;
use std::path::PathBuf;
use tracing::info;

fn path_param(req: &Request, name: &str) -> Option<PathBuf> {
    req.params
        .get(name)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from)
}

fn job_id_param(req: &Request) -> Option<&str> {
    req.params.get("jobId").and_then(|v| v.as_str())
}

fn handle_start(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(base) = path_param(req, "lesisBaseDir") else {
        return bad_param(&req.id, "lesisBaseDir");
    };
    let Some(shape) = path_param(req, "shapePath") else {
        return bad_param(&req.id, "shapePath");
    };
    let Some(sqlite) = path_param(req, "sqlitePath") else {
        return bad_param(&req.id, "sqlitePath");
    };
    let settings = match ConvertSettings::from_json(req.params.get("settings")) {
        Ok(s) => s,
        Err(e) => {
            return err(
                &req.id,
                Code::BadParams,
                format!("invalid params.settings: {e}"),
                None,
            )
        }
    };
    let crs_wkt = req
        .params
        .get("crsWkt")
        .and_then(|v| v.as_str())
        .map(str::to_string);

    let job_id = uuid::Uuid::new_v4().to_string();
    let started_at = chrono::Utc::now().to_rfc3339();

    let mut request = ConvertRequest::new(base, shape, sqlite);
    request.settings = settings;
    let event_job = job_id.clone();
    let mut converter = Converter::new(request).on_status(move |message| {
        emit(&json!({
            "event": "convert.status",
            "jobId": event_job,
            "message": message,
        }));
    });
    if let Some(wkt) = crs_wkt {
        converter = converter.with_crs_fallback(move || Some(wkt.clone()));
    }
    let interrupt = converter.interrupt_handle();

    let spawned = std::thread::Builder::new()
        .name(format!("convert-{job_id}"))
        .spawn(move || {
            let result = converter.convert();
            JobOutcome {
                result,
                errors: converter.errors().to_vec(),
                report: converter.report().clone(),
                status: converter.status().to_string(),
            }
        });
    let handle = match spawned {
        Ok(h) => h,
        Err(e) => return err(&req.id, Code::SpawnFailed, e.to_string(), None),
    };

    info!(job = %job_id, "conversion job started");
    state.jobs.insert(
        job_id.clone(),
        Job {
            interrupt,
            started_at: started_at.clone(),
            handle: Some(handle),
            outcome: None,
        },
    );
    ok(&req.id, json!({ "jobId": job_id, "startedAt": started_at }))
}

fn handle_interrupt(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(job_id) = job_id_param(req) else {
        return bad_param(&req.id, "jobId");
    };
    let Some(job) = state.jobs.get(job_id) else {
        return unknown_job(&req.id, job_id);
    };
    let running = job.outcome.is_none();
    job.interrupt.interrupt();
    ok(&req.id, json!({ "interrupted": running }))
}

fn handle_result(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(job_id) = job_id_param(req) else {
        return bad_param(&req.id, "jobId");
    };
    let Some(job) = state.jobs.get_mut(job_id) else {
        return unknown_job(&req.id, job_id);
    };

    if job.outcome.is_none() {
        let finished = job.handle.as_ref().map_or(true, |h| h.is_finished());
        if !finished {
            return ok(
                &req.id,
                json!({ "state": "running", "startedAt": job.started_at }),
            );
        }
        match job.handle.take().map(|h| h.join()) {
            Some(Ok(outcome)) => job.outcome = Some(outcome),
            _ => {
                return err(
                    &req.id,
                    Code::JobFailed,
                    format!("conversion job {job_id} panicked"),
                    None,
                )
            }
        }
    }

    match &job.outcome {
        Some(outcome) => ok(
            &req.id,
            json!({
                "state": "finished",
                "startedAt": job.started_at,
                "result": outcome.result,
                "errors": outcome.errors,
                "report": outcome.report,
                "status": outcome.status,
            }),
        ),
        None => err(&req.id, Code::JobFailed, "conversion job lost", None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "convert.start" => Some(handle_start(state, req)),
        "convert.interrupt" => Some(handle_interrupt(state, req)),
        "convert.result" => Some(handle_result(state, req)),
        _ => None,
    }
}

use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    bands_json, committed_scale, parse_scale, require_db, validate_and_save, validation_report,
};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

const DEFAULT_REVISION_LIMIT: i64 = 20;

fn handle_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    let committed = match committed_scale(conn) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    // The stored scale is raw input; report its health instead of refusing to show it.
    let mut result = validation_report(&committed.scale);
    if result["valid"] == json!(false) {
        log_warn!(
            "committed grading scale (revision {:?}) fails validation",
            committed.revision
        );
    }
    result["revision"] = json!(committed.revision);
    result["isDefault"] = json!(committed.is_default);
    ok(&req.id, result)
}

fn handle_validate(_state: &mut AppState, req: &Request) -> serde_json::Value {
    match parse_scale(req.params.get("bands")) {
        Ok(scale) => ok(&req.id, validation_report(&scale)),
        Err(e) => e.response(&req.id),
    }
}

fn handle_save(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    let scale = match parse_scale(req.params.get("bands")) {
        Ok(s) => s,
        Err(e) => return e.response(&req.id),
    };
    match validate_and_save(conn, &scale) {
        Ok((validated, revision)) => {
            log_info!(
                "grading scale saved as revision {} ({} bands)",
                revision,
                validated.bands().len()
            );
            ok(
                &req.id,
                json!({
                    "revision": revision,
                    "bands": bands_json(validated.bands()),
                    "uncovered": validated.uncovered_ranges(),
                }),
            )
        }
        Err(e) => {
            log_debug!("gradingScale.save rejected: {}", e.message);
            e.response(&req.id)
        }
    }
}

fn handle_revisions(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let limit = match req.params.get("limit") {
        None => DEFAULT_REVISION_LIMIT,
        Some(v) if v.is_null() => DEFAULT_REVISION_LIMIT,
        Some(v) => match v.as_i64() {
            Some(n) if (1..=500).contains(&n) => n,
            _ => return err(&req.id, "bad_params", "limit must be integer in 1..=500", None),
        },
    };
    match db::grading_scale_revisions(conn, limit) {
        Ok(revisions) => ok(&req.id, json!({ "revisions": revisions })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "gradingScale.get" => Some(handle_get(state, req)),
        "gradingScale.validate" => Some(handle_validate(state, req)),
        "gradingScale.save" => Some(handle_save(state, req)),
        "gradingScale.revisions" => Some(handle_revisions(state, req)),
        _ => None,
    }
}

use crate::grading::{BandPatch, EditError, GradeBand, GradingScale};
use crate::ipc::error::ok;
use crate::ipc::helpers::{
    bands_json, committed_scale, parse_scale, require_db, require_str, validate_and_save,
    validation_report, HandlerErr,
};
use crate::ipc::types::{AppState, Draft, Request};
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

const MAX_OPEN_DRAFTS: usize = 32;

fn edit_rejected(e: EditError) -> HandlerErr {
    let grade = match &e {
        EditError::UnknownGrade(g) | EditError::DuplicateGrade(g) => g.clone(),
    };
    HandlerErr {
        code: "edit_rejected",
        message: e.to_string(),
        details: Some(json!({ "grade": grade })),
    }
}

fn draft<'a>(state: &'a AppState, req: &Request) -> Result<(&'a str, &'a Draft), HandlerErr> {
    let id = require_str(req, "draftId")?;
    state
        .drafts
        .get_key_value(id)
        .map(|(k, d)| (k.as_str(), d))
        .ok_or_else(|| HandlerErr::new("not_found", format!("no open draft {}", id)))
}

fn apply_edit<F>(state: &mut AppState, req: &Request, edit: F) -> Result<serde_json::Value, HandlerErr>
where
    F: FnOnce(&GradingScale) -> Result<GradingScale, HandlerErr>,
{
    let (id, current) = draft(state, req)?;
    let id = id.to_string();
    let next = edit(&current.scale)?;
    let bands = bands_json(next.bands());
    if let Some(d) = state.drafts.get_mut(&id) {
        d.scale = next;
    }
    Ok(json!({ "draftId": id, "bands": bands }))
}

fn handle_open(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    if state.drafts.len() >= MAX_OPEN_DRAFTS {
        return Err(HandlerErr {
            code: "bad_params",
            message: format!(
                "too many open drafts (max {}); discard one from gradingScale.draft.list",
                MAX_OPEN_DRAFTS
            ),
            details: Some(json!({ "max": MAX_OPEN_DRAFTS, "open": state.drafts.len() })),
        });
    }
    let committed = committed_scale(conn)?;
    let revision = committed.revision;
    let scale = match req.params.get("bands") {
        None => committed.scale,
        Some(v) if v.is_null() => committed.scale,
        Some(v) => parse_scale(Some(v))?,
    };

    let draft_id = Uuid::new_v4().to_string();
    let bands = bands_json(scale.bands());
    state.drafts.insert(
        draft_id.clone(),
        Draft {
            scale,
            base_revision: revision,
            opened_at: Utc::now(),
        },
    );
    log_debug!("draft {} opened on revision {:?}", draft_id, revision);
    Ok(json!({
        "draftId": draft_id,
        "baseRevision": revision,
        "isDefault": committed.is_default,
        "bands": bands,
    }))
}

fn handle_list(state: &mut AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let mut open: Vec<(&String, &Draft)> = state.drafts.iter().collect();
    open.sort_by(|(a_id, a), (b_id, b)| {
        a.opened_at
            .cmp(&b.opened_at)
            .then_with(|| a_id.cmp(b_id))
    });
    let drafts: Vec<serde_json::Value> = open
        .into_iter()
        .map(|(id, d)| {
            json!({
                "draftId": id,
                "baseRevision": d.base_revision,
                "openedAt": d.opened_at.to_rfc3339(),
                "bandCount": d.scale.bands().len(),
            })
        })
        .collect();
    Ok(json!({ "drafts": drafts, "max": MAX_OPEN_DRAFTS }))
}

fn handle_get(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let (id, d) = draft(state, req)?;
    let mut report = validation_report(&d.scale);
    // Show the draft as edited, not the canonical order.
    report["bands"] = bands_json(d.scale.bands());
    report["draftId"] = json!(id);
    report["baseRevision"] = json!(d.base_revision);
    Ok(report)
}

fn handle_add_band(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let Some(raw) = req.params.get("band") else {
        return Err(HandlerErr::bad_params("missing params.band"));
    };
    let band: GradeBand = serde_json::from_value(raw.clone())
        .map_err(|e| HandlerErr::bad_params(format!("band: {}", e)))?;
    apply_edit(state, req, |s| s.add_band(band).map_err(edit_rejected))
}

fn handle_remove_band(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let grade = require_str(req, "grade")?.to_string();
    apply_edit(state, req, |s| s.remove_band(&grade).map_err(edit_rejected))
}

fn handle_update_band(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let grade = require_str(req, "grade")?.to_string();
    let Some(raw) = req.params.get("patch") else {
        return Err(HandlerErr::bad_params("missing params.patch"));
    };
    let patch: BandPatch = serde_json::from_value(raw.clone())
        .map_err(|e| HandlerErr::bad_params(format!("patch: {}", e)))?;
    apply_edit(state, req, |s| s.update_band(&grade, &patch).map_err(edit_rejected))
}

fn handle_rename_band(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let from = require_str(req, "from")?.to_string();
    let to = require_str(req, "to")?.to_string();
    apply_edit(state, req, |s| s.rename_band(&from, &to).map_err(edit_rejected))
}

fn handle_validate(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let (id, d) = draft(state, req)?;
    let mut report = validation_report(&d.scale);
    report["draftId"] = json!(id);
    Ok(report)
}

fn handle_commit(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let (id, d) = draft(state, req)?;
    let (validated, revision) = validate_and_save(conn, &d.scale).inspect_err(|e| {
        log_debug!("draft {} commit rejected: {}", id, e.message);
    })?;
    let id = id.to_string();
    state.drafts.remove(&id);
    log_info!("draft {} committed as revision {}", id, revision);
    Ok(json!({
        "draftId": id,
        "revision": revision,
        "bands": bands_json(validated.bands()),
        "uncovered": validated.uncovered_ranges(),
    }))
}

fn handle_discard(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let id = require_str(req, "draftId")?;
    let discarded = state.drafts.remove(id).is_some();
    Ok(json!({ "draftId": id, "discarded": discarded }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "gradingScale.draft.open" => handle_open(state, req),
        "gradingScale.draft.list" => handle_list(state, req),
        "gradingScale.draft.get" => handle_get(state, req),
        "gradingScale.draft.addBand" => handle_add_band(state, req),
        "gradingScale.draft.removeBand" => handle_remove_band(state, req),
        "gradingScale.draft.updateBand" => handle_update_band(state, req),
        "gradingScale.draft.renameBand" => handle_rename_band(state, req),
        "gradingScale.draft.validate" => handle_validate(state, req),
        "gradingScale.draft.commit" => handle_commit(state, req),
        "gradingScale.draft.discard" => handle_discard(state, req),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}

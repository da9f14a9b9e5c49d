use crate::grading::{Rounding, ValidatedScale};
use crate::ipc::error::ok;
use crate::ipc::helpers::{committed_scale, require_db, HandlerErr};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

const MAX_BATCH: usize = 100_000;

fn lookup_scale(state: &AppState) -> Result<ValidatedScale, HandlerErr> {
    let conn = require_db(state)?;
    committed_scale(conn)?.scale.validate().map_err(|e| {
        log_warn!("grade lookup refused: {}", e);
        HandlerErr::validation_failed(&e)
    })
}

fn parse_rounding(req: &Request) -> Result<Rounding, HandlerErr> {
    match req.params.get("rounding") {
        None => Ok(Rounding::default()),
        Some(v) if v.is_null() => Ok(Rounding::default()),
        Some(v) => v
            .as_str()
            .and_then(Rounding::parse)
            .ok_or_else(|| HandlerErr::bad_params("rounding must be one of: none, nearest")),
    }
}

fn handle_grade_for(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let Some(percentage) = req.params.get("percentage").and_then(|v| v.as_f64()) else {
        return Err(HandlerErr::bad_params("percentage must be a number"));
    };
    let rounding = parse_rounding(req)?;
    let scale = lookup_scale(state)?;
    let looked_up = rounding.apply(percentage);
    let band = scale.grade_for(looked_up);
    Ok(json!({
        "percentage": percentage,
        "lookedUp": looked_up,
        "found": band.is_some(),
        "band": band,
    }))
}

fn handle_grade_many(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let Some(raw) = req.params.get("percentages").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("percentages must be an array"));
    };
    if raw.len() > MAX_BATCH {
        return Err(HandlerErr {
            code: "bad_params",
            message: format!("at most {} percentages per call", MAX_BATCH),
            details: Some(json!({ "max": MAX_BATCH, "got": raw.len() })),
        });
    }
    let mut percentages = Vec::with_capacity(raw.len());
    for (i, v) in raw.iter().enumerate() {
        let Some(p) = v.as_f64() else {
            return Err(HandlerErr {
                code: "bad_params",
                message: format!("percentages[{}] must be a number", i),
                details: Some(json!({ "index": i })),
            });
        };
        percentages.push(p);
    }
    let rounding = parse_rounding(req)?;
    let scale = lookup_scale(state)?;
    let summary = scale.grade_many(&percentages, rounding);
    log_debug!(
        "gradeMany: {} matched, {} unmatched",
        summary.matched,
        summary.unmatched
    );
    Ok(json!(summary))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "grading.gradeFor" => handle_grade_for(state, req),
        "grading.gradeMany" => handle_grade_many(state, req),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}

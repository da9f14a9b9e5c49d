use crate::db;
use crate::grading::{self, GradeBand, GradingScale, ValidatedScale, ValidationErrors};
use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::json;

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    pub fn validation_failed(errors: &ValidationErrors) -> Self {
        Self {
            code: "validation_failed",
            message: errors.to_string(),
            details: Some(json!({ "violations": errors.to_json() })),
        }
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

pub fn require_db(state: &AppState) -> Result<&Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

pub fn require_str<'a>(req: &'a Request, key: &str) -> Result<&'a str, HandlerErr> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing params.{}", key)))
}

pub fn parse_scale(raw: Option<&serde_json::Value>) -> Result<GradingScale, HandlerErr> {
    let Some(raw) = raw else {
        return Err(HandlerErr::bad_params("missing params.bands"));
    };
    GradingScale::from_json(raw).map_err(|e| HandlerErr::bad_params(format!("bands: {}", e)))
}

pub fn bands_json(bands: &[GradeBand]) -> serde_json::Value {
    json!(bands)
}

pub fn validation_report(scale: &GradingScale) -> serde_json::Value {
    match scale.validate() {
        Ok(v) => json!({
            "valid": true,
            "bands": bands_json(v.bands()),
            "violations": [],
            "uncovered": v.uncovered_ranges(),
        }),
        Err(e) => json!({
            "valid": false,
            "bands": bands_json(scale.bands()),
            "violations": e.to_json(),
            "uncovered": [],
        }),
    }
}

pub struct CommittedScale {
    pub scale: GradingScale,
    pub revision: Option<i64>,
    pub is_default: bool,
}

pub fn committed_scale(conn: &Connection) -> Result<CommittedScale, HandlerErr> {
    match db::load_grading_scale(conn) {
        Ok(Some(stored)) => Ok(CommittedScale {
            scale: stored.scale,
            revision: stored.revision,
            is_default: false,
        }),
        Ok(None) => Ok(CommittedScale {
            scale: grading::default_scale(),
            revision: None,
            is_default: true,
        }),
        Err(e) => Err(HandlerErr::new("db_query_failed", format!("{:#}", e))),
    }
}

pub fn validate_and_save(
    conn: &Connection,
    scale: &GradingScale,
) -> Result<(ValidatedScale, i64), HandlerErr> {
    let validated = scale
        .validate()
        .map_err(|e| HandlerErr::validation_failed(&e))?;
    let revision = db::save_grading_scale(conn, &validated)
        .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    Ok((validated, revision))
}

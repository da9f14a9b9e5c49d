use crate::log::Level;
use std::path::PathBuf;

pub const LOG_ENV: &str = "GRADINGD_LOG";
pub const WORKSPACE_ENV: &str = "GRADINGD_WORKSPACE";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub log_level: Level,
    pub workspace: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Level::Warn,
            workspace: None,
        }
    }
}

impl Config {
    pub fn from_env() -> (Self, Vec<String>) {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> (Self, Vec<String>)
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        let mut warnings = Vec::new();

        if let Some(raw) = lookup(LOG_ENV) {
            match Level::parse(&raw) {
                Some(level) => cfg.log_level = level,
                None => warnings.push(format!(
                    "{}={:?} is not one of error, warn, info, debug; using warn",
                    LOG_ENV, raw
                )),
            }
        }

        if let Some(raw) = lookup(WORKSPACE_ENV) {
            let t = raw.trim();
            if !t.is_empty() {
                cfg.workspace = Some(PathBuf::from(t));
            }
        }

        (cfg, warnings)
    }
}

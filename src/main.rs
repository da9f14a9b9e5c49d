use gradingd::{config, ipc, log};
use gradingd::{log_error, log_warn};
use std::io::{self, BufRead, Write};

fn main() {
    let (cfg, warnings) = config::Config::from_env();
    log::set_max_level(cfg.log_level);
    for w in warnings {
        log_warn!("{}", w);
    }

    let mut state = ipc::AppState::default();
    if let Some(path) = cfg.workspace.as_deref() {
        // A bad startup workspace must not stop the sidecar; the host can still select one.
        if let Err(e) = ipc::select_workspace(&mut state, path) {
            log_error!("could not open workspace {}: {:#}", path.display(), e);
        }
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                log_error!("stdin read failed: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // Can't reply without id; answer with an empty one.
                log_warn!("bad request line: {}", e);
                let _ = writeln!(
                    stdout,
                    "{}",
                    ipc::err("", "bad_json", e.to_string(), None)
                );
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
}

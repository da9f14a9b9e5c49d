use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_gradingd");
    let mut child = Command::new(exe)
        .env_remove("GRADINGD_WORKSPACE")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn gradingd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> Option<&str> {
    value.pointer("/error/code").and_then(|v| v.as_str())
}

fn band<'a>(result: &'a serde_json::Value, grade: &str) -> Option<&'a serde_json::Value> {
    result
        .get("bands")
        .and_then(|v| v.as_array())?
        .iter()
        .find(|b| b.get("grade").and_then(|g| g.as_str()) == Some(grade))
}

fn open_draft(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
) -> String {
    let opened = request_ok(stdin, reader, id, "gradingScale.draft.open", json!({}));
    opened
        .get("draftId")
        .and_then(|v| v.as_str())
        .expect("draftId")
        .to_string()
}

#[test]
fn draft_edit_commit_and_rejected_commit() {
    let workspace = temp_dir("gradingd-draft-lifecycle");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "gradingScale.save",
        json!({ "bands": [
            { "grade": "A", "min": 80, "max": 100, "points": 4.0 },
            { "grade": "B", "min": 70, "max": 79, "points": 3.0 },
            { "grade": "C", "min": 60, "max": 64, "points": 2.0 }
        ]}),
    );

    let hit = request_ok(&mut stdin, &mut reader, "3", "grading.gradeFor", json!({ "percentage": 75 }));
    assert_eq!(hit.pointer("/band/grade").and_then(|v| v.as_str()), Some("B"));
    let miss = request_ok(&mut stdin, &mut reader, "4", "grading.gradeFor", json!({ "percentage": 55 }));
    assert_eq!(miss.get("found").and_then(|v| v.as_bool()), Some(false));
    assert!(miss.get("band").map(|v| v.is_null()).unwrap_or(false));

    // Widening B down to 65 stays clear of C at 60..=64.
    let draft_id = open_draft(&mut stdin, &mut reader, "5");
    let edited = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "gradingScale.draft.updateBand",
        json!({ "draftId": draft_id, "grade": "B", "patch": { "min": 65 } }),
    );
    assert_eq!(
        band(&edited, "B").and_then(|b| b.get("minPercent")).and_then(|v| v.as_i64()),
        Some(65)
    );
    let committed = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "gradingScale.draft.commit",
        json!({ "draftId": draft_id }),
    );
    assert_eq!(committed.get("revision").and_then(|v| v.as_i64()), Some(2));
    let widened = request_ok(&mut stdin, &mut reader, "7a", "grading.gradeFor", json!({ "percentage": 67 }));
    assert_eq!(widened.pointer("/band/grade").and_then(|v| v.as_str()), Some("B"));
    let gone = request(
        &mut stdin,
        &mut reader,
        "8",
        "gradingScale.draft.get",
        json!({ "draftId": draft_id }),
    );
    assert_eq!(error_code(&gone), Some("not_found"));

    // Widening B down to 60 collides with C; the commit is refused as a whole.
    let draft_id = open_draft(&mut stdin, &mut reader, "9");
    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "gradingScale.draft.get",
        json!({ "draftId": draft_id }),
    );
    assert_eq!(opened.get("baseRevision").and_then(|v| v.as_i64()), Some(2));
    assert_eq!(
        band(&opened, "B").and_then(|b| b.get("minPercent")).and_then(|v| v.as_i64()),
        Some(65)
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "gradingScale.draft.updateBand",
        json!({ "draftId": draft_id, "grade": "B", "patch": { "minPercent": 60, "description": "Good" } }),
    );
    let rejected = request(
        &mut stdin,
        &mut reader,
        "12",
        "gradingScale.draft.commit",
        json!({ "draftId": draft_id }),
    );
    assert_eq!(error_code(&rejected), Some("validation_failed"));
    assert_eq!(
        rejected.pointer("/error/details/violations/0/code").and_then(|v| v.as_str()),
        Some("overlap")
    );
    assert_eq!(
        rejected.pointer("/error/details/violations/0/grades"),
        Some(&json!(["B", "C"]))
    );
    assert_eq!(
        rejected
            .pointer("/error/details/violations")
            .and_then(|v| v.as_array())
            .map(|a| a.len()),
        Some(1)
    );

    let committed_now = request_ok(&mut stdin, &mut reader, "13", "gradingScale.get", json!({}));
    assert_eq!(committed_now.get("revision").and_then(|v| v.as_i64()), Some(2));
    assert_eq!(
        band(&committed_now, "B").and_then(|b| b.get("minPercent")).and_then(|v| v.as_i64()),
        Some(65)
    );

    // The draft survives the rejection and can be corrected.
    let still_open = request_ok(
        &mut stdin,
        &mut reader,
        "14",
        "gradingScale.draft.validate",
        json!({ "draftId": draft_id }),
    );
    assert_eq!(still_open.get("valid").and_then(|v| v.as_bool()), Some(false));
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "15",
        "gradingScale.draft.removeBand",
        json!({ "draftId": draft_id, "grade": "C" }),
    );
    let fixed = request_ok(
        &mut stdin,
        &mut reader,
        "16",
        "gradingScale.draft.commit",
        json!({ "draftId": draft_id }),
    );
    assert_eq!(fixed.get("revision").and_then(|v| v.as_i64()), Some(3));
    assert_eq!(fixed.get("bands").and_then(|v| v.as_array()).map(|a| a.len()), Some(2));

    let low = request_ok(&mut stdin, &mut reader, "17", "grading.gradeFor", json!({ "percentage": 61 }));
    assert_eq!(low.pointer("/band/grade").and_then(|v| v.as_str()), Some("B"));
}

#[test]
fn widening_into_an_untouched_neighbour_is_refused() {
    let workspace = temp_dir("gradingd-draft-neighbour");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    // Built-in C covers 60..=69, so B at 65..=79 shares 65..=69 with it.
    let draft_id = open_draft(&mut stdin, &mut reader, "2");
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "gradingScale.draft.updateBand",
        json!({ "draftId": draft_id, "grade": "B", "patch": { "min": 65 } }),
    );
    let rejected = request(
        &mut stdin,
        &mut reader,
        "4",
        "gradingScale.draft.commit",
        json!({ "draftId": draft_id }),
    );
    assert_eq!(error_code(&rejected), Some("validation_failed"));
    assert_eq!(
        rejected.pointer("/error/details/violations/0/grades"),
        Some(&json!(["B", "C"]))
    );

    let scale = request_ok(&mut stdin, &mut reader, "5", "gradingScale.get", json!({}));
    assert_eq!(scale.get("isDefault").and_then(|v| v.as_bool()), Some(true));
}

#[test]
fn draft_edits_reject_unknown_and_duplicate_labels() {
    let workspace = temp_dir("gradingd-draft-edits");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "gradingScale.draft.open",
        json!({ "bands": [{ "grade": "P", "min": 50, "max": 100, "points": 1.0 }] }),
    );
    let draft_id = opened.get("draftId").and_then(|v| v.as_str()).expect("draftId").to_string();
    assert!(opened.get("baseRevision").map(|v| v.is_null()).unwrap_or(false));

    let dup = request(
        &mut stdin,
        &mut reader,
        "3",
        "gradingScale.draft.addBand",
        json!({ "draftId": draft_id, "band": { "grade": "P", "min": 0, "max": 49, "points": 0.0 } }),
    );
    assert_eq!(error_code(&dup), Some("edit_rejected"));
    assert_eq!(dup.pointer("/error/details/grade").and_then(|v| v.as_str()), Some("P"));

    let unknown = request(
        &mut stdin,
        &mut reader,
        "4",
        "gradingScale.draft.removeBand",
        json!({ "draftId": draft_id, "grade": "Z" }),
    );
    assert_eq!(error_code(&unknown), Some("edit_rejected"));

    let bad_patch = request(
        &mut stdin,
        &mut reader,
        "5",
        "gradingScale.draft.updateBand",
        json!({ "draftId": draft_id, "grade": "P", "patch": { "lowest": 3 } }),
    );
    assert_eq!(error_code(&bad_patch), Some("bad_params"));

    // A zero-width placeholder band is fine while editing.
    let added = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "gradingScale.draft.addBand",
        json!({ "draftId": draft_id, "band": { "grade": "F", "min": 0, "max": 0, "points": 0.0 } }),
    );
    assert_eq!(added.get("bands").and_then(|v| v.as_array()).map(|a| a.len()), Some(2));

    let renamed = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "gradingScale.draft.renameBand",
        json!({ "draftId": draft_id, "from": "P", "to": "Pass" }),
    );
    assert_eq!(
        band(&renamed, "Pass").and_then(|b| b.get("minPercent")).and_then(|v| v.as_i64()),
        Some(50)
    );
    assert!(band(&renamed, "P").is_none());

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "gradingScale.draft.updateBand",
        json!({ "draftId": draft_id, "grade": "F", "patch": { "max": 49, "description": "Fail" } }),
    );
    let report = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "gradingScale.draft.validate",
        json!({ "draftId": draft_id }),
    );
    assert_eq!(report.get("valid").and_then(|v| v.as_bool()), Some(true));

    let discarded = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "gradingScale.draft.discard",
        json!({ "draftId": draft_id }),
    );
    assert_eq!(discarded.get("discarded").and_then(|v| v.as_bool()), Some(true));

    // Nothing reached the store.
    let scale = request_ok(&mut stdin, &mut reader, "11", "gradingScale.get", json!({}));
    assert_eq!(scale.get("isDefault").and_then(|v| v.as_bool()), Some(true));

    let stale = request(
        &mut stdin,
        &mut reader,
        "12",
        "gradingScale.draft.commit",
        json!({ "draftId": draft_id }),
    );
    assert_eq!(error_code(&stale), Some("not_found"));
}

#[test]
fn draft_list_lets_a_host_recover_from_the_open_limit() {
    let workspace = temp_dir("gradingd-draft-limit");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "select",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let empty = request_ok(&mut stdin, &mut reader, "list0", "gradingScale.draft.list", json!({}));
    assert_eq!(empty.get("drafts").and_then(|v| v.as_array()).map(|a| a.len()), Some(0));
    let max = empty.get("max").and_then(|v| v.as_u64()).expect("max") as usize;

    let mut opened = Vec::new();
    for i in 0..max {
        opened.push(open_draft(&mut stdin, &mut reader, &format!("open{}", i)));
    }
    let refused = request(
        &mut stdin,
        &mut reader,
        "over",
        "gradingScale.draft.open",
        json!({}),
    );
    assert_eq!(error_code(&refused), Some("bad_params"));
    assert_eq!(
        refused.pointer("/error/details/open").and_then(|v| v.as_u64()),
        Some(max as u64)
    );

    let listed = request_ok(&mut stdin, &mut reader, "list1", "gradingScale.draft.list", json!({}));
    let listed = listed.get("drafts").and_then(|v| v.as_array()).cloned().expect("drafts");
    assert_eq!(listed.len(), max);
    assert_eq!(
        listed[0].get("bandCount").and_then(|v| v.as_u64()),
        Some(5)
    );
    let mut ids: Vec<String> = listed
        .iter()
        .filter_map(|d| d.get("draftId").and_then(|v| v.as_str()).map(str::to_string))
        .collect();
    ids.sort();
    opened.sort();
    assert_eq!(ids, opened);

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "discard",
        "gradingScale.draft.discard",
        json!({ "draftId": opened[0] }),
    );
    let again = open_draft(&mut stdin, &mut reader, "reopen");
    assert!(!again.is_empty());
}

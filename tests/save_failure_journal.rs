use httpmock::prelude::*;
use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

fn spawn_sidecar(endpoint: &str) -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_gradesheetd");
    let mut child = Command::new(exe)
        .env("GRADESHEETD_ENDPOINT", endpoint)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn gradesheetd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn send(
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
    let value = send(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown error")
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn mock_two_rows(server: &MockServer) {
    server.mock(|when, then| {
        when.method(GET).path("/exec").query_param("sheet", "MAPEL101");
        then.status(200).json_body(json!([
            { "Data1": "No", "Data3": "Nama", "Data5": "TP1" },
            { "Data1": 1, "Data3": "Ani", "Data5": "80" },
            { "Data1": 2, "Data3": "Budi", "Data5": "75" }
        ]));
    });
}

fn select_workspace(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    path: &Path,
) -> serde_json::Value {
    request_ok(
        stdin,
        reader,
        "ws",
        "workspace.select",
        json!({ "path": path.to_string_lossy() }),
    )
}

#[test]
fn failed_save_keeps_rows_and_retry_resubmits_them() {
    let workspace = tempfile::tempdir().expect("tempdir");
    let server = MockServer::start();
    mock_two_rows(&server);
    let mut failing = server.mock(|when, then| {
        when.method(POST).path("/exec");
        then.status(500).body("Service invoked too many times");
    });

    let (mut child, mut stdin, mut reader) = spawn_sidecar(&server.url("/exec"));
    let _ = select_workspace(&mut stdin, &mut reader, workspace.path());
    let _ = request_ok(&mut stdin, &mut reader, "1", "grid.load", json!({ "sheet": "MAPEL101" }));
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "grid.editCell",
        json!({ "row": 0, "columnId": "Data5", "value": "60" }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "grid.editCell",
        json!({ "row": 1, "columnId": "Data5", "value": "61" }),
    );

    let failed = send(&mut stdin, &mut reader, "4", "grid.saveAll", json!({}));
    assert_eq!(failed["ok"], json!(false));
    assert_eq!(failed["error"]["code"], json!("network_error"));
    let message = failed["error"]["message"].as_str().unwrap_or("");
    assert!(message.contains("too many times"), "message: {}", message);
    assert_eq!(failed["error"]["details"]["rows"], json!(2));

    let state = request_ok(&mut stdin, &mut reader, "5", "grid.state", json!({}));
    assert_eq!(state["changedRows"], json!([0, 1]));
    assert_eq!(state["saving"], json!(false));

    failing.delete();
    let ok_save = server.mock(|when, then| {
        when.method(POST).path("/exec");
        then.status(200).body("Success");
    });
    let saved = request_ok(&mut stdin, &mut reader, "6", "grid.saveAll", json!({}));
    assert_eq!(saved["outcome"], json!("saved"));
    assert_eq!(saved["updated"], json!(2));
    ok_save.assert_calls(1);

    let journal = request_ok(&mut stdin, &mut reader, "7", "journal.list", json!({ "limit": 10 }));
    let entries = journal["entries"].as_array().expect("entries");
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["outcome"], json!("saved"));
    assert_eq!(entries[1]["outcome"], json!("failed"));
    assert_eq!(entries[1]["rowCount"], json!(2));
    assert_eq!(entries[1]["sheet"], json!("MAPEL101"));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn per_row_rejections_stay_changed() {
    let server = MockServer::start();
    mock_two_rows(&server);
    server.mock(|when, then| {
        when.method(POST).path("/exec");
        then.status(200).json_body(json!({
            "status": "success",
            "results": [
                { "rowIndex": 2, "ok": true },
                { "rowIndex": 3, "ok": false, "message": "protected range" }
            ]
        }));
    });

    let (mut child, mut stdin, mut reader) = spawn_sidecar(&server.url("/exec"));
    let _ = request_ok(&mut stdin, &mut reader, "1", "grid.load", json!({ "sheet": "MAPEL101" }));
    for (i, row) in [0, 1].iter().enumerate() {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("e{}", i),
            "grid.editCell",
            json!({ "row": row, "columnId": "Data5", "value": "99" }),
        );
    }
    let saved = request_ok(&mut stdin, &mut reader, "2", "grid.saveAll", json!({}));
    assert_eq!(saved["outcome"], json!("partial"));
    assert_eq!(saved["savedRows"], json!([0]));
    assert_eq!(saved["rejected"][0]["rowIndex"], json!(3));
    assert_eq!(saved["changedRows"], json!([1]));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn row_offset_setting_persists_with_workspace() {
    let workspace = tempfile::tempdir().expect("tempdir");
    let server = MockServer::start();
    mock_two_rows(&server);
    let save = server.mock(|when, then| {
        when.method(POST)
            .path("/exec")
            .body_includes("\"rowIndex\":4");
        then.status(200).body("Success");
    });

    {
        let (mut child, mut stdin, mut reader) = spawn_sidecar(&server.url("/exec"));
        let _ = select_workspace(&mut stdin, &mut reader, workspace.path());
        let bad = send(
            &mut stdin,
            &mut reader,
            "1",
            "setup.update",
            json!({ "section": "store", "patch": { "headerRowOffset": 4 } }),
        );
        assert_eq!(bad["error"]["code"], json!("bad_params"));
        let updated = request_ok(
            &mut stdin,
            &mut reader,
            "2",
            "setup.update",
            json!({ "section": "store", "patch": { "sheetOffsets": { "MAPEL101": 3 } } }),
        );
        assert_eq!(updated["persisted"], json!(true));
        drop(stdin);
        let _ = child.wait();
    }

    let (mut child, mut stdin, mut reader) = spawn_sidecar(&server.url("/exec"));
    let _ = select_workspace(&mut stdin, &mut reader, workspace.path());
    let setup = request_ok(&mut stdin, &mut reader, "1", "setup.get", json!({}));
    assert_eq!(setup["store"]["sheetOffsets"]["MAPEL101"], json!(3));
    assert_eq!(setup["store"]["headerRowOffset"], json!(2));

    let loaded = request_ok(&mut stdin, &mut reader, "2", "grid.load", json!({ "sheet": "MAPEL101" }));
    assert_eq!(loaded["rowOffset"], json!(3));
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "grid.editCell",
        json!({ "row": 1, "columnId": "Data5", "value": "50" }),
    );
    let saved = request_ok(&mut stdin, &mut reader, "4", "grid.saveAll", json!({}));
    assert_eq!(saved["rowOffset"], json!(3));
    save.assert_calls(1);

    drop(stdin);
    let _ = child.wait();
}

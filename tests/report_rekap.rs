use httpmock::prelude::*;
use serde_json::json;
use std::io::{BufRead, BufReader, Write};
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

fn student(nis: &str, name: &str, score: serde_json::Value, best: &str, weak: &str) -> serde_json::Value {
    json!({
        "Data2": nis,
        "Data3": name,
        "Data22": score,
        "Data24": best,
        "Data25": weak,
    })
}

/// Two 7A subjects that load fine, one 7B subject whose fetch fails.
fn mock_school(server: &MockServer) {
    server.mock(|when, then| {
        when.method(GET).path("/exec").query_param("action", "listSheets");
        then.status(200).json_body(json!([
            { "sheetName": "MTK7A", "mapel": "Matematika", "semester": "1", "kelas": "7A" },
            { "sheetName": "IPA7A", "mapel": "IPA", "semester": "1", "kelas": "7A" },
            { "sheetName": "MTK7B", "mapel": "Matematika", "semester": "1", "kelas": "7B" }
        ]));
    });
    server.mock(|when, then| {
        when.method(GET).path("/exec").query_param("sheet", "MTK7A");
        then.status(200).json_body(json!([
            { "Data3": "Nama", "Data22": "Nilai" },
            student("1001", "Ani", json!(80), "TP1", "TP2"),
            student("1002", "Budi", json!("70,5"), "", ""),
            student("", "", json!(99), "", "")
        ]));
    });
    server.mock(|when, then| {
        when.method(GET).path("/exec").query_param("sheet", "IPA7A");
        then.status(200).json_body(json!([
            { "Data3": "Nama", "Data22": "Nilai" },
            student("1002", "Budi", json!(""), "", ""),
            student("1001", "Ani", json!(91), "", "")
        ]));
    });
    server.mock(|when, then| {
        when.method(GET).path("/exec").query_param("sheet", "MTK7B");
        then.status(500).body("Exceeded maximum execution time");
    });
}

#[test]
fn rekap_groups_students_across_subjects() {
    let server = MockServer::start();
    mock_school(&server);
    let (mut child, mut stdin, mut reader) = spawn_sidecar(&server.url("/exec"));

    let rekap = request_ok(&mut stdin, &mut reader, "1", "report.rekap", json!({ "kelas": "7A" }));
    assert_eq!(rekap["subjects"], json!(["Matematika", "IPA"]));
    let students = rekap["students"].as_array().expect("students");
    assert_eq!(students.len(), 2);

    assert_eq!(students[0]["name"], json!("Ani"));
    assert_eq!(students[0]["nis"], json!("1001"));
    assert_eq!(students[0]["mean"], json!(85.5));

    assert_eq!(students[1]["name"], json!("Budi"));
    assert_eq!(students[1]["scores"][0]["score"], json!(70.5));
    assert_eq!(students[1]["scores"][1]["score"], json!(null));
    assert_eq!(students[1]["mean"], json!(70.5));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn any_failed_sheet_fails_the_whole_rekap() {
    let server = MockServer::start();
    mock_school(&server);
    let (mut child, mut stdin, mut reader) = spawn_sidecar(&server.url("/exec"));

    let failed = send(&mut stdin, &mut reader, "1", "report.rekap", json!({}));
    assert_eq!(failed["ok"], json!(false));
    assert_eq!(failed["error"]["code"], json!("network_error"));
    assert!(failed.get("result").is_none());

    let none = send(&mut stdin, &mut reader, "2", "report.rekap", json!({ "kelas": "9Z" }));
    assert_eq!(none["error"]["code"], json!("no_data"));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn documents_survive_narrative_lookup_failure() {
    let server = MockServer::start();
    mock_school(&server);
    server.mock(|when, then| {
        when.method(GET).path("/exec").query_param("sheet", "DataTP");
        then.status(503).body("unavailable");
    });
    let (mut child, mut stdin, mut reader) = spawn_sidecar(&server.url("/exec"));

    let docs = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "report.studentDocuments",
        json!({ "kelas": "7A", "student": "Ani" }),
    );
    let documents = docs["documents"].as_array().expect("documents");
    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0]["student"], json!("Ani"));
    assert_eq!(documents[0]["pageCount"], json!(1));
    let warnings = docs["warnings"].as_array().expect("warnings");
    assert_eq!(warnings.len(), 1);

    let blocks = documents[0]["pages"][0]["blocks"].as_array().expect("blocks");
    assert!(blocks.iter().any(|b| b["type"] == json!("scoreTable")));
    assert!(blocks.iter().all(|b| b["type"] != json!("narrative")));

    let missing = send(
        &mut stdin,
        &mut reader,
        "2",
        "report.studentDocuments",
        json!({ "kelas": "7A", "student": "Zed" }),
    );
    assert_eq!(missing["error"]["code"], json!("not_found"));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn documents_include_narratives_when_lookups_succeed() {
    let server = MockServer::start();
    mock_school(&server);
    server.mock(|when, then| {
        when.method(GET)
            .path("/exec")
            .query_param("sheet", "DataTP")
            .query_param("tp", "TP1");
        then.status(200).json_body(json!({
            "mapel": "Matematika", "tp": "TP1", "bab": "1",
            "semester": "1", "kelas": "7", "rincian": "Operasi bilangan bulat"
        }));
    });
    server.mock(|when, then| {
        when.method(GET)
            .path("/exec")
            .query_param("sheet", "DataTP")
            .query_param("tp", "TP2");
        then.status(200).json_body(json!({ "error": "TP not found" }));
    });
    let (mut child, mut stdin, mut reader) = spawn_sidecar(&server.url("/exec"));

    let docs = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "report.studentDocuments",
        json!({ "kelas": "7A", "student": "Ani" }),
    );
    assert_eq!(docs["warnings"], json!([]));
    let blocks = docs["documents"][0]["pages"][0]["blocks"]
        .as_array()
        .expect("blocks");
    let narrative = blocks
        .iter()
        .find(|b| b["type"] == json!("narrative"))
        .expect("narrative block");
    assert_eq!(narrative["entries"][0]["mapel"], json!("Matematika"));
    assert_eq!(
        narrative["entries"][0]["strength"],
        json!("Operasi bilangan bulat")
    );
    assert_eq!(narrative["entries"][0]["improvement"], json!(null));

    drop(stdin);
    let _ = child.wait();
}

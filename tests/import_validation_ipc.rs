use rust_xlsxwriter::Workbook;
use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

const HEADERS: [&str; 6] = [
    "student_id",
    "student_name",
    "grade_name",
    "class_name",
    "phone",
    "email",
];

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
    let exe = env!("CARGO_BIN_EXE_rosterd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn rosterd");
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

fn error_code(resp: &serde_json::Value) -> &str {
    assert_eq!(resp.get("ok"), Some(&json!(false)), "expected error: {}", resp);
    resp["error"]["code"].as_str().expect("error code")
}

fn write_roster(path: &Path, rows: &[[&str; 6]]) {
    let mut wb = Workbook::new();
    let ws = wb.add_worksheet();
    for (c, h) in HEADERS.iter().enumerate() {
        ws.write(0, c as u16, *h).expect("write header");
    }
    for (r, row) in rows.iter().enumerate() {
        for (c, cell) in row.iter().enumerate() {
            ws.write((r + 1) as u32, c as u16, *cell).expect("write cell");
        }
    }
    wb.save(path).expect("save workbook");
}

fn select_workspace(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    workspace: &Path,
) {
    let resp = request(
        stdin,
        reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert_eq!(resp.get("ok"), Some(&json!(true)), "select failed: {}", resp);
}

fn list_count(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>) -> usize {
    let resp = request(stdin, reader, "list", "students.list", json!({}));
    assert_eq!(resp.get("ok"), Some(&json!(true)), "list failed: {}", resp);
    resp["result"]["students"]
        .as_array()
        .map(|a| a.len())
        .expect("students array")
}

#[test]
fn one_bad_row_refuses_the_whole_batch() {
    let workspace = temp_dir("rosterd-val-gate");
    let sheet = workspace.join("roster.xlsx");
    write_roster(
        &sheet,
        &[
            ["A123", "Jane Doe", "10", "A", "123456789", "jane@example.com"],
            ["B456", "John Roe", "10", "A", "12345", "john@example.com"],
            ["C789", "Mary Major", "10", "B", "555123456", "mary@example.com"],
        ],
    );

    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);

    let resp = request(
        &mut stdin,
        &mut reader,
        "1",
        "roster.import",
        json!({ "path": sheet.to_string_lossy() }),
    );
    assert_eq!(error_code(&resp), "validation_failed");

    let rejections = resp["error"]["details"]["errors"]
        .as_array()
        .cloned()
        .expect("rejection list");
    assert_eq!(rejections.len(), 1);
    assert_eq!(rejections[0]["row"], json!(2));
    assert_eq!(rejections[0]["data"]["student_id"], json!("B456"));
    let messages = rejections[0]["errors"].as_array().expect("messages");
    assert_eq!(messages.len(), 1);
    assert!(messages[0]
        .as_str()
        .expect("message text")
        .starts_with("Invalid phone number: 12345."));

    // Refused batch means zero writes.
    assert_eq!(list_count(&mut stdin, &mut reader), 0);
}

#[test]
fn intra_batch_duplicate_ids_import_nothing() {
    let workspace = temp_dir("rosterd-val-dup");
    let sheet = workspace.join("roster.xlsx");
    write_roster(
        &sheet,
        &[
            ["A123", "Jane Doe", "10", "A", "123456789", "jane@example.com"],
            ["A123", "John Roe", "10", "B", "987654321", "john@example.com"],
        ],
    );

    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);

    let resp = request(
        &mut stdin,
        &mut reader,
        "1",
        "roster.import",
        json!({ "path": sheet.to_string_lossy() }),
    );
    assert_eq!(error_code(&resp), "duplicate_student_id");
    assert_eq!(list_count(&mut stdin, &mut reader), 0);
}

#[test]
fn import_colliding_with_stored_record_leaves_store_unchanged() {
    let workspace = temp_dir("rosterd-val-collide");
    let first = workspace.join("first.xlsx");
    let second = workspace.join("second.xlsx");
    write_roster(
        &first,
        &[["A123", "Jane Doe", "10", "A", "123456789", "jane@example.com"]],
    );
    write_roster(
        &second,
        &[
            ["B456", "John Roe", "10", "A", "987654321", "john@example.com"],
            ["A123", "Jane Again", "11", "C", "111222333", "jane2@example.com"],
        ],
    );

    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);

    let resp = request(
        &mut stdin,
        &mut reader,
        "1",
        "roster.import",
        json!({ "path": first.to_string_lossy() }),
    );
    assert_eq!(resp.get("ok"), Some(&json!(true)), "first import: {}", resp);
    assert_eq!(list_count(&mut stdin, &mut reader), 1);

    let resp = request(
        &mut stdin,
        &mut reader,
        "2",
        "roster.import",
        json!({ "path": second.to_string_lossy() }),
    );
    assert_eq!(error_code(&resp), "duplicate_student_id");
    // The failed batch is all-or-nothing: B456 must not have landed either.
    assert_eq!(list_count(&mut stdin, &mut reader), 1);
}

#[test]
fn headers_only_sheet_is_an_empty_import() {
    let workspace = temp_dir("rosterd-val-empty");
    let sheet = workspace.join("roster.xlsx");
    write_roster(&sheet, &[]);

    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);

    let resp = request(
        &mut stdin,
        &mut reader,
        "1",
        "roster.import",
        json!({ "path": sheet.to_string_lossy() }),
    );
    assert_eq!(error_code(&resp), "empty_import");
}

#[test]
fn unparseable_file_fails_before_any_classification() {
    let workspace = temp_dir("rosterd-val-junk");
    let sheet = workspace.join("roster.xlsx");
    std::fs::write(&sheet, b"definitely not a spreadsheet").expect("write junk");

    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);

    let resp = request(
        &mut stdin,
        &mut reader,
        "1",
        "roster.import",
        json!({ "path": sheet.to_string_lossy() }),
    );
    assert_eq!(error_code(&resp), "sheet_parse_failed");
    assert_eq!(list_count(&mut stdin, &mut reader), 0);
}

#[test]
fn import_without_workspace_is_refused() {
    let workspace = temp_dir("rosterd-val-nows");
    let sheet = workspace.join("roster.xlsx");
    write_roster(
        &sheet,
        &[["A123", "Jane Doe", "10", "A", "123456789", "jane@example.com"]],
    );

    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let resp = request(
        &mut stdin,
        &mut reader,
        "1",
        "roster.import",
        json!({ "path": sheet.to_string_lossy() }),
    );
    assert_eq!(error_code(&resp), "no_workspace");
}

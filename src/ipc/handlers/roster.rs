use crate::db::{self, StoreError};
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::roster::{classify_rows, summarize, validate_student, Rejection};
use crate::sheet;
use serde_json::json;
use std::path::PathBuf;

// A file that cannot be parsed is reported before any row is looked at;
// a half-processed spreadsheet never exists.
fn parse_rows(req: &Request) -> Result<Vec<serde_json::Value>, serde_json::Value> {
    let Some(path) = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from)
    else {
        return Err(err(&req.id, "bad_params", "missing params.path", None));
    };

    sheet::read_rows(&path).map_err(|e| {
        err(
            &req.id,
            "sheet_parse_failed",
            e.to_string(),
            Some(json!({ "path": path.to_string_lossy() })),
        )
    })
}

/// Read-only half of the upload screen: every row cleaned and flagged, the
/// full rejection list, and the grade-by-class summary of the rows that
/// would be imported. Works without a workspace since nothing is written.
fn handle_roster_preview(_state: &mut AppState, req: &Request) -> serde_json::Value {
    let rows = match parse_rows(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let mut preview = Vec::new();
    let mut rejections: Vec<Rejection> = Vec::new();
    let mut accepted = Vec::new();

    for (i, row) in rows.iter().enumerate() {
        let v = validate_student(row);
        let has_error = !v.is_valid();

        let mut cleaned = serde_json::to_value(&v.cleaned).unwrap_or_else(|_| json!({}));
        cleaned["hasError"] = json!(has_error);
        preview.push(cleaned);

        if has_error {
            rejections.push(Rejection {
                row: i + 1,
                data: row.clone(),
                errors: v.errors,
            });
        } else {
            accepted.push(v.cleaned);
        }
    }

    ok(
        &req.id,
        json!({
            "rows": preview,
            "errors": rejections,
            "summary": summarize(&accepted)
        }),
    )
}

/// All-or-nothing import. Any rejected row refuses the whole batch with the
/// complete rejection list; an empty batch is its own condition; otherwise
/// every accepted record goes into the store in a single transaction.
fn handle_roster_import(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let rows = match parse_rows(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let (accepted, rejected) = classify_rows(&rows);
    if !rejected.is_empty() {
        return err(
            &req.id,
            "validation_failed",
            "validation errors found in uploaded data",
            Some(json!({ "errors": rejected })),
        );
    }
    if accepted.is_empty() {
        return err(&req.id, "empty_import", "no student rows to import", None);
    }

    match db::insert_many(conn, &accepted) {
        Ok(()) => ok(
            &req.id,
            json!({
                "imported": accepted.len(),
                "summary": summarize(&accepted)
            }),
        ),
        Err(StoreError::DuplicateKey) => err(
            &req.id,
            "duplicate_student_id",
            "Duplicate student_id found. Please ensure all student IDs are unique.",
            None,
        ),
        Err(e) => err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "students" })),
        ),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "roster.preview" => Some(handle_roster_preview(state, req)),
        "roster.import" => Some(handle_roster_import(state, req)),
        _ => None,
    }
}

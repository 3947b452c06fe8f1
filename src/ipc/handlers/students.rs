use crate::db::{self, StoreError};
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::roster::validate_student;
use serde_json::json;

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    match db::select_all(conn) {
        Ok(rows) => {
            let students: Vec<_> = rows
                .into_iter()
                .map(|(id, r)| {
                    let mut v = serde_json::to_value(&r).unwrap_or_else(|_| json!({}));
                    v["id"] = json!(id);
                    v
                })
                .collect();
            ok(&req.id, json!({ "students": students }))
        }
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

/// Dry-run validation for the edit form and the upload preview; the same
/// rule set the import runs, with no store involvement at all.
fn handle_students_validate(_state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(payload) = req.params.get("student") else {
        return err(&req.id, "bad_params", "missing params.student", None);
    };

    let v = validate_student(payload);
    ok(
        &req.id,
        json!({ "cleanedData": v.cleaned, "errors": v.errors }),
    )
}

fn handle_students_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let id = match req.params.get("id").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing id", None),
    };
    let Some(payload) = req.params.get("student") else {
        return err(&req.id, "bad_params", "missing params.student", None);
    };

    // Editing never bypasses validation.
    let v = validate_student(payload);
    if !v.is_valid() {
        return err(
            &req.id,
            "validation_failed",
            "validation errors in update data",
            Some(json!({ "errors": v.errors })),
        );
    }

    match db::update_student(conn, &id, &v.cleaned) {
        Ok(0) => err(&req.id, "not_found", "student not found", None),
        Ok(_) => ok(&req.id, json!({ "id": id })),
        Err(StoreError::DuplicateKey) => err(
            &req.id,
            "duplicate_student_id",
            "Duplicate student_id found. Please ensure the student ID is unique.",
            None,
        ),
        Err(e) => err(&req.id, "db_update_failed", e.to_string(), None),
    }
}

fn handle_students_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let id = match req.params.get("id").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing id", None),
    };

    match db::delete_student(conn, &id) {
        Ok(0) => err(&req.id, "not_found", "student not found", None),
        Ok(_) => ok(&req.id, json!({ "deleted": true })),
        Err(e) => err(&req.id, "db_delete_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_students_list(state, req)),
        "students.validate" => Some(handle_students_validate(state, req)),
        "students.update" => Some(handle_students_update(state, req)),
        "students.delete" => Some(handle_students_delete(state, req)),
        _ => None,
    }
}

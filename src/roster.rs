use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use validator::ValidateEmail;

static STUDENT_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9]+$").unwrap());
static PHONE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{9}$").unwrap());
// Grade and class names require at least one character; a blank cell rejects
// the row just like any other character-class violation.
static GROUP_NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9\s]+$").unwrap());

/// One validated student, field values trimmed. Only records with zero
/// violations are ever handed to the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentRecord {
    pub student_id: String,
    pub student_name: String,
    pub grade_name: String,
    pub class_name: String,
    pub phone: String,
    pub email: String,
}

/// Cleaned copy of the six fields plus every violation found, in rule order.
#[derive(Debug, Clone)]
pub struct Validation {
    pub cleaned: StudentRecord,
    pub errors: Vec<String>,
}

impl Validation {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// One refused import row: 1-based position in the sheet, the row as read,
/// and the violation messages.
#[derive(Debug, Clone, Serialize)]
pub struct Rejection {
    pub row: usize,
    pub data: Value,
    pub errors: Vec<String>,
}

/// Stringifies one cell of the raw field bag. Spreadsheet parsers hand
/// whole numbers over as floats, so 123456789.0 must come out as
/// "123456789" before the phone pattern sees it.
fn field_text(raw: &Value, key: &str) -> String {
    let s = match raw.get(key) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => {
            if let Some(i) = n.as_i64() {
                i.to_string()
            } else if let Some(f) = n.as_f64() {
                if f.fract() == 0.0 && f.abs() < 9_007_199_254_740_992.0 {
                    format!("{}", f as i64)
                } else {
                    f.to_string()
                }
            } else {
                n.to_string()
            }
        }
        Some(Value::Bool(b)) => b.to_string(),
        Some(other) => other.to_string(),
    };
    s.trim().to_string()
}

/// Validates one raw field bag. Every rule is evaluated, nothing
/// short-circuits, and the messages keep the exact wording the UI renders.
/// Deterministic, no I/O.
pub fn validate_student(raw: &Value) -> Validation {
    let cleaned = StudentRecord {
        student_id: field_text(raw, "student_id"),
        student_name: field_text(raw, "student_name"),
        grade_name: field_text(raw, "grade_name"),
        class_name: field_text(raw, "class_name"),
        phone: field_text(raw, "phone"),
        email: field_text(raw, "email"),
    };

    let mut errors = Vec::new();

    if !STUDENT_ID_RE.is_match(&cleaned.student_id) {
        errors.push(format!(
            "Invalid student_id: {}. Only alphanumeric characters are allowed.",
            cleaned.student_id
        ));
    }
    if cleaned.student_name.is_empty() {
        errors.push("Student name is required.".to_string());
    }
    if !PHONE_RE.is_match(&cleaned.phone) {
        errors.push(format!(
            "Invalid phone number: {}. Must be a 9-digit number.",
            cleaned.phone
        ));
    }
    if !GROUP_NAME_RE.is_match(&cleaned.grade_name) {
        errors.push(format!(
            "Invalid grade_name: {}. Only alphanumeric characters and spaces are allowed.",
            cleaned.grade_name
        ));
    }
    if !GROUP_NAME_RE.is_match(&cleaned.class_name) {
        errors.push(format!(
            "Invalid class_name: {}. Only alphanumeric characters and spaces are allowed.",
            cleaned.class_name
        ));
    }
    if !cleaned.email.validate_email() {
        errors.push(format!("Invalid email: {}.", cleaned.email));
    }

    Validation { cleaned, errors }
}

/// Splits a parsed sheet into accepted records and rejections. Row positions
/// are 1-based over the data rows; extra columns in the source are ignored
/// because the validator only reads the six recognized fields.
pub fn classify_rows(rows: &[Value]) -> (Vec<StudentRecord>, Vec<Rejection>) {
    let mut accepted = Vec::new();
    let mut rejected = Vec::new();

    for (i, row) in rows.iter().enumerate() {
        let v = validate_student(row);
        if v.is_valid() {
            accepted.push(v.cleaned);
        } else {
            rejected.push(Rejection {
                row: i + 1,
                data: row.clone(),
                errors: v.errors,
            });
        }
    }

    (accepted, rejected)
}

/// Occurrence counts per grade, then class, over accepted records only.
/// Keys are the cleaned names, so spellings differing only in surrounding
/// whitespace share a bucket while case differences stay apart.
pub fn summarize(records: &[StudentRecord]) -> BTreeMap<String, BTreeMap<String, i64>> {
    let mut summary: BTreeMap<String, BTreeMap<String, i64>> = BTreeMap::new();
    for r in records {
        *summary
            .entry(r.grade_name.clone())
            .or_default()
            .entry(r.class_name.clone())
            .or_insert(0) += 1;
    }
    summary
}

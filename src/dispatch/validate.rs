//! Input field validation and role authorization.

use crate::dispatch::params::RequestParams;
use crate::dispatch::routes::FieldType;
use std::collections::HashMap;

/// A failed validation, reported to the client as a 200 response with an
/// `INVALID` status body. The description is an i18n token resolved on the
/// client side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    pub id: String,
    pub description: String,
}

impl ValidationFailure {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self { id: id.into(), description: description.into() }
    }

    /// JSON payload for the client.
    pub fn to_json(&self) -> String {
        format!(
            r#"{{"status": "INVALID", "validation": {{"id": "{}", "description": "{}"}}}}"#,
            self.id, self.description
        )
    }
}

/// Check declared fields against the request parameters, storing validated
/// (and, for strings, escaped) values back into `params`.
pub fn validate_params(
    params: &mut RequestParams,
    request_values: &HashMap<String, String>,
) -> Option<ValidationFailure> {
    for p in params.iter_mut() {
        let mut value = request_values
            .get(&p.spec.name)
            .map(|v| v.trim().to_string())
            .unwrap_or_default();

        if p.spec.required && value.is_empty() {
            return Some(ValidationFailure::new(&p.spec.name, "$err.required"));
        }

        if !value.is_empty() {
            let ok = match p.spec.ftype {
                FieldType::Integer => is_integer(&value),
                FieldType::Double => is_double(&value),
                FieldType::Date => is_date(&value),
                FieldType::String => {
                    value = escape(&value);
                    true
                }
            };
            if !ok {
                return Some(ValidationFailure::new(&p.spec.name, "$err.invalidtype"));
            }
        }

        p.value = value;
    }
    None
}

/// Substring role match: the session's role string must contain at least
/// one of the authorized role names.
pub fn is_user_in_role(authorized_roles: &[String], user_roles: &str) -> bool {
    if user_roles.is_empty() {
        return false;
    }
    authorized_roles.iter().any(|r| user_roles.contains(r.as_str()))
}

/// Escape a string value for template substitution: double single quotes,
/// strip backslashes.
fn escape(value: &str) -> String {
    value.replace('\'', "''").replace('\\', "")
}

fn is_integer(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii_digit())
}

fn is_double(s: &str) -> bool {
    match s.split_once('.') {
        Some((whole, frac)) => is_integer(whole) && is_integer(frac),
        None => is_integer(s),
    }
}

/// Calendar-valid `YYYY-MM-DD`, including leap-year rules.
fn is_date(value: &str) -> bool {
    if value.len() != 10 || value.as_bytes()[4] != b'-' || value.as_bytes()[7] != b'-' {
        return false;
    }
    let (sy, sm, sd) = (&value[0..4], &value[5..7], &value[8..10]);
    if !is_integer(sy) || !is_integer(sm) || !is_integer(sd) {
        return false;
    }
    let y: i32 = sy.parse().unwrap_or(0);
    let m: u32 = sm.parse().unwrap_or(0);
    let d: u32 = sd.parse().unwrap_or(0);

    if !(1..=12).contains(&m) || !(1..=31).contains(&d) {
        return false;
    }
    if d == 31 && matches!(m, 2 | 4 | 6 | 9 | 11) {
        return false;
    }
    if d == 30 && m == 2 {
        return false;
    }
    if m == 2 && d == 29 {
        let leap = (y % 4 == 0 && y % 100 != 0) || y % 400 == 0;
        return leap;
    }
    true
}

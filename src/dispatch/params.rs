//! Validated request parameters and template substitution.
//!
//! Values substituted into SQL templates follow the contract enforced by
//! validation: string and date values are single-quoted (with quote
//! doubling already applied), integer and double values go in raw after
//! the digit-only type check, and empty values become `NULL`. Audit and
//! mail-body templates substitute raw values.

use crate::dispatch::routes::{FieldSpec, FieldType};

#[derive(Debug, Clone)]
pub struct Param {
    pub spec: FieldSpec,
    pub value: String,
}

/// The per-request set of declared parameters with their validated values.
#[derive(Debug, Clone, Default)]
pub struct RequestParams {
    params: Vec<Param>,
}

impl RequestParams {
    pub fn new(fields: &[FieldSpec]) -> Self {
        Self {
            params: fields
                .iter()
                .map(|spec| Param { spec: spec.clone(), value: String::new() })
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|p| p.spec.name == name)
            .map(|p| p.value.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Param> {
        self.params.iter_mut()
    }

    /// Substitute validated values into a SQL template.
    pub fn sql(&self, template: &str, userlogin: &str) -> String {
        let mut sql = template.replacen("$userlogin", &format!("'{userlogin}'"), 1);
        for p in &self.params {
            let name = format!("${}", p.spec.name);
            let replacement = if p.value.is_empty() {
                "NULL".to_string()
            } else {
                match p.spec.ftype {
                    // numeric values go in raw, guarded only by the type check
                    FieldType::Integer | FieldType::Double => p.value.clone(),
                    _ => format!("'{}'", p.value),
                }
            };
            sql = sql.replace(&name, &replacement);
        }
        sql
    }

    /// Substitute values into an audit record template.
    pub fn audit_message(&self, template: &str) -> String {
        let mut record = template.to_string();
        for p in &self.params {
            let name = format!("${}", p.spec.name);
            let replacement = if p.value.is_empty() { "NULL" } else { p.value.as_str() };
            record = record.replace(&name, replacement);
        }
        record
    }

    /// Substitute values into a mail body or attachment template.
    pub fn mail_body(&self, template: &str, userlogin: &str) -> String {
        let mut body = template.replacen("$userlogin", userlogin, 1);
        for p in &self.params {
            let name = format!("${}", p.spec.name);
            body = body.replace(&name, &p.value);
        }
        body
    }
}

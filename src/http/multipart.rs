//! multipart/form-data decoder.
//!
//! Splits a POST body on `--boundary` markers. Text parts become plain
//! name→value parameters; file parts are persisted through the blob
//! collaborator and surfaced as the synthetic parameters `document`,
//! `content_len`, `content_type` and `filename` so the dispatch engine can
//! reference uploads uniformly. Malformed structure never panics; part
//! extraction simply stops at end of input.

use crate::backend::BlobStore;
use std::collections::HashMap;
use uuid::Uuid;

/// One decoded part of a multipart body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormField {
    pub name: String,
    /// Empty for plain text fields.
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

impl FormField {
    pub fn is_file(&self) -> bool {
        !self.filename.is_empty()
    }
}

/// Decode `body` using the boundary extracted from the content-type header.
pub fn parse(body: &[u8], boundary: &str) -> Vec<FormField> {
    let marker = format!("--{boundary}").into_bytes();
    let end_marker = format!("--{boundary}--").into_bytes();

    let lines: Vec<&[u8]> = body.split(|&b| b == b'\n').collect();
    let mut fields = Vec::new();

    let mut name = String::new();
    let mut filename = String::new();
    let mut content_type = String::new();
    let mut data: Vec<u8> = Vec::new();

    let flush = |name: &mut String,
                 filename: &mut String,
                 content_type: &mut String,
                 data: &mut Vec<u8>,
                 fields: &mut Vec<FormField>| {
        if !name.is_empty() {
            if !filename.is_empty() && data.len() >= 2 {
                // trim the single line break preceding the boundary
                data.truncate(data.len() - 2);
            }
            fields.push(FormField {
                name: std::mem::take(name),
                filename: std::mem::take(filename),
                content_type: std::mem::take(content_type),
                data: std::mem::take(data),
            });
        }
    };

    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        let trimmed = strip_cr(line);

        if trimmed == marker.as_slice() {
            flush(&mut name, &mut filename, &mut content_type, &mut data, &mut fields);

            // Content-Disposition: form-data; name="f"; filename="a.txt"
            i += 1;
            let Some(disposition) = lines.get(i) else { break };
            let disposition = String::from_utf8_lossy(strip_cr(disposition));
            (name, filename) = part_field(&disposition);

            if !filename.is_empty() {
                i += 1;
                let Some(ct_line) = lines.get(i) else { break };
                content_type = part_content_type(&String::from_utf8_lossy(strip_cr(ct_line)));
            } else {
                content_type = String::new();
            }

            // skip the blank line before the part payload
            i += 2;
            continue;
        }

        if trimmed == end_marker.as_slice() {
            flush(&mut name, &mut filename, &mut content_type, &mut data, &mut fields);
            i += 1;
            continue;
        }

        if filename.is_empty() {
            // text field: line breaks are separators, not payload
            data.extend_from_slice(strip_cr(line));
        } else {
            // file field: preserve the payload byte-for-byte
            data.extend_from_slice(line);
            data.push(b'\n');
        }
        i += 1;
    }

    fields
}

/// Convert decoded fields into request parameters, saving file fields
/// through the blob store under a fresh identifier.
pub fn into_params(
    fields: Vec<FormField>,
    params: &mut HashMap<String, String>,
    blobs: &dyn BlobStore,
) {
    for field in fields {
        if !field.is_file() {
            let value = String::from_utf8_lossy(&field.data).into_owned();
            params.insert(field.name, value);
            continue;
        }
        let document_id = Uuid::new_v4().to_string();
        params.insert("document".to_string(), document_id.clone());
        params.insert("content_len".to_string(), field.data.len().to_string());
        params.insert("content_type".to_string(), field.content_type);
        params.insert("filename".to_string(), field.filename);
        if let Err(e) = blobs.save(&document_id, &field.data) {
            tracing::error!(document_id = %document_id, error = %e, "cannot persist uploaded blob");
        }
    }
}

fn strip_cr(line: &[u8]) -> &[u8] {
    match line.last() {
        Some(b'\r') => &line[..line.len() - 1],
        _ => line,
    }
}

/// Extract `name` and `filename` from a Content-Disposition line.
fn part_field(line: &str) -> (String, String) {
    (quoted_token(line, "name=\""), quoted_token(line, "filename=\""))
}

fn quoted_token(line: &str, token: &str) -> String {
    let Some(start) = line.find(token).map(|p| p + token.len()) else {
        return String::new();
    };
    let rest = &line[start..];
    match rest.find('"') {
        Some(end) => rest[..end].to_string(),
        None => rest.to_string(),
    }
}

/// Extract the value of a `Content-Type:` part header line.
fn part_content_type(line: &str) -> String {
    match line.split_once(": ") {
        Some((_, value)) => value.to_string(),
        None => line.to_string(),
    }
}

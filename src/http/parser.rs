//! Incremental HTTP/1.1 request parser.
//!
//! Pure functions mutating [`Request`] state from raw bytes. The parser
//! accepts the subset of HTTP/1.1 needed by the dispatch model: GET and
//! POST, `content-length` bodies, `multipart/form-data` uploads.

use crate::backend::BlobStore;
use crate::http::multipart;
use crate::http::request::{ParseState, Request, SESSION_COOKIE};
use std::collections::HashMap;
use url::form_urlencoded;

/// Feed one chunk of inbound bytes into the request state machine.
///
/// Returns `true` once the request is ready for dispatch, either complete
/// or malformed. Safe to call with arbitrary fragmentation; bytes are only
/// accumulated until a state transition is possible.
pub fn feed(req: &mut Request, chunk: &[u8], blobs: &dyn BlobStore) -> bool {
    if req.is_ready() {
        return true;
    }

    req.payload.extend_from_slice(chunk);

    if req.state == ParseState::AccumulatingHeaders {
        let Some(headers_end) = find_headers_end(&req.payload) else {
            return false;
        };
        req.body_start = headers_end + 4;
        parse_headers(req);
        match req.state {
            ParseState::Malformed => return true,
            _ if req.method == "GET" => {
                req.state = ParseState::Complete;
                return true;
            }
            _ => req.state = ParseState::AccumulatingBody,
        }
    }

    // POST body: complete only when exactly content-length bytes follow
    // the blank line.
    if req.payload.len() - req.body_start == req.content_length {
        finish_body(req, blobs);
        req.state = ParseState::Complete;
        return true;
    }
    false
}

fn find_headers_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

/// Parse request line and headers once the blank-line separator is present.
fn parse_headers(req: &mut Request) {
    let head = String::from_utf8_lossy(&req.payload[..req.body_start - 4]).into_owned();
    let mut lines = head.split("\r\n");

    let request_line = lines.next().unwrap_or("");
    let Some(method_end) = request_line.find(' ') else {
        req.fail(format!("Bad request -> 1st line lacks http method: {request_line}"));
        return;
    };
    req.method = request_line[..method_end].to_string();
    if req.method != "GET" && req.method != "POST" {
        req.fail(format!("Bad request -> only GET-POST are supported: {}", req.method));
        return;
    }

    let Some(target_start) = request_line[method_end..].find('/').map(|p| p + method_end) else {
        req.fail(format!("Bad request -> 1st line lacks '/': {request_line}"));
        return;
    };
    let target = &request_line[target_start..];
    req.query_string = match target.find(' ') {
        Some(end) => target[..end].to_string(),
        None => target.to_string(),
    };
    req.path = match req.query_string.find('?') {
        Some(q) => req.query_string[..q].to_string(),
        None => req.query_string.clone(),
    };

    for line in lines {
        if line.is_empty() {
            break;
        }
        let Some((name, value)) = line.split_once(':') else {
            req.fail("Bad request -> header lacks ':'");
            return;
        };
        let name = name.trim().to_ascii_lowercase();
        let value = value.trim().to_string();

        match name.as_str() {
            "content-length" => match value.parse::<usize>() {
                Ok(n) => req.content_length = n,
                Err(_) => {
                    req.fail(format!("Bad request -> invalid content length: {value}"));
                    return;
                }
            },
            "content-type" => {
                if value.starts_with("multipart") {
                    req.is_multipart = true;
                    if let Some(eq) = value.find('=') {
                        req.boundary = value[eq + 1..].to_string();
                    }
                }
            }
            "x-forwarded-for" => req.remote_ip = value.clone(),
            "cookie" => req.cookie = extract_session_token(&value),
            "origin" => {
                req.origin = if value.is_empty() { "null".to_string() } else { value.clone() };
            }
            _ => {}
        }

        if req.headers.insert(name.clone(), value).is_some() {
            req.fail(format!("Bad request -> duplicated header in request: {name} {}", req.path));
            return;
        }
    }

    parse_query_string(&mut req.params, &req.query_string);

    if req.method == "POST" && req.content_length == 0 {
        req.fail("Bad request -> invalid content length: 0");
    }
}

/// Decode the query portion of `query_string` into `params`.
///
/// `%XX` escapes become bytes and `+` becomes space; the last duplicate
/// name wins, matching map insertion semantics.
pub fn parse_query_string(params: &mut HashMap<String, String>, query_string: &str) {
    let Some((_, qs)) = query_string.split_once('?') else {
        return;
    };
    for (name, value) in form_urlencoded::parse(qs.as_bytes()) {
        if !name.is_empty() {
            params.insert(name.into_owned(), value.into_owned());
        }
    }
}

/// Pull the session token out of a `cookie` header value.
fn extract_session_token(cookie_header: &str) -> String {
    let token = format!("{SESSION_COOKIE}=");
    let Some(pos) = cookie_header.find(&token) else {
        return String::new();
    };
    let value = &cookie_header[pos + token.len()..];
    match value.find(';') {
        Some(end) => value[..end].to_string(),
        None => value.to_string(),
    }
}

/// Body fully received: decode multipart parts into parameters, persisting
/// file parts through the blob collaborator.
fn finish_body(req: &mut Request, blobs: &dyn BlobStore) {
    if !req.is_multipart {
        return;
    }
    let fields = multipart::parse(&req.payload[req.body_start..], &req.boundary);
    multipart::into_params(fields, &mut req.params, blobs);
}

//! Static file service for paths outside the microservice prefix.

use crate::http::mime;
use crate::http::request::Request;
use crate::http::response::Reply;
use std::path::Path;

/// Serve `req.path` from under `www_root`.
pub fn serve(req: &mut Request, www_root: &str) {
    if req.path.contains("..") {
        not_found(req);
        return;
    }

    let mut path = req.path.clone();
    if path.ends_with('/') {
        path.push_str("index.html");
    }
    let full = format!("{www_root}{path}");

    if Path::new(&full).is_dir() {
        // Browsers asking for a directory get sent to its index page.
        let target = format!("{path}/index.html");
        let mut reply = Reply::new("301 Moved Permanently", "text/html", &req.origin, b"");
        reply.location = Some(&target);
        reply.write_to(&mut req.response);
        return;
    }

    match std::fs::read(&full) {
        Ok(contents) => {
            tracing::trace!(path = %full, bytes = contents.len(), "serving static file");
            let mut reply =
                Reply::new("200 OK", mime::content_type(&path), &req.origin, &contents);
            reply.cache_control = Some("max-age=3600");
            reply.write_to(&mut req.response);
        }
        Err(_) => not_found(req),
    }
}

fn not_found(req: &mut Request) {
    tracing::warn!(path = %req.path, remote_ip = %req.remote_ip, "static file not found");
    Reply::new("404 Not Found", "text/plain", &req.origin, b"Resource not found")
        .write_to(&mut req.response);
}

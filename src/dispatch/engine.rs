//! Request dispatch engine.
//!
//! One engine clone runs inside every pool worker. It routes a completed
//! request either to the declarative microservice layer (paths under
//! `/ms/`) or to the static file service, runs the security pipeline, and
//! leaves the finished reply in the request's response buffer.

use crate::backend::{Backends, MailMessage};
use crate::dispatch::files;
use crate::dispatch::handlers;
use crate::dispatch::params::RequestParams;
use crate::dispatch::routes::{EmailSpec, RouteTable};
use crate::dispatch::validate::{is_user_in_role, validate_params};
use crate::http::request::{ParseState, Request, SESSION_COOKIE};
use crate::http::response::Reply;
use crate::server::stats::ServerStats;
use std::sync::Arc;
use std::time::Instant;

/// Longest accepted request path. Anything longer is treated as a runtime
/// error rather than routed.
const MAX_PATH_LEN: usize = 75;

const MICROSERVICE_PREFIX: &str = "/ms/";

/// Per-request mutable state threaded through the security pipeline and
/// the handlers. Replaces nothing on the request itself; handlers write
/// here instead of into shared state.
#[derive(Debug, Default)]
pub struct RequestContext {
    /// Session id from the request cookie, replaced on login.
    pub session_id: String,
    pub remote_ip: String,
    pub user_login: String,
    pub user_mail: String,
    /// Role string of the logged-in user.
    pub roles: String,
    /// Handler override for the response content type.
    pub content_type: Option<String>,
    /// Set by download handlers; produces a Content-Disposition header.
    pub file_name: Option<String>,
}

/// Outcome of the microservice pipeline short of a normal 200.
enum ServiceError {
    NotFound,
    AuthRequired,
    Runtime(anyhow::Error),
}

#[derive(Clone)]
pub struct Engine {
    routes: Arc<RouteTable>,
    backends: Backends,
    stats: Arc<ServerStats>,
    www_root: String,
    http_log: bool,
    login_log: bool,
}

impl Engine {
    pub fn new(
        routes: Arc<RouteTable>,
        backends: Backends,
        stats: Arc<ServerStats>,
        www_root: String,
        http_log: bool,
        login_log: bool,
    ) -> Self {
        Self { routes, backends, stats, www_root, http_log, login_log }
    }

    /// Process one completed request, filling its response buffer.
    pub fn handle(&self, req: &mut Request) {
        self.stats.worker_started();
        let start = Instant::now();
        let span = tracing::info_span!("request", request_id = %req.request_id());
        let _guard = span.enter();

        if req.state == ParseState::Malformed {
            tracing::warn!(remote_ip = %req.remote_ip, error = %req.errmsg, "bad request");
            Reply::new("400 Bad Request", "text/plain", &req.origin, b"Bad request")
                .write_to(&mut req.response);
        } else if req.path.starts_with(MICROSERVICE_PREFIX) {
            self.microservice(req);
        } else {
            files::serve(req, &self.www_root);
        }

        if self.http_log {
            tracing::info!(
                remote_ip = %req.remote_ip,
                method = %req.method,
                path = %req.path,
                elapsed_us = start.elapsed().as_micros() as u64,
                "request processed"
            );
        }
        self.stats.record_request(start.elapsed());
        self.stats.worker_finished();
    }

    /// Route a `/ms/` path through the declarative service pipeline and
    /// serialize the outcome.
    fn microservice(&self, req: &mut Request) {
        let mut ctx = RequestContext {
            session_id: req.cookie.clone(),
            remote_ip: req.remote_ip.clone(),
            ..Default::default()
        };

        let result = if req.path.len() > MAX_PATH_LEN {
            Err(ServiceError::Runtime(anyhow::anyhow!(
                "request path exceeds {MAX_PATH_LEN} bytes"
            )))
        } else {
            self.run_service(req, &mut ctx)
        };

        let request_id = req.request_id().to_string();
        let request_id = (!request_id.is_empty()).then_some(request_id);
        match result {
            Ok(body) => {
                let content_type = ctx.content_type.as_deref().unwrap_or("application/json");
                let set_cookie = (req.path == "/ms/login" && !ctx.session_id.is_empty())
                    .then(|| {
                        format!(
                            "{SESSION_COOKIE}={}; Path=/; SameSite=None; Secure; HttpOnly",
                            ctx.session_id
                        )
                    });
                let disposition = ctx
                    .file_name
                    .as_deref()
                    .map(|name| format!("attachment; filename=\"{name}\";"));
                let mut reply = Reply::new("200 OK", content_type, &req.origin, &body);
                reply.request_id = request_id.as_deref();
                reply.set_cookie = set_cookie.as_deref();
                reply.content_disposition = disposition.as_deref();
                reply.write_to(&mut req.response);
            }
            Err(ServiceError::NotFound) => {
                tracing::warn!(path = %req.path, "no service registered");
                Reply::new("404 Not Found", "text/plain", &req.origin, b"Resource not found")
                    .write_to(&mut req.response);
            }
            Err(ServiceError::AuthRequired) => {
                tracing::warn!(
                    target: "security",
                    path = %req.path,
                    remote_ip = %req.remote_ip,
                    "rejected request without a valid session"
                );
                Reply::new(
                    "401 Unauthorized",
                    "text/plain",
                    &req.origin,
                    b"Please login with valid credentials",
                )
                .write_to(&mut req.response);
            }
            Err(ServiceError::Runtime(e)) => {
                tracing::error!(path = %req.path, error = %e, "service runtime error");
                let body = br#"{"status": "ERROR", "description": "Server runtime error"}"#;
                let mut reply = Reply::new("200 OK", "application/json", &req.origin, body);
                reply.request_id = request_id.as_deref();
                reply.write_to(&mut req.response);
            }
        }
    }

    /// The eight-step service pipeline: lookup, session check, role check,
    /// field validation, custom validator, handler, audit, mail.
    fn run_service(
        &self,
        req: &Request,
        ctx: &mut RequestContext,
    ) -> Result<Vec<u8>, ServiceError> {
        const ACCESS_DENIED: &str =
            r#"{"status": "INVALID", "validation": {"id": "_dialog_", "description": "$err.accessdenied"}}"#;

        let svc = self.routes.get(&req.path).ok_or(ServiceError::NotFound)?;

        if svc.secure {
            match self.backends.sessions.update(&ctx.session_id) {
                Some(user) => {
                    ctx.user_login = user.login;
                    ctx.user_mail = user.mail;
                    ctx.roles = user.roles;
                }
                None => return Err(ServiceError::AuthRequired),
            }
        }

        if !svc.roles.is_empty() && !is_user_in_role(&svc.roles, &ctx.roles) {
            tracing::warn!(
                target: "security",
                path = %req.path,
                user = %ctx.user_login,
                user_roles = %ctx.roles,
                "access denied by role"
            );
            return Ok(ACCESS_DENIED.as_bytes().to_vec());
        }

        let mut params = RequestParams::new(&svc.fields);
        if let Some(failure) = validate_params(&mut params, &req.params) {
            return Ok(failure.to_json().into_bytes());
        }

        if let Some(vspec) = &svc.validator {
            let failure = handlers::run_validator(vspec, &params, svc, ctx, &self.backends)
                .map_err(ServiceError::Runtime)?;
            if let Some(failure) = failure {
                return Ok(failure.to_json().into_bytes());
            }
        }

        let mut out = Vec::new();
        handlers::invoke(
            svc,
            &params,
            ctx,
            &self.backends,
            &self.stats,
            self.login_log,
            &mut out,
        )
        .map_err(ServiceError::Runtime)?;

        if let Some(record) = &svc.audit_record {
            let message = params.audit_message(record);
            self.backends
                .audit
                .record(&req.path, &ctx.user_login, &ctx.remote_ip, &message);
        }

        if let Some(email) = &svc.email {
            self.send_mail(email, &params, ctx, req.request_id());
        }

        Ok(out)
    }

    /// Resolve the mail spec against the request and deliver from a
    /// detached task. Delivery failures never affect the response.
    fn send_mail(
        &self,
        email: &EmailSpec,
        params: &RequestParams,
        ctx: &RequestContext,
        request_id: &str,
    ) {
        let body = match std::fs::read_to_string(&email.template) {
            Ok(text) => params.mail_body(&text, &ctx.user_login),
            Err(e) => {
                tracing::error!(template = %email.template, error = %e, "cannot read mail template");
                return;
            }
        };

        let resolve = |token: &str| resolve_mail_token(token, params, ctx);
        let message = MailMessage {
            to: resolve(&email.to),
            cc: resolve(&email.cc),
            subject: email.subject.clone(),
            body,
            attachment: (!email.attachment.is_empty()).then(|| resolve(&email.attachment)),
            attachment_filename: (!email.attachment_filename.is_empty())
                .then(|| resolve(&email.attachment_filename)),
            request_id: request_id.to_string(),
        };

        let mailer = self.backends.mailer.clone();
        tokio::spawn(async move {
            mailer.send(message);
        });
    }
}

/// Mail spec tokens starting with `$` reference the logged-in user's mail
/// (`$usermail`) or a request parameter by name; anything else is literal.
fn resolve_mail_token(token: &str, params: &RequestParams, ctx: &RequestContext) -> String {
    match token.strip_prefix('$') {
        Some("usermail") => ctx.user_mail.clone(),
        Some(name) => params.get(name).unwrap_or("").to_string(),
        None => token.to_string(),
    }
}

//! Built-in service handlers and custom validators.
//!
//! Every handler appends its payload (JSON, except for metrics and file
//! downloads) to the output buffer; side effects go through the
//! collaborator traits.

use crate::backend::Backends;
use crate::dispatch::engine::RequestContext;
use crate::dispatch::params::RequestParams;
use crate::dispatch::routes::{Handler, Service, Validator, ValidatorSpec};
use crate::dispatch::validate::ValidationFailure;
use crate::server::stats::{ServerStats, hostname};
use anyhow::{Result, anyhow};

pub(crate) const STATUS_OK: &str = r#"{"status": "OK"}"#;
pub(crate) const STATUS_ERROR: &str = r#"{"status": "ERROR","description" : "System error"}"#;

/// Invoke the resolved handler for a service, filling `out`.
pub(crate) fn invoke(
    svc: &Service,
    params: &RequestParams,
    ctx: &mut RequestContext,
    backends: &Backends,
    stats: &ServerStats,
    login_log: bool,
    out: &mut Vec<u8>,
) -> Result<()> {
    match svc.handler {
        Handler::Ping => out.extend_from_slice(STATUS_OK.as_bytes()),
        Handler::Version => version(out),
        Handler::ServerInfo => server_info(stats, out),
        Handler::Metrics => metrics(stats, backends, ctx, out),
        Handler::SessionCount => session_count(backends, out),
        Handler::DbGetJson => {
            let json = backends
                .sql
                .get_json_record(&svc.db, &params.sql(&svc.sql, &ctx.user_login))?;
            out.extend_from_slice(json.as_bytes());
        }
        Handler::DbGet => {
            let json = backends
                .sql
                .get_json(&svc.db, &params.sql(&svc.sql, &ctx.user_login))?;
            out.extend_from_slice(json.as_bytes());
        }
        Handler::DbGetMulti => {
            let json = backends.sql.get_json_multi(
                &svc.db,
                &params.sql(&svc.sql, &ctx.user_login),
                &svc.tags,
            )?;
            out.extend_from_slice(json.as_bytes());
        }
        Handler::DbExec => {
            let ok = backends
                .sql
                .exec(&svc.db, &params.sql(&svc.sql, &ctx.user_login))?;
            out.extend_from_slice(if ok { STATUS_OK } else { STATUS_ERROR }.as_bytes());
        }
        Handler::Login => login(params, ctx, backends, login_log, out)?,
        Handler::Logout => {
            backends.sessions.remove(&ctx.session_id);
            out.extend_from_slice(STATUS_OK.as_bytes());
        }
        Handler::Download => download(svc, params, ctx, backends, out)?,
        Handler::DeleteFile => delete_file(svc, params, ctx, backends, out)?,
    }
    Ok(())
}

/// Run a custom validator. A `Some` result is a validation failure the
/// client sees as an `INVALID` payload.
pub(crate) fn run_validator(
    vspec: &ValidatorSpec,
    params: &RequestParams,
    svc: &Service,
    ctx: &RequestContext,
    backends: &Backends,
) -> Result<Option<ValidationFailure>> {
    // `$userlogin` resolves to a fixed placeholder when nobody is logged in
    let userlogin = if ctx.user_login.is_empty() { "Undefined" } else { ctx.user_login.as_str() };
    let has_rows = backends.sql.has_rows(&svc.db, &params.sql(&vspec.sql, userlogin))?;
    let failed = match vspec.func {
        Validator::DbNoMatch => has_rows,
        Validator::DbMatch => !has_rows,
    };
    Ok(failed.then(|| ValidationFailure::new(&vspec.id, &vspec.description)))
}

/// Authenticate and create a security session.
fn login(
    params: &RequestParams,
    ctx: &mut RequestContext,
    backends: &Backends,
    login_log: bool,
    out: &mut Vec<u8>,
) -> Result<()> {
    const INVALID_LOGIN: &str =
        r#"{"status": "INVALID", "validation": {"id": "login", "description": "$err.invalidcredentials"}}"#;

    let user = params.get("login").unwrap_or("").to_string();
    let password = params.get("password").unwrap_or("");

    match backends.login.authenticate(&user, password)? {
        Some(profile) => {
            let session_id = backends
                .sessions
                .create(&user, &profile.email, &ctx.remote_ip, &profile.roles)
                .ok_or_else(|| anyhow!("session create failed for user {user}"))?;
            ctx.session_id = session_id;
            ctx.user_login = user.clone();
            ctx.user_mail = profile.email;
            let body = format!(
                r#"{{"status": "OK", "data":[{{"displayname":"{}"}}]}}"#,
                profile.display_name
            );
            out.extend_from_slice(body.as_bytes());
            if login_log {
                tracing::info!(
                    target: "security",
                    user = %user,
                    remote_ip = %ctx.remote_ip,
                    session_id = %ctx.session_id,
                    roles = %profile.roles,
                    "login OK"
                );
            }
        }
        None => {
            tracing::warn!(target: "security", user = %user, remote_ip = %ctx.remote_ip, "login failed");
            ctx.session_id.clear();
            out.extend_from_slice(INVALID_LOGIN.as_bytes());
        }
    }
    Ok(())
}

fn version(out: &mut Vec<u8>) {
    let body = format!(
        r#"{{"status": "OK", "data":[{{"pod": "{}", "server": "mserve-{}"}}]}}"#,
        hostname(),
        env!("CARGO_PKG_VERSION")
    );
    out.extend_from_slice(body.as_bytes());
}

fn server_info(stats: &ServerStats, out: &mut Vec<u8>) {
    let snap = stats.snapshot();
    let body = format!(
        concat!(
            r#"{{"status": "OK", "data":[{{"pod":"{}","#,
            r#""totalRequests":{},"#,
            r#""avgTimePerRequest":{:.8},"#,
            r#""startedOn":"{}","#,
            r#""connections":{},"#,
            r#""activeThreads":{}}}]}}"#
        ),
        hostname(),
        snap.requests,
        snap.avg_time,
        snap.started_on,
        snap.connections,
        snap.active_workers
    );
    out.extend_from_slice(body.as_bytes());
}

/// Prometheus exposition format; switches the response content type to
/// plain text.
fn metrics(stats: &ServerStats, backends: &Backends, ctx: &mut RequestContext, out: &mut Vec<u8>) {
    ctx.content_type = Some("text/plain; version=0.0.4".to_string());

    let snap = stats.snapshot();
    let pod = hostname();
    let body = format!(
        concat!(
            "# HELP mserve_requests_total The number of HTTP requests processed by this container.\n",
            "# TYPE mserve_requests_total counter\n",
            "mserve_requests_total{{pod=\"{pod}\"}} {requests}\n",
            "# HELP mserve_connections Client tcp-ip connections.\n",
            "# TYPE mserve_connections counter\n",
            "mserve_connections{{pod=\"{pod}\"}} {connections}\n",
            "# HELP mserve_active_workers Active worker tasks.\n",
            "# TYPE mserve_active_workers counter\n",
            "mserve_active_workers{{pod=\"{pod}\"}} {active}\n",
            "# HELP mserve_avg_time Average request processing time in seconds.\n",
            "# TYPE mserve_avg_time counter\n",
            "mserve_avg_time{{pod=\"{pod}\"}} {avg:.8}\n",
            "# HELP sessions Number of active logged-in users.\n",
            "# TYPE sessions counter\n",
            "sessions{{pod=\"{pod}\"}} {sessions}\n"
        ),
        pod = pod,
        requests = snap.requests,
        connections = snap.connections,
        active = snap.active_workers,
        avg = snap.avg_time,
        sessions = backends.sessions.count()
    );
    out.extend_from_slice(body.as_bytes());
}

fn session_count(backends: &Backends, out: &mut Vec<u8>) {
    let body = format!(
        r#"{{"status": "OK", "data":[{{"total":{}}}]}}"#,
        backends.sessions.count()
    );
    out.extend_from_slice(body.as_bytes());
}

/// Stream a stored blob back to the client; the record query resolves the
/// blob id, filename and content type.
fn download(
    svc: &Service,
    params: &RequestParams,
    ctx: &mut RequestContext,
    backends: &Backends,
    out: &mut Vec<u8>,
) -> Result<()> {
    let rec = backends
        .sql
        .get_record(&svc.db, &params.sql(&svc.sql, &ctx.user_login))?;
    if rec.is_empty() {
        return Ok(());
    }
    let filename = rec.get("filename").cloned().unwrap_or_default();
    let content_type = rec.get("content_type").cloned().unwrap_or_default();
    let document = rec.get("document").cloned().unwrap_or_default();

    match backends.blobs.load(&document) {
        Ok(bytes) => {
            ctx.file_name = Some(filename);
            ctx.content_type = Some(content_type);
            out.extend_from_slice(&bytes);
        }
        Err(e) => {
            tracing::error!(
                user = %ctx.user_login,
                document = %document,
                error = %e,
                "download -> cannot open blob"
            );
            ctx.file_name = Some("error.txt".to_string());
            ctx.content_type = Some("text/plain".to_string());
            let msg = format!("Error downloading file: {filename} with ID: {document}");
            out.extend_from_slice(msg.as_bytes());
        }
    }
    Ok(())
}

/// Delete a blob record and its stored file. `lookup_sql` locates the blob
/// id before the delete statement runs.
fn delete_file(
    svc: &Service,
    params: &RequestParams,
    ctx: &mut RequestContext,
    backends: &Backends,
    out: &mut Vec<u8>,
) -> Result<()> {
    let document = if svc.lookup_sql.is_empty() {
        None
    } else {
        let rec = backends
            .sql
            .get_record(&svc.db, &params.sql(&svc.lookup_sql, &ctx.user_login))?;
        if rec.is_empty() {
            out.extend_from_slice(STATUS_ERROR.as_bytes());
            return Ok(());
        }
        rec.get("document").cloned()
    };

    if backends
        .sql
        .exec(&svc.db, &params.sql(&svc.sql, &ctx.user_login))?
    {
        if let Some(document) = document {
            if let Err(e) = backends.blobs.remove(&document) {
                tracing::error!(document = %document, error = %e, "cannot remove blob file");
            }
        }
        out.extend_from_slice(STATUS_OK.as_bytes());
    } else {
        out.extend_from_slice(STATUS_ERROR.as_bytes());
    }
    Ok(())
}

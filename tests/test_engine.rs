//! End-to-end tests for the dispatch engine

use anyhow::{Result, anyhow, bail};
use mserve::backend::{
    AuditSink, Backends, BlobStore, LogMailer, LoginProvider, MemorySessionStore, SqlBackend,
    UserInfo,
};
use mserve::dispatch::engine::Engine;
use mserve::dispatch::routes::RouteTable;
use mserve::http::parser;
use mserve::http::request::Request;
use mserve::server::stats::ServerStats;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

// ---- fakes ----------------------------------------------------------------

/// SQL backend recording every executed query.
#[derive(Default)]
struct FakeSql {
    queries: Mutex<Vec<String>>,
    has_rows: bool,
    record: HashMap<String, String>,
}

impl SqlBackend for FakeSql {
    fn get_json_record(&self, _db: &str, query: &str) -> Result<String> {
        self.queries.lock().unwrap().push(query.to_string());
        Ok(r#"{"status": "OK", "data": {"id": 1}}"#.to_string())
    }
    fn get_json(&self, _db: &str, query: &str) -> Result<String> {
        self.queries.lock().unwrap().push(query.to_string());
        Ok(r#"{"status": "OK", "data": []}"#.to_string())
    }
    fn get_json_multi(&self, _db: &str, query: &str, _tags: &[String]) -> Result<String> {
        self.queries.lock().unwrap().push(query.to_string());
        Ok(r#"{"status": "OK"}"#.to_string())
    }
    fn exec(&self, _db: &str, query: &str) -> Result<bool> {
        self.queries.lock().unwrap().push(query.to_string());
        Ok(true)
    }
    fn has_rows(&self, _db: &str, query: &str) -> Result<bool> {
        self.queries.lock().unwrap().push(query.to_string());
        Ok(self.has_rows)
    }
    fn get_record(&self, _db: &str, query: &str) -> Result<HashMap<String, String>> {
        self.queries.lock().unwrap().push(query.to_string());
        Ok(self.record.clone())
    }
}

/// Accepts one login/password pair.
struct OneUserLogin;

impl LoginProvider for OneUserLogin {
    fn authenticate(&self, login: &str, password: &str) -> Result<Option<UserInfo>> {
        if login == "jdoe" && password == "secret" {
            Ok(Some(UserInfo {
                email: "jdoe@corp.io".to_string(),
                display_name: "John Doe".to_string(),
                roles: "can_view".to_string(),
            }))
        } else {
            Ok(None)
        }
    }
}

#[derive(Default)]
struct CaptureAudit {
    records: Mutex<Vec<String>>,
}

impl AuditSink for CaptureAudit {
    fn record(&self, path: &str, user: &str, ip: &str, message: &str) {
        self.records
            .lock()
            .unwrap()
            .push(format!("{path}|{user}|{ip}|{message}"));
    }
}

struct NullBlobs;

impl BlobStore for NullBlobs {
    fn save(&self, _id: &str, _content: &[u8]) -> Result<()> {
        Ok(())
    }
    fn load(&self, id: &str) -> Result<Vec<u8>> {
        bail!("no blob {id}")
    }
    fn remove(&self, _id: &str) -> Result<()> {
        Ok(())
    }
}

/// Blob store with one preloaded document.
struct OneBlob;

impl BlobStore for OneBlob {
    fn save(&self, _id: &str, _content: &[u8]) -> Result<()> {
        Ok(())
    }
    fn load(&self, id: &str) -> Result<Vec<u8>> {
        if id == "doc-1" {
            Ok(b"%PDF-1.4 fake".to_vec())
        } else {
            Err(anyhow!("no blob {id}"))
        }
    }
    fn remove(&self, _id: &str) -> Result<()> {
        Ok(())
    }
}

// ---- helpers --------------------------------------------------------------

fn backends(sql: FakeSql, audit: Arc<CaptureAudit>) -> Backends {
    Backends {
        sql: Arc::new(sql),
        sessions: Arc::new(MemorySessionStore::new()),
        login: Arc::new(OneUserLogin),
        audit,
        mailer: Arc::new(LogMailer),
        blobs: Arc::new(NullBlobs),
    }
}

fn engine(routes: &str, backends: Backends) -> Engine {
    let routes = Arc::new(RouteTable::from_json(routes).expect("valid routes"));
    Engine::new(
        routes,
        backends,
        Arc::new(ServerStats::new()),
        "/nonexistent/www".to_string(),
        false,
        false,
    )
}

fn request(raw: &str) -> Request {
    let mut req = Request::new("10.1.1.7".to_string());
    assert!(parser::feed(&mut req, raw.as_bytes(), &NullBlobs));
    req
}

fn response_text(req: &Request) -> String {
    String::from_utf8_lossy(req.response.pending()).into_owned()
}

// ---- tests ----------------------------------------------------------------

#[test]
fn test_ping() {
    let eng = engine(
        r#"{"services": [{"uri": "/ms/ping", "function": "ping", "secure": false}]}"#,
        backends(FakeSql::default(), Arc::default()),
    );
    let mut req = request("GET /ms/ping HTTP/1.1\r\n\r\n");
    eng.handle(&mut req);

    let text = response_text(&req);
    assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(text.contains("Content-Type: application/json"));
    assert!(text.ends_with(r#"{"status": "OK"}"#));
}

#[test]
fn test_secure_service_without_session_is_401() {
    let eng = engine(
        r#"{"services": [{"uri": "/ms/ping", "function": "ping"}]}"#,
        backends(FakeSql::default(), Arc::default()),
    );
    let mut req = request("GET /ms/ping HTTP/1.1\r\n\r\n");
    eng.handle(&mut req);

    let text = response_text(&req);
    assert!(text.starts_with("HTTP/1.1 401 Unauthorized\r\n"));
    assert!(text.ends_with("Please login with valid credentials"));
}

#[test]
fn test_unknown_service_is_404() {
    let eng = engine(r#"{"services": []}"#, backends(FakeSql::default(), Arc::default()));
    let mut req = request("GET /ms/nope HTTP/1.1\r\n\r\n");
    eng.handle(&mut req);

    let text = response_text(&req);
    assert!(text.starts_with("HTTP/1.1 404 Not Found\r\n"));
    assert!(text.ends_with("Resource not found"));
}

#[test]
fn test_malformed_request_is_400() {
    let eng = engine(r#"{"services": []}"#, backends(FakeSql::default(), Arc::default()));
    let mut req = request("PUT /ms/ping HTTP/1.1\r\n\r\n");
    eng.handle(&mut req);

    let text = response_text(&req);
    assert!(text.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    assert!(text.ends_with("Bad request"));
}

#[test]
fn test_overlong_path_is_runtime_error() {
    let eng = engine(r#"{"services": []}"#, backends(FakeSql::default(), Arc::default()));
    let path = format!("/ms/{}", "a".repeat(80));
    let mut req = request(&format!("GET {path} HTTP/1.1\r\n\r\n"));
    eng.handle(&mut req);

    let text = response_text(&req);
    assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(text.ends_with(r#"{"status": "ERROR", "description": "Server runtime error"}"#));
}

#[test]
fn test_field_validation_rejects_bad_double() {
    let routes = r#"{"services": [{
        "uri": "/ms/payment/add", "function": "ping", "secure": false,
        "fields": [{"name": "amount", "type": "double", "required": true}]
    }]}"#;
    let eng = engine(routes, backends(FakeSql::default(), Arc::default()));
    let mut req = request("GET /ms/payment/add?amount=12.5x HTTP/1.1\r\n\r\n");
    eng.handle(&mut req);

    let text = response_text(&req);
    assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(text.contains(r#""status": "INVALID""#));
    assert!(text.contains(r#""id": "amount""#));
    assert!(text.contains("$err.invalidtype"));
}

#[test]
fn test_missing_required_field() {
    let routes = r#"{"services": [{
        "uri": "/ms/payment/add", "function": "ping", "secure": false,
        "fields": [{"name": "amount", "type": "double", "required": true}]
    }]}"#;
    let eng = engine(routes, backends(FakeSql::default(), Arc::default()));
    let mut req = request("GET /ms/payment/add HTTP/1.1\r\n\r\n");
    eng.handle(&mut req);

    let text = response_text(&req);
    assert!(text.contains(r#""id": "amount""#));
    assert!(text.contains("$err.required"));
}

const LOGIN_ROUTE: &str = r#"{"services": [{
    "uri": "/ms/login", "function": "login", "secure": false,
    "fields": [
        {"name": "login", "type": "string", "required": true},
        {"name": "password", "type": "string", "required": true}
    ]
}]}"#;

#[test]
fn test_login_issues_session_cookie() {
    let eng = engine(LOGIN_ROUTE, backends(FakeSql::default(), Arc::default()));
    let mut req = request(
        "GET /ms/login?login=jdoe&password=secret HTTP/1.1\r\nOrigin: https://app\r\n\r\n",
    );
    eng.handle(&mut req);

    let text = response_text(&req);
    assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(text.contains("Set-Cookie: MSERVESESSIONID="));
    assert!(text.contains("SameSite=None; Secure; HttpOnly"));
    assert!(text.contains(r#""displayname":"John Doe""#));
}

#[test]
fn test_login_with_bad_credentials() {
    let eng = engine(LOGIN_ROUTE, backends(FakeSql::default(), Arc::default()));
    let mut req = request("GET /ms/login?login=jdoe&password=wrong HTTP/1.1\r\n\r\n");
    eng.handle(&mut req);

    let text = response_text(&req);
    assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(!text.contains("Set-Cookie"));
    assert!(text.contains(r#""id": "login""#));
    assert!(text.contains("$err.invalidcredentials"));
}

#[test]
fn test_session_authorizes_secure_service() {
    let bk = backends(FakeSql::default(), Arc::default());
    let session_id = bk
        .sessions
        .create("jdoe", "jdoe@corp.io", "10.1.1.7", "can_view")
        .unwrap();

    let eng = engine(r#"{"services": [{"uri": "/ms/ping", "function": "ping"}]}"#, bk);
    let mut req = request(&format!(
        "GET /ms/ping HTTP/1.1\r\nCookie: MSERVESESSIONID={session_id}\r\n\r\n"
    ));
    eng.handle(&mut req);

    let text = response_text(&req);
    assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(text.ends_with(r#"{"status": "OK"}"#));
}

#[test]
fn test_role_denial() {
    let bk = backends(FakeSql::default(), Arc::default());
    let session_id = bk
        .sessions
        .create("jdoe", "jdoe@corp.io", "10.1.1.7", "can_view")
        .unwrap();

    let routes = r#"{"services": [{
        "uri": "/ms/admin/wipe", "function": "ping",
        "roles": [{"name": "admin"}]
    }]}"#;
    let eng = engine(routes, bk);
    let mut req = request(&format!(
        "GET /ms/admin/wipe HTTP/1.1\r\nCookie: MSERVESESSIONID={session_id}\r\n\r\n"
    ));
    eng.handle(&mut req);

    let text = response_text(&req);
    assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(text.contains(r#""id": "_dialog_""#));
    assert!(text.contains("$err.accessdenied"));
}

#[test]
fn test_dbexec_substitutes_and_audits() {
    let audit = Arc::new(CaptureAudit::default());
    let bk = backends(FakeSql::default(), audit.clone());

    let routes = r#"{"services": [{
        "uri": "/ms/note/delete", "function": "dbexec", "secure": false,
        "db": "crm", "sql": "delete from notes where id = $id",
        "fields": [{"name": "id", "type": "int", "required": true}],
        "audit": {"enabled": true, "record": "note $id deleted"}
    }]}"#;
    let eng = engine(routes, bk);
    let mut req = request("GET /ms/note/delete?id=42 HTTP/1.1\r\n\r\n");
    eng.handle(&mut req);

    let text = response_text(&req);
    assert!(text.ends_with(r#"{"status": "OK"}"#));

    let records = audit.records.lock().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0], "/ms/note/delete||10.1.1.7|note 42 deleted");
}

#[test]
fn test_custom_validator_blocks_duplicates() {
    let sql = FakeSql { has_rows: true, ..FakeSql::default() };
    let routes = r#"{"services": [{
        "uri": "/ms/note/add", "function": "dbexec", "secure": false,
        "db": "crm", "sql": "insert into notes (title) values ($title)",
        "fields": [{"name": "title", "type": "string", "required": true}],
        "validator": {
            "function": "db_nomatch",
            "sql": "select id from notes where title = $title",
            "id": "title",
            "description": "$err.duplicate"
        }
    }]}"#;
    let eng = engine(routes, backends(sql, Arc::default()));
    let mut req = request("GET /ms/note/add?title=hello HTTP/1.1\r\n\r\n");
    eng.handle(&mut req);

    let text = response_text(&req);
    assert!(text.contains(r#""status": "INVALID""#));
    assert!(text.contains(r#""id": "title""#));
    assert!(text.contains("$err.duplicate"));
}

#[test]
fn test_validator_sql_resolves_userlogin() {
    let sql = Arc::new(FakeSql { has_rows: true, ..FakeSql::default() });
    let bk = Backends {
        sql: sql.clone(),
        sessions: Arc::new(MemorySessionStore::new()),
        login: Arc::new(OneUserLogin),
        audit: Arc::new(CaptureAudit::default()),
        mailer: Arc::new(LogMailer),
        blobs: Arc::new(NullBlobs),
    };
    let session_id = bk
        .sessions
        .create("jdoe", "jdoe@corp.io", "10.1.1.7", "can_view")
        .unwrap();

    let routes = r#"{"services": [
        {
            "uri": "/ms/note/add", "function": "dbexec", "secure": false,
            "db": "crm", "sql": "insert into notes (title) values ($title)",
            "fields": [{"name": "title", "type": "string", "required": true}],
            "validator": {
                "function": "db_nomatch",
                "sql": "select id from notes where title = $title and owner = $userlogin",
                "id": "title", "description": "$err.duplicate"
            }
        },
        {
            "uri": "/ms/note/mine", "function": "dbexec",
            "db": "crm", "sql": "update notes set seen = 1 where owner = $userlogin",
            "validator": {
                "function": "db_match",
                "sql": "select id from notes where owner = $userlogin",
                "id": "owner", "description": "$err.norecord"
            }
        }
    ]}"#;
    let eng = engine(routes, bk);

    // anonymous caller: the login placeholder is the fixed default
    let mut req = request("GET /ms/note/add?title=hello HTTP/1.1\r\n\r\n");
    eng.handle(&mut req);
    {
        let queries = sql.queries.lock().unwrap();
        assert_eq!(
            queries[0],
            "select id from notes where title = 'hello' and owner = 'Undefined'"
        );
    }

    // logged-in caller: the resolved login is substituted
    let mut req = request(&format!(
        "GET /ms/note/mine HTTP/1.1\r\nCookie: MSERVESESSIONID={session_id}\r\n\r\n"
    ));
    eng.handle(&mut req);
    let queries = sql.queries.lock().unwrap();
    assert_eq!(
        queries.last().map(String::as_str),
        Some("update notes set seen = 1 where owner = 'jdoe'")
    );
}

#[test]
fn test_string_escaping_reaches_sql() {
    let sql = Arc::new(FakeSql::default());
    let routes = r#"{"services": [{
        "uri": "/ms/note/add", "function": "dbexec", "secure": false,
        "db": "crm", "sql": "insert into notes (title) values ($title)",
        "fields": [{"name": "title", "type": "string", "required": true}]
    }]}"#;
    let bk = Backends {
        sql: sql.clone(),
        sessions: Arc::new(MemorySessionStore::new()),
        login: Arc::new(OneUserLogin),
        audit: Arc::new(CaptureAudit::default()),
        mailer: Arc::new(LogMailer),
        blobs: Arc::new(NullBlobs),
    };
    let eng = engine(routes, bk);
    let mut req = request("GET /ms/note/add?title=O%27Brien HTTP/1.1\r\n\r\n");
    eng.handle(&mut req);

    let queries = sql.queries.lock().unwrap();
    assert_eq!(queries[0], "insert into notes (title) values ('O''Brien')");
}

#[test]
fn test_download_sets_disposition() {
    let mut record = HashMap::new();
    record.insert("filename".to_string(), "report.pdf".to_string());
    record.insert("content_type".to_string(), "application/pdf".to_string());
    record.insert("document".to_string(), "doc-1".to_string());

    let bk = Backends {
        sql: Arc::new(FakeSql { record, ..FakeSql::default() }),
        sessions: Arc::new(MemorySessionStore::new()),
        login: Arc::new(OneUserLogin),
        audit: Arc::new(CaptureAudit::default()),
        mailer: Arc::new(LogMailer),
        blobs: Arc::new(OneBlob),
    };
    let routes = r#"{"services": [{
        "uri": "/ms/blob/download", "function": "download", "secure": false,
        "db": "crm", "sql": "select * from blobs where id = $id",
        "fields": [{"name": "id", "type": "int", "required": true}]
    }]}"#;
    let eng = engine(routes, bk);
    let mut req = request("GET /ms/blob/download?id=9 HTTP/1.1\r\n\r\n");
    eng.handle(&mut req);

    let text = response_text(&req);
    assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(text.contains("Content-Type: application/pdf"));
    assert!(text.contains("Content-Disposition: attachment; filename=\"report.pdf\";"));
    assert!(text.ends_with("%PDF-1.4 fake"));
}

#[test]
fn test_metrics_is_plain_text() {
    let eng = engine(
        r#"{"services": [{"uri": "/ms/metrics", "function": "getMetrics", "secure": false}]}"#,
        backends(FakeSql::default(), Arc::default()),
    );
    let mut req = request("GET /ms/metrics HTTP/1.1\r\n\r\n");
    eng.handle(&mut req);

    let text = response_text(&req);
    assert!(text.contains("Content-Type: text/plain"));
    assert!(text.contains("# TYPE mserve_requests_total counter"));
    assert!(text.contains("sessions{pod="));
}

#[test]
fn test_logout_drops_session() {
    let bk = backends(FakeSql::default(), Arc::default());
    let session_id = bk.sessions.create("jdoe", "j@x", "::1", "r").unwrap();
    let sessions = bk.sessions.clone();

    let eng = engine(r#"{"services": [{"uri": "/ms/logout", "function": "logout"}]}"#, bk);
    let mut req = request(&format!(
        "GET /ms/logout HTTP/1.1\r\nCookie: MSERVESESSIONID={session_id}\r\n\r\n"
    ));
    eng.handle(&mut req);

    assert!(response_text(&req).ends_with(r#"{"status": "OK"}"#));
    assert_eq!(sessions.count(), 0);
}

#[test]
fn test_request_id_is_echoed() {
    let eng = engine(
        r#"{"services": [{"uri": "/ms/ping", "function": "ping", "secure": false}]}"#,
        backends(FakeSql::default(), Arc::default()),
    );
    let mut req = request("GET /ms/ping HTTP/1.1\r\nx-request-id: trace-77\r\n\r\n");
    eng.handle(&mut req);

    assert!(response_text(&req).contains("x-request-id: trace-77\r\n"));
}

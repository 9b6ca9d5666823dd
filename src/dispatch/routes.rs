//! Declarative routing table.
//!
//! Loaded once at startup from a JSON array of service entries. Handler and
//! validator names are resolved into closed enums at load time; a name that
//! does not resolve is a fatal startup error, so dispatch never sees an
//! unresolved service.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::collections::HashMap;

/// Supported data types for http client inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Integer,
    Double,
    String,
    /// `YYYY-MM-DD`
    Date,
}

/// Declared input field: used for validation and safe template substitution.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: String,
    pub required: bool,
    pub ftype: FieldType,
}

/// Closed set of built-in service handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handler {
    /// JSON straight from the database.
    DbGetJson,
    /// Single resultset serialized as JSON.
    DbGet,
    /// Multiple resultsets from one query, named by tags.
    DbGetMulti,
    /// Data modification with no resultset.
    DbExec,
    Login,
    Logout,
    ServerInfo,
    Metrics,
    SessionCount,
    Download,
    DeleteFile,
    Version,
    Ping,
}

impl Handler {
    fn resolve(name: &str) -> Result<Self> {
        Ok(match name {
            "dbget_json" => Self::DbGetJson,
            "dbget" => Self::DbGet,
            "dbgetm" => Self::DbGetMulti,
            "dbexec" => Self::DbExec,
            "login" => Self::Login,
            "logout" => Self::Logout,
            "getServerInfo" => Self::ServerInfo,
            "getMetrics" => Self::Metrics,
            "getSessionCount" => Self::SessionCount,
            "download" => Self::Download,
            "deleteFile" => Self::DeleteFile,
            "get_version" => Self::Version,
            "ping" => Self::Ping,
            _ => bail!("invalid function name: {name}"),
        })
    }
}

/// Closed set of custom validator kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validator {
    /// Fails when the validator query returns rows.
    DbNoMatch,
    /// Fails when the validator query returns no rows.
    DbMatch,
}

impl Validator {
    fn resolve(name: &str) -> Result<Self> {
        Ok(match name {
            "db_nomatch" => Self::DbNoMatch,
            "db_match" => Self::DbMatch,
            _ => bail!("invalid validator name: {name}"),
        })
    }
}

#[derive(Debug, Clone)]
pub struct ValidatorSpec {
    pub func: Validator,
    pub sql: String,
    /// Field id reported in the validation payload.
    pub id: String,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct EmailSpec {
    pub to: String,
    pub cc: String,
    pub subject: String,
    /// Path of the body template file.
    pub template: String,
    /// Template resolving to the attachment blob id, empty for none.
    pub attachment: String,
    pub attachment_filename: String,
}

/// One routing-table entry, immutable after load and shared read-only
/// across all workers.
#[derive(Debug, Clone)]
pub struct Service {
    pub db: String,
    pub sql: String,
    /// Query locating the blob record for `deleteFile`.
    pub lookup_sql: String,
    pub secure: bool,
    pub fields: Vec<FieldSpec>,
    /// Resultset names for `dbgetm`.
    pub tags: Vec<String>,
    /// Authorized role names; empty means no role restriction.
    pub roles: Vec<String>,
    pub validator: Option<ValidatorSpec>,
    /// Audit record template; `None` disables auditing.
    pub audit_record: Option<String>,
    pub email: Option<EmailSpec>,
    pub handler: Handler,
}

/// Path → service descriptor map.
#[derive(Debug, Default)]
pub struct RouteTable {
    services: HashMap<String, Service>,
}

impl RouteTable {
    pub fn load(path: &str) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot open routing table {path}"))?;
        Self::from_json(&text).with_context(|| format!("error parsing routing table {path}"))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let file: RouteFile = serde_json::from_str(text).context("invalid routing table JSON")?;
        let mut services = HashMap::with_capacity(file.services.len());
        for raw in file.services {
            let service = resolve_entry(&raw)?;
            if !service.secure {
                tracing::warn!(uri = %raw.uri, "service is not secure");
            }
            services.insert(raw.uri, service);
        }
        Ok(Self { services })
    }

    pub fn get(&self, path: &str) -> Option<&Service> {
        self.services.get(path)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

fn resolve_entry(raw: &RawService) -> Result<Service> {
    if raw.uri.is_empty() || raw.function.is_empty() {
        bail!("uri and function cannot be undefined");
    }
    let handler = Handler::resolve(&raw.function)?;
    if matches!(handler, Handler::DbGet | Handler::DbGetMulti | Handler::DbExec) && raw.sql.is_empty()
    {
        bail!("sql cannot be undefined for {} ({})", raw.uri, raw.function);
    }
    if handler == Handler::DbGetMulti && raw.tags.is_empty() {
        bail!("tags cannot be undefined for {} (dbgetm)", raw.uri);
    }

    let fields = raw
        .fields
        .iter()
        .map(|f| {
            if f.name.is_empty() {
                bail!("field attributes cannot be undefined for {}", raw.uri);
            }
            let ftype = match f.ftype.as_str() {
                "string" => FieldType::String,
                "date" => FieldType::Date,
                "double" => FieldType::Double,
                "int" | "integer" => FieldType::Integer,
                other => bail!("invalid data type in routing table: {other}"),
            };
            Ok(FieldSpec { name: f.name.clone(), required: f.required, ftype })
        })
        .collect::<Result<Vec<_>>>()?;

    let validator = raw
        .validator
        .as_ref()
        .map(|v| -> Result<ValidatorSpec> {
            Ok(ValidatorSpec {
                func: Validator::resolve(&v.function)?,
                sql: v.sql.clone(),
                id: v.id.clone(),
                description: v.description.clone(),
            })
        })
        .transpose()?;

    let audit_record = raw
        .audit
        .as_ref()
        .filter(|a| a.enabled)
        .map(|a| a.record.clone());

    let email = raw.email.as_ref().filter(|e| e.enabled).map(|e| EmailSpec {
        to: e.to.clone(),
        cc: e.cc.clone(),
        subject: e.subject.clone(),
        template: e.template.clone(),
        attachment: e.attachment.clone(),
        attachment_filename: e.attachment_filename.clone(),
    });

    Ok(Service {
        db: raw.db.clone(),
        sql: raw.sql.clone(),
        lookup_sql: raw.lookup_sql.clone(),
        secure: raw.secure,
        fields,
        tags: raw.tags.iter().map(|t| t.tag.clone()).collect(),
        roles: raw.roles.iter().map(|r| r.name.clone()).collect(),
        validator,
        audit_record,
        email,
        handler,
    })
}

#[derive(Deserialize)]
struct RouteFile {
    services: Vec<RawService>,
}

fn default_true() -> bool {
    true
}

#[derive(Deserialize)]
struct RawService {
    uri: String,
    function: String,
    #[serde(default)]
    db: String,
    #[serde(default)]
    sql: String,
    #[serde(default, alias = "lookup-sql")]
    lookup_sql: String,
    #[serde(default = "default_true")]
    secure: bool,
    #[serde(default)]
    fields: Vec<RawField>,
    #[serde(default)]
    roles: Vec<RawRole>,
    #[serde(default)]
    tags: Vec<RawTag>,
    #[serde(default)]
    validator: Option<RawValidator>,
    #[serde(default)]
    audit: Option<RawAudit>,
    #[serde(default)]
    email: Option<RawEmail>,
}

#[derive(Deserialize)]
struct RawField {
    name: String,
    #[serde(rename = "type")]
    ftype: String,
    required: bool,
}

#[derive(Deserialize)]
struct RawRole {
    name: String,
}

#[derive(Deserialize)]
struct RawTag {
    tag: String,
}

#[derive(Deserialize)]
struct RawValidator {
    function: String,
    #[serde(default)]
    sql: String,
    id: String,
    description: String,
}

#[derive(Deserialize)]
struct RawAudit {
    enabled: bool,
    record: String,
}

#[derive(Deserialize)]
struct RawEmail {
    enabled: bool,
    to: String,
    #[serde(default)]
    cc: String,
    subject: String,
    template: String,
    #[serde(default)]
    attachment: String,
    #[serde(default, alias = "attachment-filename")]
    attachment_filename: String,
}

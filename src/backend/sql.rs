//! SQL execution collaborator.
//!
//! The engine hands over fully templated queries and expects JSON back;
//! everything about drivers, pooling and reconnects lives behind this trait.

use anyhow::Result;
use std::collections::HashMap;

/// Narrow interface over the SQL helper.
///
/// `db` is the logical connection identifier from the service descriptor
/// (e.g. `"db1"`); `query` is the already-substituted SQL text.
pub trait SqlBackend: Send + Sync {
    /// Run a query whose single row/column already contains a JSON document.
    fn get_json_record(&self, db: &str, query: &str) -> Result<String>;

    /// Run a query and serialize the resultset as a JSON `data` array.
    fn get_json(&self, db: &str, query: &str) -> Result<String>;

    /// Run a multi-resultset query; each resultset is serialized under the
    /// corresponding name in `tags`.
    fn get_json_multi(&self, db: &str, query: &str, tags: &[String]) -> Result<String>;

    /// Execute a data-modification statement. Returns `true` on success.
    fn exec(&self, db: &str, query: &str) -> Result<bool>;

    /// Whether the query returns at least one row.
    fn has_rows(&self, db: &str, query: &str) -> Result<bool>;

    /// Fetch a single row as a column-name → value map; empty if no rows.
    fn get_record(&self, db: &str, query: &str) -> Result<HashMap<String, String>>;
}

/// Placeholder backend used when no database is wired in.
///
/// Every call fails, which the engine reports as a runtime error payload.
pub struct UnconfiguredSql;

impl SqlBackend for UnconfiguredSql {
    fn get_json_record(&self, db: &str, _query: &str) -> Result<String> {
        anyhow::bail!("no sql backend configured for {db}")
    }

    fn get_json(&self, db: &str, _query: &str) -> Result<String> {
        anyhow::bail!("no sql backend configured for {db}")
    }

    fn get_json_multi(&self, db: &str, _query: &str, _tags: &[String]) -> Result<String> {
        anyhow::bail!("no sql backend configured for {db}")
    }

    fn exec(&self, db: &str, _query: &str) -> Result<bool> {
        anyhow::bail!("no sql backend configured for {db}")
    }

    fn has_rows(&self, db: &str, _query: &str) -> Result<bool> {
        anyhow::bail!("no sql backend configured for {db}")
    }

    fn get_record(&self, db: &str, _query: &str) -> Result<HashMap<String, String>> {
        anyhow::bail!("no sql backend configured for {db}")
    }
}

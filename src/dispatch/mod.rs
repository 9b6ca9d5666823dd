//! Declarative request dispatch: routing table, parameter validation,
//! built-in handlers and the engine that ties them together.

pub mod engine;
pub mod files;
pub mod handlers;
pub mod params;
pub mod routes;
pub mod validate;

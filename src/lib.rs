//! mserve - Declarative Microservice Engine
//!
//! A single-process HTTP/1.1 server that dispatches requests to services
//! declared in a JSON routing table: field validation, session security,
//! role checks, SQL templates, audit records and notification mail all
//! come from configuration rather than code.

pub mod backend;
pub mod config;
pub mod dispatch;
pub mod http;
pub mod server;

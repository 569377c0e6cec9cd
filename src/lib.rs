//! Model Metadata API
//!
//! Serves a relationship-aware description of an application's entity
//! model: tables, fields, types and how entities link to each other through
//! foreign keys and join tables.
//!
//! The entity registry is declared in code and built once at startup; the
//! metadata document is reflected from it on every request without touching
//! any row data.

pub mod catalog;
pub mod config;
pub mod error;
pub mod routes;
pub mod schema;
pub mod state;

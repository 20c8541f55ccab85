//! Zapline Storage - Database layer
//!
//! This crate provides the PostgreSQL storage layer for Zapline:
//! connection pooling, row models, and repositories.

pub mod db;
pub mod models;
pub mod repository;

pub use db::{Database, DatabasePool};
pub use models::*;
pub use repository::*;

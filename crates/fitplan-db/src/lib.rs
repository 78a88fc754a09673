//! Persistence layer for fitplan: connection config, pool, migrations,
//! row models and query functions for users and the usage audit log.

pub mod config;
pub mod models;
pub mod pool;
pub mod queries;

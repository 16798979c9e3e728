mod store;

pub use store::*;

/// SQL migration for the initial document-store schema
pub const MIGRATION_001_INITIAL: &str = include_str!("migrations/001_initial.sql");

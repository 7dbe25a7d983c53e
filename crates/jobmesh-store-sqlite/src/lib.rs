// jobmesh-store-sqlite/src/lib.rs
// ============================================================================
// Module: Jobmesh SQLite Store
// Description: SQLite-backed job and tenant repositories.
// Purpose: Persist jobs, upstream edges, run history, and tenant data.
// Dependencies: jobmesh-core, rusqlite, serde_json, thiserror
// ============================================================================

//! ## Overview
//! This crate provides [`SqliteJobStore`], a durable implementation of the
//! core [`jobmesh_core::JobRepository`] and [`jobmesh_core::TenantRepository`]
//! interfaces. Jobs are soft-deleted; edges and run history are kept in
//! separate tables.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::SqliteJobStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;

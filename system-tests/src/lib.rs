// system-tests/src/lib.rs
// ============================================================================
// Module: Jobmesh System Tests Library
// Description: Shared configuration for end-to-end registry scenarios.
// Purpose: Provide common settings for the system-test binaries.
// Dependencies: std
// ============================================================================

//! ## Overview
//! This crate hosts shared configuration used by the scenario binaries in
//! `system-tests/tests`. Scenarios run the job service against a real `SQLite`
//! store and fake peer registries served over HTTP.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

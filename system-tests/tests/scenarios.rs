// system-tests/tests/scenarios.rs
// ============================================================================
// Module: Registry Scenarios
// Description: Aggregates end-to-end registry suites.
// Purpose: Run resolution and lifecycle scenarios in one test binary.
// Dependencies: suites, helpers
// ============================================================================

//! ## Overview
//! Scenarios drive the wired job service against a temporary `SQLite`
//! database and, where external resolution is involved, fake peer
//! registries served over loopback HTTP.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::missing_docs_in_private_items,
    reason = "Test-only output and panic-based assertions are permitted."
)]

mod helpers;

#[path = "suites/lifecycle.rs"]
mod lifecycle;
#[path = "suites/resolution.rs"]
mod resolution;

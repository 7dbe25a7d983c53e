// system-tests/tests/helpers/mod.rs
// ============================================================================
// Module: Scenario Helpers
// Description: Shared fixtures for end-to-end registry scenarios.
// Purpose: Wire a persistent runtime and fake peer registries for suites.
// Dependencies: system-tests, jobmesh-config, tiny_http
// ============================================================================

#![allow(dead_code, reason = "Shared helpers may be unused in some suites.")]

pub mod harness;
pub mod peer;

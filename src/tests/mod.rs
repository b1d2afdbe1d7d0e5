//! Scenario test suites
//!
//! Unit tests live next to the code they cover. The suites here drive whole
//! blocks through the public API: declaring them, compiling their
//! interfaces, and running them the way an orchestrator would.

mod integration;
mod runtime_tests;

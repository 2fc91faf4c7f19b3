//! Test Module
//!
//! Test suite for the feedback analysis core.
//!
//! ## Test Categories
//! - `brain_tests`: Normalization, rule-based classification, scoring, language detection
//! - `pipeline_tests`: Orchestrator fallback, hybrid merge, caching and validation
//! - `integration_tests`: Full runs through the HTTP actor against a mocked service
//! - `chaos_test`: Cancellation, deadlines, rate-limit starvation and concurrent runs
//! - `mocks`: Scripted completion backends shared by the suites above

pub mod integration_tests;
pub mod chaos_test;

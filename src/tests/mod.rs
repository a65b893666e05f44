//! Crate-level scenario tests

mod analyzer_scenarios;
mod batch_scenarios;
mod poll_loop_tests;

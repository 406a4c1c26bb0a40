//! Integration tests for runwatch's journal tailing and run monitoring.
//!
//! These tests drive the real worker threads against real files in temp
//! directories: a stub engine writes the journal and step output the way the
//! external execution engine would, and the assertions read the shared run
//! state the way a presentation layer would.

pub mod helpers;
pub mod journal_flow;
pub mod run_flow;

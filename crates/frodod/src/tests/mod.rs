//! Test suites for the FRODO command daemon.

mod process_behaviour;
pub(crate) mod support;

//! Test suites for the tether command server.

mod shutdown_behaviour;
pub(crate) mod support;

//! Test suites for the EasyCluster server.

mod access_control_behaviour;
pub(crate) mod support;

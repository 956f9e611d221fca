//! Query-builder driver and connection implemented on an ORM client's raw primitives.

mod connection;
mod driver;

pub use connection::OrmConnection;
pub use driver::OrmDriver;

use serde::Deserialize;

/// Where row-returning statements are sent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Send plain reads to the client's read replica, when it has one. Mutations, including
    /// those with a returning clause, always go to the primary.
    pub with_read_replica: bool,
}

impl RoutingConfig {
    #[must_use]
    pub fn with_read_replica(mut self, enabled: bool) -> Self {
        self.with_read_replica = enabled;
        self
    }
}

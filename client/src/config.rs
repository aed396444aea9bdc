//! Repository configuration.

use std::time::Duration;
use tether_engine::EntityShape;

/// Configuration supplied at repository construction.
#[derive(Debug, Clone)]
pub struct RepositoryConfig {
    /// Shape used by the validator for creates and updates
    pub shape: EntityShape,
    /// When false, validation trivially succeeds
    pub validation: bool,
    /// Optional ceiling on each remote transport call; an overrun is
    /// treated as a transport failure and rolled back like one
    pub timeout: Option<Duration>,
}

impl RepositoryConfig {
    /// Configuration with validation enabled and no timeout.
    pub fn new(shape: EntityShape) -> Self {
        Self {
            shape,
            validation: true,
            timeout: None,
        }
    }

    /// Disable schema validation.
    pub fn without_validation(mut self) -> Self {
        self.validation = false;
        self
    }

    /// Bound each transport call by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

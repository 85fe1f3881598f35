//! Metric definition validation errors

use thiserror::Error;

/// Reasons a metric definition is refused by the index
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Tenant id 0 is reserved
    #[error("tenant id cannot be 0")]
    ZeroTenant,

    #[error("interval cannot be 0")]
    ZeroInterval,

    #[error("name cannot be empty")]
    EmptyName,

    #[error("invalid mtype: {0:?}")]
    InvalidMtype(String),

    /// Tag is not `key=value` or uses a prohibited character
    #[error("invalid tag format: {0:?}")]
    InvalidTag(String),

    #[error("duplicate tag key: {0:?}")]
    DuplicateTagKey(String),

    /// Key was computed for a different tenant than the definition names
    #[error("key tenant {key} does not match definition tenant {definition}")]
    TenantMismatch { key: u32, definition: u32 },

    #[error("invalid metric key: {0:?}")]
    InvalidKey(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(ValidationError::ZeroInterval.to_string(), "interval cannot be 0");
        assert_eq!(
            ValidationError::TenantMismatch { key: 1, definition: 2 }.to_string(),
            "key tenant 1 does not match definition tenant 2"
        );
    }
}

//! Metric identity and metadata
//!
//! - **key**: `MetricKey`, the hash + tenant identity of a definition
//! - **definition**: `MetricDefinition` and its validation rules
//! - **error**: `ValidationError`

pub mod definition;
pub mod error;
pub mod key;

pub use definition::{parse_tag, MetricDefinition, Mtype, NAME_TAG};
pub use error::ValidationError;
pub use key::MetricKey;

use thiserror::Error;

use crate::handle::NodeHandle;

/// Failures reported by tree models and the tree model manager.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DtmError {
    /// No tree model implementation (or no event source) could be resolved.
    #[error("tree model configuration error: {0}")]
    Configuration(String),
    #[error("node handle {0} does not resolve to a known tree model")]
    InvalidHandle(NodeHandle),
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),
    /// The build event stream was not well formed (unbalanced or out of order).
    #[error("malformed build event stream: {0}")]
    MalformedEvents(String),
}

impl DtmError {
    pub fn configuration(message: impl Into<String>) -> Self {
        DtmError::Configuration(message.into())
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        DtmError::UnsupportedOperation(message.into())
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        DtmError::MalformedEvents(message.into())
    }
}

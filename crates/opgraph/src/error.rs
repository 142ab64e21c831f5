use thiserror::Error;

/// Structured result codes surfaced by all graph-level APIs.
///
/// Construction errors are reported immediately and leave the graph
/// unchanged; pattern-match failure is not an error and never reaches this
/// type.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GraphError {
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },
    #[error("op {id} ({name}) failed schema verification")]
    InvalidOp { id: u64, name: String },
    #[error("invalid graph: {reason}")]
    InvalidGraph { reason: String },
    #[error("op id {id} already present in graph")]
    DuplicateId { id: u64 },
    #[error("allocation failed during {context}")]
    OutOfMemory { context: &'static str },
    #[error("{what} has no backend implementation")]
    Unsupported { what: String },
}

impl GraphError {
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        GraphError::InvalidArgument {
            reason: reason.into(),
        }
    }

    pub fn invalid_graph(reason: impl Into<String>) -> Self {
        GraphError::InvalidGraph {
            reason: reason.into(),
        }
    }

    pub fn unsupported(what: impl Into<String>) -> Self {
        GraphError::Unsupported { what: what.into() }
    }
}

pub type GraphResult<T> = Result<T, GraphError>;

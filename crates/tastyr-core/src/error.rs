//! Errors shared by the framer and the tree unpickler.

/// Result type for unpickling operations.
pub type Result<T> = std::result::Result<T, UnpickleError>;

/// Failure while decoding a TASTy artifact.
///
/// `Unsupported` and `Reserved` abort only the currently-completing symbol;
/// `Format` and `Cyclic` abort the whole artifact.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UnpickleError {
    /// A Scala 3 construct this reader refuses by policy.
    #[error("unsupported Scala 3 {construct}; found in {location}")]
    Unsupported { construct: String, location: String },

    /// A construct whose semantics are named by the format but not yet
    /// specified for this reader. Kept distinct from [`Unsupported`] so that
    /// assigning semantics later is purely additive.
    ///
    /// [`Unsupported`]: UnpickleError::Unsupported
    #[error("Scala 3 {construct} has no reader semantics yet; found in {location}")]
    Reserved { construct: String, location: String },

    /// Wire or shape violation: a bug in the producer, corrupt input, or a
    /// bug in this reader.
    #[error("corrupt TASTy: {0}")]
    Format(String),

    /// A completer re-entered itself.
    #[error("cyclic reference involving {0}")]
    Cyclic(String),
}

impl UnpickleError {
    pub fn unsupported(construct: impl Into<String>, location: impl Into<String>) -> Self {
        UnpickleError::Unsupported {
            construct: construct.into(),
            location: location.into(),
        }
    }

    pub fn reserved(construct: impl Into<String>, location: impl Into<String>) -> Self {
        UnpickleError::Reserved {
            construct: construct.into(),
            location: location.into(),
        }
    }

    pub fn format(msg: impl Into<String>) -> Self {
        UnpickleError::Format(msg.into())
    }

    pub fn cyclic(what: impl Into<String>) -> Self {
        UnpickleError::Cyclic(what.into())
    }

    /// Note that the failure happened while reading an annotation.
    pub fn inside_annotation(self) -> Self {
        match self {
            UnpickleError::Unsupported {
                construct,
                location,
            } => UnpickleError::Unsupported {
                construct: format!("{construct} within an annotation"),
                location,
            },
            UnpickleError::Reserved {
                construct,
                location,
            } => UnpickleError::Reserved {
                construct: format!("{construct} within an annotation"),
                location,
            },
            other => other,
        }
    }

    /// Whether the failure poisons only the current symbol rather than the
    /// whole artifact.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            UnpickleError::Unsupported { .. } | UnpickleError::Reserved { .. }
        )
    }
}

use thiserror::Error;

/// Errors raised while building or wiring a model.
///
/// Everything here is a parameter-validation failure. Once a `Model` has been
/// built, stepping it cannot fail.
#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown symbol `{symbol}` in vocabulary `{vocabulary}`")]
    UnknownSymbol { symbol: String, vocabulary: String },

    #[error("symbol `{symbol}` already defined in vocabulary `{vocabulary}`")]
    DuplicateSymbol { symbol: String, vocabulary: String },

    #[error("invalid symbol name `{0}` (must start with A-Z and contain only A-Z, a-z, 0-9, _)")]
    InvalidSymbolName(String),

    #[error("cannot parse `{expr}`: {reason}")]
    Parse { expr: String, reason: String },

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("invalid configuration: {0}")]
    Config(&'static str),

    #[error("invalid time constant: {0}")]
    InvalidTimeConstant(f32),

    #[error("node `{node}` cannot be used here (expected {expected})")]
    NodeKind { node: String, expected: &'static str },

    #[error("node name `{0}` is already taken")]
    DuplicateNode(String),

    #[error("unknown node id {0}")]
    UnknownNode(usize),

    #[error("unknown vocabulary id {0}")]
    UnknownVocabulary(usize),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_value() {
        let e = Error::UnknownSymbol {
            symbol: "Q".into(),
            vocabulary: "memory".into(),
        };
        assert_eq!(e.to_string(), "unknown symbol `Q` in vocabulary `memory`");

        let e = Error::DimensionMismatch {
            expected: 16,
            actual: 32,
        };
        assert_eq!(e.to_string(), "dimension mismatch: expected 16, got 32");
    }
}

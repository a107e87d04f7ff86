use thiserror::Error;

/// Failures of the numeric core.
///
/// Everything here points at a broken caller contract or a bad model
/// configuration; none of it is retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("invalid model configuration: {0}")]
    Config(String),

    #[error("batch contains no documents")]
    EmptyBatch,

    /// A row reached attention with nothing to attend over.
    #[error("sequence {index} has no valid positions; every row needs length >= 1")]
    EmptySequence { index: usize },

    #[error("sequence lengths must be sorted longest first, but row {index} is longer than row {}", .index - 1)]
    UnsortedLengths { index: usize },

    #[error("row {index} has length {length} but the padded time axis only has {max} steps")]
    LengthOverflow { index: usize, length: usize, max: usize },

    #[error("{what}: expected shape {expected:?}, got {actual:?}")]
    Shape { what: &'static str, expected: Vec<usize>, actual: Vec<usize> },

    #[error("batch row {row} points at document {doc_index}, but the batch has {num_docs} documents")]
    UnknownDocument { row: usize, doc_index: usize, num_docs: usize },

    #[error("document {doc_index} has no rows in the word-level batch")]
    MissingDocument { doc_index: usize },

    #[error("tensor data could not be read: {0}")]
    Data(String),
}

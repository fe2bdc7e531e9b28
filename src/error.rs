use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error returned by control-thread operations.
///
/// The render path never produces one of these.
#[derive(Debug, Error)]
pub enum Error {
    #[error("scale error: {0}")]
    Scale(#[from] ScaleError),

    #[error("bank error: {0}")]
    Bank(#[from] BankError),

    /// No preset exists at the requested bank/program.
    #[error("no preset at bank {bank}, program {program}")]
    InvalidSelection { bank: u8, program: u8 },

    #[error("unknown parameter '{0}'")]
    UnknownParameter(String),

    /// Persisted state could not be encoded or decoded.
    #[error("state error: {0}")]
    State(#[from] serde_json::Error),
}

/// A scale definition that could not be turned into a pitch table.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScaleError {
    #[error("scale has no intervals")]
    Empty,

    #[error("scale is missing its note count line")]
    MissingCount,

    #[error("invalid note count '{text}' on line {line}")]
    InvalidCount { line: usize, text: String },

    #[error("invalid interval '{text}' on line {line}")]
    InvalidInterval { line: usize, text: String },

    #[error("interval '{text}' on line {line} is not a positive ratio")]
    NonPositiveInterval { line: usize, text: String },

    #[error("scale declares {declared} notes but lists {found}")]
    CountMismatch { declared: usize, found: usize },
}

/// A bank whose records reference data that does not exist.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BankError {
    #[error("preset {preset:#06x} zone {zone} references missing sample {index}")]
    SampleIndexOutOfRange { preset: u16, zone: usize, index: usize },

    #[error("sample {index} declares more frames than it stores")]
    SampleTooShort { index: usize },

    #[error("stereo sample {index} has no linked channel data")]
    LinkedDataMissing { index: usize },
}

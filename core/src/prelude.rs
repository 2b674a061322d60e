/// System time in milliseconds as recorded by the sniffer host.
pub type Timestamp = u64;

/// UWB node address as carried in the ranging message header.
pub type Address = u16;

/// Per-sender message sequence number.
pub type SequenceNumber = u16;

/// Value the ranging algorithms log when a distance could not be computed.
pub const INVALID_SENTINEL: f64 = -1.0;

/// Common error type for every pipeline component.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("malformed line {line}: {reason}")]
    MalformedLine { line: usize, reason: String },
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("internal failure: {0}")]
    Internal(String),
}

impl PipelineError {
    pub fn malformed(line: usize, reason: impl Into<String>) -> Self {
        Self::MalformedLine {
            line,
            reason: reason.into(),
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;

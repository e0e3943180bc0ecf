/// Rejected configuration input.
///
/// Raised before any cleaning or segmentation starts; a request that hits
/// one of these produces no partial output.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Removal rules must be a table keyed by tag name, got {0}")]
    NotATable(String),
    #[error("Removal rule has an empty tag name")]
    EmptyTagName,
    #[error("Removal rule for <{tag}> must be a boolean, a class name or a list of class names")]
    InvalidRule { tag: String },
    #[error("Removal rule for <{tag}> lists a non-string class: {value}")]
    InvalidClass { tag: String, value: String },
    #[error("Segment breaking tag {0:?} is not a valid tag name")]
    InvalidBreakingTag(String),
}

/// The synthesizer's token stream does not match the text that was sent.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("Token {token_index} ({token:?}) not found in text of segment {segment_hash}")]
pub struct AlignmentError {
    pub segment_hash: String,
    pub token_index: usize,
    pub token: String,
}

#[derive(thiserror::Error, Debug)]
pub enum ReaderError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Alignment(#[from] AlignmentError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid config: {0}")]
    Config(String),
    #[error("Malformed synthesis response: {0}")]
    Synthesis(String),
    #[error("Audio error: {0}")]
    Audio(#[from] hound::Error),
}

impl ReaderError {
    /// Message suitable for showing to a listener.
    pub fn user_message(&self) -> &'static str {
        match self {
            ReaderError::Alignment(_) => "could not synchronize highlighting for this passage",
            _ => "could not prepare this content for speech",
        }
    }
}

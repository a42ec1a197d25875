/// Errors that can occur in the state model and codecs.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// Frames with different map dimensions cannot be diffed.
    #[error("frame dimension mismatch: {lhs_width}x{lhs_height} vs {rhs_width}x{rhs_height}")]
    DimensionMismatch {
        lhs_width: i32,
        lhs_height: i32,
        rhs_width: i32,
        rhs_height: i32,
    },

    /// A diff references a field id outside the fixed table.
    #[error("unknown unit field id {0}")]
    UnknownField(u8),

    /// A persisted stream contains a size field that cannot be honored.
    ///
    /// Size fields gate subsequent allocation, so this fails fast instead of
    /// attempting partial recovery.
    #[error("corrupt replay stream: {detail}")]
    Corrupt { detail: String },

    /// An I/O error occurred while reading or writing a persisted stream.
    #[error("replay I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StateError>;

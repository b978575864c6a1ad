#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("bad frame magic, expected \"FB\"")]
    InvalidMagic,

    #[error("frame payload of {size} bytes exceeds limit of {max}")]
    PayloadTooLarge { size: usize, max: usize },

    /// The read timeout expired first. Partial frame bytes stay buffered.
    #[error("timed out waiting for a frame")]
    Timeout,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// EOF, possibly in the middle of a frame.
    #[error("connection closed")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;

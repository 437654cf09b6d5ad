use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParserError {
    /// An offset/size pair points outside of the buffer it addresses, or overflows while being
    /// computed.
    #[error("Reading {size} bytes at offset {offset} exceeds the buffer length of {len}")]
    OutOfBounds { offset: usize, size: usize, len: usize },

    #[error("The file's magic value does not match any supported effect version {magic:#010x}")]
    InvalidMagicValue { magic: u32 },

    #[error("The file is violating the expected format, because: {reason}")]
    FormatError { reason: &'static str },

    /// Well-formed input using a feature this runtime does not support.
    #[error("The file uses an unsupported feature: {reason}")]
    NotImplemented { reason: &'static str },

    /// Represents all other cases of `std::io::Error`.
    #[error(transparent)]
    IOError(#[from] std::io::Error),

    #[error(transparent)]
    StringConversationError(#[from] std::ffi::IntoStringError),

    #[error(transparent)]
    UTF8ConversationError(#[from] std::string::FromUtf8Error),
}

pub mod common;
pub mod fx;

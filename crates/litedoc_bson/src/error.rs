//! Error types for the BSON crate.

use thiserror::Error;

/// Result type for BSON operations.
pub type BsonResult<T> = Result<T, BsonError>;

/// Errors that can occur while encoding, decoding, or parsing expressions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BsonError {
    /// A value could not be encoded.
    #[error("encoding failed: {message}")]
    EncodingFailed {
        /// Description of the encoding error.
        message: String,
    },

    /// Bytes did not form a valid BSON document.
    #[error("decoding failed: {message}")]
    DecodingFailed {
        /// Description of the decoding error.
        message: String,
    },

    /// Invalid UTF-8 in a string or key.
    #[error("invalid UTF-8 string")]
    InvalidUtf8,

    /// Unexpected end of input.
    #[error("unexpected end of input")]
    UnexpectedEof,

    /// Unknown element type byte.
    #[error("unsupported BSON element type 0x{type_byte:02x}")]
    UnsupportedType {
        /// The offending type byte.
        type_byte: u8,
    },

    /// A path expression could not be parsed.
    #[error("invalid expression `{expression}`: {message}")]
    InvalidExpression {
        /// The source text.
        expression: String,
        /// What went wrong.
        message: String,
    },

    /// An ObjectId string was not 24 hex digits.
    #[error("invalid ObjectId: {0}")]
    InvalidObjectId(String),
}

impl BsonError {
    /// Create an encoding failed error.
    pub fn encoding_failed(message: impl Into<String>) -> Self {
        Self::EncodingFailed {
            message: message.into(),
        }
    }

    /// Create a decoding failed error.
    pub fn decoding_failed(message: impl Into<String>) -> Self {
        Self::DecodingFailed {
            message: message.into(),
        }
    }

    /// Create an invalid expression error.
    pub fn invalid_expression(expression: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidExpression {
            expression: expression.into(),
            message: message.into(),
        }
    }
}

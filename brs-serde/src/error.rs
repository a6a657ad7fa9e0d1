use std::fmt::{self, Display};
use serde::{de, ser};
use brs::{EncodeError, DecodeError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// An error together with the position in the stream where it occurred.
#[derive(Debug)]
pub struct DeserializationError {
    inner: Error,
    at: usize,
}

impl DeserializationError {
    pub fn into_inner(self) -> Error {
        self.inner
    }

    pub fn position(&self) -> usize {
        self.at
    }
}

impl std::error::Error for DeserializationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.inner)
    }
}

impl Display for DeserializationError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{} at input position {}", self.inner, self.at)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    // Decode
    #[error("Decoding error: {0}")]
    Decode(#[from] DecodeError),
    #[error("Stream ended in the middle of a hunk")]
    Truncated,
    #[error("Unexpected {found}, expected {expected}")]
    Unexpected { expected: &'static str, found: String },
    #[error("brs is not self-describing, the type to deserialize must be known")]
    Any,
    #[error("Key `{0}` could not be parsed as {1}")]
    Key(String, &'static str),
    // Encode
    #[error("Encoding error: {0}")]
    Encode(#[from] EncodeError),
    #[error("The top level value must be a struct or a map, found {0}")]
    TopLevel(&'static str),
    #[error("A {0} cannot be nested inside an array item or a map entry")]
    Nested(&'static str),
    #[error("Map key must be a string, a char or an integer. Maybe use crate `serde_with` to transform the map into a vec of tuples")]
    KeyType,
    // Both
    #[error("{0}")]
    Message(String),
}

impl Error {
    pub fn at(self, at: usize) -> DeserializationError {
        DeserializationError { inner: self, at }
    }
}

impl ser::Error for Error {
    fn custom<T: Display>(msg: T) -> Self {
        Error::Message(msg.to_string())
    }
}

impl de::Error for Error {
    fn custom<T: Display>(msg: T) -> Self {
        Error::Message(msg.to_string())
    }
}

use thiserror::Error;

/// Which name of a hunk an error refers to.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum NameKind {
    /// The primary field name every hunk carries
    Name,
    /// The secondary key of a map item
    SubName,
}

impl NameKind {
    fn as_str(&self) -> &'static str {
        match *self {
            NameKind::Name    => "name",
            NameKind::SubName => "map name",
        }
    }
}

impl std::fmt::Display for NameKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while writing hunks. Every variant except `Io` is detected before the first byte of the offending
/// hunk is written.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("IO error {0}")]
    Io(#[from] std::io::Error),
    #[error("{0} cannot be empty")]
    EmptyName(NameKind),
    #[error("{kind} too large: {len} bytes exceeds maximum {max}")]
    NameTooLong { kind: NameKind, len: usize, max: usize },
    #[error("hunk too large: {0} bytes exceeds maximum {max}", max = crate::header::MAX_PAYLOAD_LEN)]
    PayloadTooLarge(usize),
    #[error("array index {0} exceeds maximum {max}", max = crate::header::MAX_INDEX)]
    IndexOutOfRange(usize),
    #[error("end of subfield without a matching start")]
    NoOpenSubfield,
}

impl EncodeError {
    /// True for the errors caused by a value that does not fit into a fixed-width field of the wire format.
    pub fn is_out_of_range(&self) -> bool {
        matches!(self, EncodeError::NameTooLong { .. } | EncodeError::PayloadTooLarge(_) | EncodeError::IndexOutOfRange(_))
    }
}

/// Errors raised while reading a stream. Running out of input is not an error but a `false` result of the reading
/// operation; these variants are protocol violations or API misuse.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("IO error {0}")]
    Io(#[from] std::io::Error),
    #[error("magic missing: stream is shorter than {} bytes", crate::header::MAGIC.len())]
    MagicMissing,
    #[error("magic unsupported: {0:02x?}")]
    MagicUnsupported([u8; 4]),
    #[error("unknown hunk type {0}")]
    UnknownKind(u8),
    #[error("map name cannot be empty")]
    EmptyMapName,
    #[error("hunk size {hunk} but you are trying to read {requested}")]
    SizeMismatch { hunk: usize, requested: usize },
    #[error("text payload is not valid Utf-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

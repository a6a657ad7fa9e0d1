//! Writing side of the wire format. The `Encoder` appends hunks to a borrowed writer in the order they are added and
//! never reorders or buffers them.

use crate::error::{EncodeError, NameKind};
use crate::header::{Header, Kind, MAGIC, MAX_INDEX, MAX_SUB_NAME_LEN};
use log::{debug, error, trace};
use std::io::Write;
use std::ops::{Deref, DerefMut};
use zerocopy::AsBytes;

/// The kind specific part between header and name
enum Key<'k> {
    None,
    Index(u16),
    SubName(&'k str),
}

impl<'k> Key<'k> {
    fn kind(&self) -> Kind {
        match *self {
            Key::None       => Kind::Field,
            Key::Index(_)   => Kind::ArrayItem,
            Key::SubName(_) => Kind::MapItem,
        }
    }
}

/// Used to encode `brs` streams. Every `add_*` method returns the amount of bytes written for the hunk.
pub struct Encoder<'w, W: Write> {
    writer: &'w mut W,
    /// Names of the subfields which have been started but not ended yet
    open: Vec<String>,
}

impl<'w, W: Write> Encoder<'w, W> {

    /// Starts a stream on the given writer by writing the magic.
    pub fn new(writer: &'w mut W) -> Result<Self, EncodeError> {
        writer.write_all(&MAGIC)?;
        Ok(Self { writer, open: Vec::new() })
    }

    /// Adds a plain field holding the bytes of `value`.
    pub fn add_value<T: AsBytes + ?Sized>(&mut self, name: &str, value: &T) -> Result<usize, EncodeError> {
        self.add_raw(name, value.as_bytes())
    }

    pub fn add_raw(&mut self, name: &str, payload: &[u8]) -> Result<usize, EncodeError> {
        self.write_hunk(name, Key::None, payload)
    }

    /// Adds the item at `index` of the array `name`.
    pub fn add_indexed<T: AsBytes + ?Sized>(&mut self, name: &str, index: usize, value: &T) -> Result<usize, EncodeError> {
        self.add_indexed_raw(name, index, value.as_bytes())
    }

    pub fn add_indexed_raw(&mut self, name: &str, index: usize, payload: &[u8]) -> Result<usize, EncodeError> {
        if index > MAX_INDEX {
            return Err(EncodeError::IndexOutOfRange(index));
        }
        self.write_hunk(name, Key::Index(index as u16), payload)
    }

    /// Adds the entry `sub_name` of the map `name`.
    pub fn add_keyed<T: AsBytes + ?Sized>(&mut self, name: &str, sub_name: &str, value: &T) -> Result<usize, EncodeError> {
        self.add_keyed_raw(name, sub_name, value.as_bytes())
    }

    pub fn add_keyed_raw(&mut self, name: &str, sub_name: &str, payload: &[u8]) -> Result<usize, EncodeError> {
        if sub_name.is_empty() {
            return Err(EncodeError::EmptyName(NameKind::SubName));
        }
        if sub_name.len() > MAX_SUB_NAME_LEN {
            return Err(EncodeError::NameTooLong { kind: NameKind::SubName, len: sub_name.len(), max: MAX_SUB_NAME_LEN });
        }
        self.write_hunk(name, Key::SubName(sub_name), payload)
    }

    /// Absent values are skipped entirely instead of being written as an empty field.
    pub fn add_optional<T: AsBytes + ?Sized>(&mut self, name: &str, value: Option<&T>) -> Result<usize, EncodeError> {
        match value {
            Some(value) => self.add_value(name, value),
            None        => Ok(0),
        }
    }

    /// Like `add_value`, but an empty string is treated as if the field was absent.
    pub fn add_value_if_not_empty(&mut self, name: &str, value: &str) -> Result<usize, EncodeError> {
        if value.is_empty() {
            Ok(0)
        } else {
            self.add_value(name, value)
        }
    }

    /// Opens a nested record. Every call must be paired with `end_subfield`; prefer `subfield` or `with_subfield`
    /// which guarantee that.
    pub fn start_subfield(&mut self, name: &str) -> Result<usize, EncodeError> {
        let c = self.write_hunk(name, Key::None, &[])?;
        debug!("start subfield {} at depth {}", name, self.open.len());
        self.open.push(name.to_owned());
        Ok(c)
    }

    /// Closes the innermost open record.
    pub fn end_subfield(&mut self) -> Result<usize, EncodeError> {
        let name = self.open.pop().ok_or(EncodeError::NoOpenSubfield)?;
        debug!("end subfield {} at depth {}", name, self.open.len());
        Header::END_OF_SUBFIELD.encode(self.writer)
    }

    /// Opens a nested record which gets closed when the returned guard goes out of scope.
    pub fn subfield<'e>(&'e mut self, name: &str) -> Result<Subfield<'e, 'w, W>, EncodeError> {
        let parent = self.depth();
        self.start_subfield(name)?;
        Ok(Subfield { encoder: self, parent })
    }

    /// Runs `f` inside a nested record. The record is closed even if `f` fails.
    pub fn with_subfield<T, E, F>(&mut self, name: &str, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Self) -> Result<T, E>,
        E: From<EncodeError>,
    {
        let mut guard = self.subfield(name)?;
        let result = f(&mut *guard);
        match result {
            Ok(value) => { guard.finish()?; Ok(value) },
            Err(e)    => Err(e),
        }
    }

    /// Number of subfields that have been started but not yet ended
    pub fn depth(&self) -> usize {
        self.open.len()
    }

    fn write_hunk(&mut self, name: &str, key: Key, payload: &[u8]) -> Result<usize, EncodeError> {
        let header = Header::new(key.kind(), name.len(), payload.len())?;
        trace!("{} {} with {} bytes", header.kind().name(), name, payload.len());
        let mut c = header.encode(self.writer)?;
        match key {
            Key::None => {},
            Key::Index(i) => {
                self.writer.write_all(&i.to_ne_bytes())?;
                c += std::mem::size_of::<u16>();
            },
            Key::SubName(sub_name) => {
                self.writer.write_all(&[sub_name.len() as u8])?;
                self.writer.write_all(sub_name.as_bytes())?;
                c += 1 + sub_name.len();
            },
        }
        self.writer.write_all(name.as_bytes())?;
        self.writer.write_all(payload)?;
        Ok(c + name.len() + payload.len())
    }

}

/// A nested record opened by `Encoder::subfield`. Dereferences to the encoder so fields can be added to the record.
/// Through `finish` or when it is dropped, it closes whatever is still open inside its record and the record itself,
/// but never a record that was open before it.
pub struct Subfield<'e, 'w, W: Write> {
    encoder: &'e mut Encoder<'w, W>,
    /// Depth of the encoder before the record was opened
    parent: usize,
}

impl<'e, 'w, W: Write> Subfield<'e, 'w, W> {

    /// Closes the record, reporting a failed write which `drop` could only log.
    pub fn finish(mut self) -> Result<usize, EncodeError> {
        self.close()
    }

    fn close(&mut self) -> Result<usize, EncodeError> {
        let mut c = 0;
        while self.encoder.depth() > self.parent {
            c += self.encoder.end_subfield()?;
        }
        Ok(c)
    }

}

impl<'e, 'w, W: Write> Deref for Subfield<'e, 'w, W> {
    type Target = Encoder<'w, W>;

    fn deref(&self) -> &Self::Target {
        self.encoder
    }
}

impl<'e, 'w, W: Write> DerefMut for Subfield<'e, 'w, W> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.encoder
    }
}

impl<'e, 'w, W: Write> Drop for Subfield<'e, 'w, W> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            error!("failed to close subfield: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Encoder;
    use crate::error::{EncodeError, NameKind};
    use crate::header::{MAGIC, MAX_NAME_LEN, MAX_SUB_NAME_LEN};

    #[test]
    fn magic_is_written_once() {
        let mut buf = Vec::new();
        let mut encoder = Encoder::new(&mut buf).unwrap();
        encoder.add_value("a", &1u8).unwrap();
        encoder.add_value("b", &2u8).unwrap();
        assert_eq!(&buf[..4], &MAGIC);
        assert_eq!(buf.len(), 4 + 2 * (4 + 1 + 1));
    }

    #[test]
    fn hunk_layout() {
        let mut buf = Vec::new();
        let mut encoder = Encoder::new(&mut buf).unwrap();
        assert_eq!(encoder.add_value("ab", &[7u8, 8, 9][..]).unwrap(), 4 + 2 + 3);
        assert_eq!(encoder.add_indexed("x", 258, &5u8).unwrap(), 4 + 2 + 1 + 1);
        assert_eq!(encoder.add_keyed("m", "key", "v").unwrap(), 4 + 1 + 3 + 1 + 1);
        let mut expected = MAGIC.to_vec();
        expected.extend_from_slice(&(0u32 | 2 << 2 | 3 << 9).to_ne_bytes());
        expected.extend_from_slice(b"ab");
        expected.extend_from_slice(&[7, 8, 9]);
        expected.extend_from_slice(&(1u32 | 1 << 2 | 1 << 9).to_ne_bytes());
        expected.extend_from_slice(&258u16.to_ne_bytes());
        expected.extend_from_slice(b"x");
        expected.push(5);
        expected.extend_from_slice(&(2u32 | 1 << 2 | 1 << 9).to_ne_bytes());
        expected.push(3);
        expected.extend_from_slice(b"key");
        expected.extend_from_slice(b"m");
        expected.extend_from_slice(b"v");
        assert_eq!(buf, expected);
    }

    #[test]
    fn empty_names() {
        let mut buf = Vec::new();
        let mut encoder = Encoder::new(&mut buf).unwrap();
        assert!(matches!(encoder.add_value("", &1u32), Err(EncodeError::EmptyName(NameKind::Name))));
        assert!(matches!(encoder.add_indexed("", 0, &1u32), Err(EncodeError::EmptyName(NameKind::Name))));
        assert!(matches!(encoder.add_keyed("", "k", &1u32), Err(EncodeError::EmptyName(NameKind::Name))));
        assert!(matches!(encoder.add_keyed("x", "", &1u32), Err(EncodeError::EmptyName(NameKind::SubName))));
        assert!(matches!(encoder.start_subfield(""), Err(EncodeError::EmptyName(NameKind::Name))));
        assert_eq!(buf.len(), 4);
    }

    #[test]
    fn out_of_range() {
        let mut buf = Vec::new();
        let mut encoder = Encoder::new(&mut buf).unwrap();
        let long = "n".repeat(MAX_NAME_LEN + 1);
        let e = encoder.add_value(&long, &0u8).unwrap_err();
        assert!(e.is_out_of_range());
        let e = encoder.add_indexed("x", 65_536, &0u8).unwrap_err();
        assert!(matches!(e, EncodeError::IndexOutOfRange(65_536)));
        assert!(encoder.add_indexed("x", 65_535, &0u8).is_ok());
        let long = "k".repeat(MAX_SUB_NAME_LEN + 1);
        let e = encoder.add_keyed("x", &long, &0u8).unwrap_err();
        assert!(matches!(e, EncodeError::NameTooLong { kind: NameKind::SubName, len: 256, .. }));
        assert!(encoder.add_keyed("x", &long[1..], &0u8).is_ok());
    }

    #[test]
    fn optional_fields() {
        let mut buf = Vec::new();
        let mut encoder = Encoder::new(&mut buf).unwrap();
        assert_eq!(encoder.add_optional::<u32>("none", None).unwrap(), 0);
        assert_eq!(encoder.add_value_if_not_empty("empty", "").unwrap(), 0);
        assert_eq!(buf.len(), 4);
        let mut encoder = Encoder { writer: &mut buf, open: Vec::new() };
        assert_eq!(encoder.add_optional("some", Some(&1u16)).unwrap(), 4 + 4 + 2);
        assert_eq!(encoder.add_value_if_not_empty("full", "x").unwrap(), 4 + 4 + 1);
        assert_eq!(buf.len(), 4 + 10 + 9);
    }

    #[test]
    fn unbalanced_end() {
        let mut buf = Vec::new();
        let mut encoder = Encoder::new(&mut buf).unwrap();
        assert!(matches!(encoder.end_subfield(), Err(EncodeError::NoOpenSubfield)));
        encoder.start_subfield("a").unwrap();
        assert_eq!(encoder.depth(), 1);
        assert_eq!(encoder.end_subfield().unwrap(), 4);
        assert_eq!(encoder.depth(), 0);
    }

    #[test]
    fn guard_closes_on_drop() {
        let mut buf = Vec::new();
        let mut encoder = Encoder::new(&mut buf).unwrap();
        {
            let mut meta = encoder.subfield("meta").unwrap();
            meta.add_value("k", "v").unwrap();
            assert_eq!(meta.depth(), 1);
        }
        assert_eq!(encoder.depth(), 0);
        assert_eq!(&buf[buf.len() - 4..], &[0, 0, 0, 0]);
    }

    #[test]
    fn guard_respects_manual_end() {
        let mut buf = Vec::new();
        let mut encoder = Encoder::new(&mut buf).unwrap();
        encoder.start_subfield("outer").unwrap();
        {
            let mut inner = encoder.subfield("inner").unwrap();
            inner.add_value("k", &1u8).unwrap();
            inner.end_subfield().unwrap();
            assert_eq!(inner.depth(), 1);
        }
        assert_eq!(encoder.depth(), 1);
        assert_eq!(encoder.subfield("again").unwrap().finish().unwrap(), 4);
        assert_eq!(encoder.depth(), 1);
        encoder.end_subfield().unwrap();
        // magic, "outer", "inner", "k", one end marker, "again" with its end marker, end of "outer"
        assert_eq!(buf.len(), 4 + (4 + 5) + (4 + 5) + (4 + 1 + 1) + 4 + (4 + 5) + 4 + 4);
    }

    #[test]
    fn guard_closes_nested_leftovers() {
        let mut buf = Vec::new();
        let mut encoder = Encoder::new(&mut buf).unwrap();
        {
            let mut outer = encoder.subfield("outer").unwrap();
            outer.start_subfield("left").unwrap();
            outer.start_subfield("open").unwrap();
        }
        assert_eq!(encoder.depth(), 0);
        assert_eq!(&buf[buf.len() - 12..], &[0; 12]);
    }

    #[test]
    fn guard_closes_on_error() {
        fn fill(encoder: &mut Encoder<Vec<u8>>) -> Result<(), EncodeError> {
            encoder.add_value("ok", &1u8)?;
            encoder.add_value("", &2u8)?;
            encoder.add_value("unreachable", &3u8)?;
            Ok(())
        }
        let mut buf = Vec::new();
        let mut encoder = Encoder::new(&mut buf).unwrap();
        let result = encoder.with_subfield("outer", fill);
        assert!(matches!(result, Err(EncodeError::EmptyName(_))));
        assert_eq!(encoder.depth(), 0);
        // magic, start hunk, "ok" hunk, end marker
        assert_eq!(buf.len(), 4 + (4 + 5) + (4 + 2 + 1) + 4);
        assert_eq!(&buf[buf.len() - 4..], &[0, 0, 0, 0]);
    }

}

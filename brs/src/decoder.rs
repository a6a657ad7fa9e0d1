//! Reading side of the wire format. The `Decoder` never buffers payloads: after a hunk's header, keys and name have
//! been read, the payload is still waiting in the source and has to be consumed with one of the typed `read_*`
//! functions before the next hunk is requested. Whatever is left unread gets skipped.

use crate::error::DecodeError;
use crate::header::{check_magic, Header, Kind, MAGIC};
use log::{debug, trace, warn};
use std::io::{self, Read};
use zerocopy::{AsBytes, FromBytes};

/// Identity of the hunk the decoder currently points at.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    /// The secondary name of a map item, empty for the other kinds
    pub sub_name: String,
    /// The index of an array item, `None` for the other kinds
    pub index: Option<u16>,
    /// Length of the payload in bytes
    pub size: usize,
}

impl Field {

    pub fn kind(&self) -> Kind {
        if self.index.is_some() {
            Kind::ArrayItem
        } else if !self.sub_name.is_empty() {
            Kind::MapItem
        } else {
            Kind::Field
        }
    }

}

/// What the decoder found at the current position of the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A hunk whose payload can now be read
    Hunk(Field),
    /// An end-of-subfield marker
    EndOfScope,
    /// The source ended cleanly at a hunk boundary
    EndOfStream,
    /// The source ended in the middle of a hunk
    Truncated,
}

/// Receives the hunks found by `Decoder::deserialize`. Returning `Ok(false)` stops decoding.
pub trait Handler<R: Read> {
    fn on_hunk(&mut self, decoder: &mut Decoder<R>, field: &Field) -> Result<bool, DecodeError>;
}

impl<R: Read, F> Handler<R> for F
where
    F: FnMut(&mut Decoder<R>, &Field) -> Result<bool, DecodeError>,
{
    fn on_hunk(&mut self, decoder: &mut Decoder<R>, field: &Field) -> Result<bool, DecodeError> {
        self(decoder, field)
    }
}

/// Used to decode `brs` streams from any reader. Pass `&mut reader` to keep ownership of the source.
pub struct Decoder<R: Read> {
    reader: R,
    /// Payload bytes of the current hunk which have not been read yet
    remaining: usize,
    /// Set once the source ran dry in the middle of a hunk
    truncated: bool,
    /// Bytes consumed from the source, including the magic
    pos: usize,
}

impl<R: Read> Decoder<R> {

    /// Binds to `reader` and validates the magic.
    pub fn new(reader: R) -> Result<Self, DecodeError> {
        let mut decoder = Self { reader, remaining: 0, truncated: false, pos: 0 };
        let mut magic = [0u8; MAGIC.len()];
        if decoder.read_full(&mut magic)? < magic.len() {
            return Err(DecodeError::MagicMissing);
        }
        check_magic(magic)?;
        debug!("stream magic {:02x?} accepted", magic);
        Ok(decoder)
    }

    /// Number of bytes consumed from the source so far
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Payload bytes of the current hunk which have not been read yet
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Feeds every hunk of the current scope to `handler`. Returns `Ok(true)` when the scope was closed by an
    /// end-of-subfield marker or the stream ended cleanly, and `Ok(false)` when the stream is truncated or the
    /// handler asked to stop. A handler decodes a nested record by calling `deserialize` again.
    pub fn deserialize<H: Handler<R> + ?Sized>(&mut self, handler: &mut H) -> Result<bool, DecodeError> {
        loop {
            match self.next_event()? {
                Event::Hunk(field) => {
                    if !handler.on_hunk(self, &field)? {
                        debug!("handler stopped at {} (position {})", field.name, self.pos);
                        return Ok(false);
                    }
                },
                Event::EndOfScope | Event::EndOfStream => return Ok(true),
                Event::Truncated => return Ok(false),
            }
        }
    }

    /// Same as `deserialize`, for closures.
    pub fn deserialize_with<F>(&mut self, mut f: F) -> Result<bool, DecodeError>
    where
        F: FnMut(&mut Self, &Field) -> Result<bool, DecodeError>,
    {
        self.deserialize(&mut f)
    }

    /// Advances to the next hunk, skipping the unread payload of the current one.
    pub fn next_event(&mut self) -> Result<Event, DecodeError> {
        if self.remaining > 0 {
            warn!("skipping {} unread payload bytes at position {}", self.remaining, self.pos);
            self.skip()?;
        }
        if self.truncated {
            return Ok(Event::Truncated);
        }
        let mut buf = [0u8; Header::SIZE];
        match self.read_full(&mut buf)? {
            0 => return Ok(Event::EndOfStream),
            Header::SIZE => {},
            n => return Ok(self.truncate(n, Header::SIZE)),
        }
        let header = Header::decode(buf)?;
        if header.is_end_of_subfield() {
            trace!("end of subfield at position {}", self.pos);
            return Ok(Event::EndOfScope);
        }
        let mut field = Field { size: header.payload_len(), ..Field::default() };
        match header.kind() {
            Kind::Field => {},
            Kind::ArrayItem => {
                let mut index = [0u8; 2];
                if !self.fill(&mut index)? {
                    return Ok(Event::Truncated);
                }
                field.index = Some(u16::from_ne_bytes(index));
            },
            Kind::MapItem => {
                let mut len = [0u8; 1];
                if !self.fill(&mut len)? {
                    return Ok(Event::Truncated);
                }
                if len[0] == 0 {
                    return Err(DecodeError::EmptyMapName);
                }
                match self.read_string(len[0] as usize)? {
                    Some(sub_name) => field.sub_name = sub_name,
                    None           => return Ok(Event::Truncated),
                }
            },
        }
        match self.read_string(header.name_len())? {
            Some(name) => field.name = name,
            None       => return Ok(Event::Truncated),
        }
        trace!("{} {} {:?} {:?} with {} bytes", header.kind().name(), field.name, field.index, field.sub_name, field.size);
        self.remaining = field.size;
        Ok(Event::Hunk(field))
    }

    /// Reads the payload into a plain-data value whose size must match the payload exactly.
    pub fn read_value<T: AsBytes + FromBytes + ?Sized>(&mut self, dst: &mut T) -> Result<bool, DecodeError> {
        self.check_size(std::mem::size_of_val(dst))?;
        self.read_payload(dst.as_bytes_mut())
    }

    /// Reads a one byte payload, any value but zero is true.
    pub fn read_bool(&mut self) -> Result<Option<bool>, DecodeError> {
        let mut byte = 0u8;
        Ok(match self.read_value(&mut byte)? {
            true  => Some(byte != 0),
            false => None,
        })
    }

    /// Replaces `dst` with the payload, which has to be valid Utf-8.
    pub fn read_text(&mut self, dst: &mut String) -> Result<bool, DecodeError> {
        let mut bytes = Vec::new();
        if !self.read_bytes(&mut bytes)? {
            return Ok(false);
        }
        *dst = String::from_utf8(bytes)?;
        Ok(true)
    }

    /// Replaces `dst` with the raw payload.
    pub fn read_bytes(&mut self, dst: &mut Vec<u8>) -> Result<bool, DecodeError> {
        dst.clear();
        dst.resize(self.remaining, 0);
        self.read_payload(dst)
    }

    /// Replaces `dst` with the elements of the payload, whose size has to be a multiple of the element size.
    pub fn read_sequence<T: AsBytes + FromBytes>(&mut self, dst: &mut Vec<T>) -> Result<bool, DecodeError> {
        let element = std::mem::size_of::<T>();
        if element == 0 || self.remaining % element != 0 {
            return Err(DecodeError::SizeMismatch { hunk: self.remaining, requested: element });
        }
        dst.clear();
        dst.resize_with(self.remaining / element, T::new_zeroed);
        self.read_payload(dst.as_mut_slice().as_bytes_mut())
    }

    /// Discards the rest of the payload.
    pub fn skip(&mut self) -> Result<bool, DecodeError> {
        let expected = self.remaining;
        let skipped = io::copy(&mut self.reader.by_ref().take(expected as u64), &mut io::sink())? as usize;
        self.pos += skipped;
        self.remaining = 0;
        if skipped < expected {
            self.truncate(skipped, expected);
            return Ok(false);
        }
        Ok(true)
    }

    fn check_size(&self, requested: usize) -> Result<(), DecodeError> {
        if requested == self.remaining {
            Ok(())
        } else {
            Err(DecodeError::SizeMismatch { hunk: self.remaining, requested })
        }
    }

    fn read_payload(&mut self, buf: &mut [u8]) -> Result<bool, DecodeError> {
        let n = self.read_full(buf)?;
        self.remaining -= n;
        if n < buf.len() {
            self.remaining = 0;
            self.truncate(n, buf.len());
            return Ok(false);
        }
        Ok(true)
    }

    fn read_string(&mut self, len: usize) -> Result<Option<String>, DecodeError> {
        let mut buf = vec![0u8; len];
        if !self.fill(&mut buf)? {
            return Ok(None);
        }
        Ok(Some(String::from_utf8(buf)?))
    }

    fn fill(&mut self, buf: &mut [u8]) -> Result<bool, DecodeError> {
        let n = self.read_full(buf)?;
        if n < buf.len() {
            self.truncate(n, buf.len());
            return Ok(false);
        }
        Ok(true)
    }

    fn truncate(&mut self, got: usize, expected: usize) -> Event {
        warn!("stream truncated at position {}: expected {} bytes, got {}", self.pos, expected, got);
        self.truncated = true;
        Event::Truncated
    }

    /// Reads until `buf` is full or the source is exhausted and returns the number of bytes read.
    fn read_full(&mut self, buf: &mut [u8]) -> Result<usize, DecodeError> {
        let mut n = 0;
        while n < buf.len() {
            match self.reader.read(&mut buf[n..]) {
                Ok(0) => break,
                Ok(c) => n += c,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        self.pos += n;
        Ok(n)
    }

}

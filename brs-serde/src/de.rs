use serde::de::{self, DeserializeOwned, DeserializeSeed, EnumAccess, IntoDeserializer, MapAccess, SeqAccess, VariantAccess, Visitor};
use serde::forward_to_deserialize_any;
use brs::{Decoder, Event, Field, Kind};
use std::io::Read;
use zerocopy::{AsBytes, FromBytes};

use crate::error::{DeserializationError, Error, Result};

/// Pulls hunks from a `Decoder` and hands them to serde. The top level value is read as a record whose fields are
/// the hunks of the outermost scope.
pub struct Deserializer<R: Read> {
    decoder: Decoder<R>,
    /// Event which has been looked at but not consumed yet
    peeked: Option<Event>,
}

pub fn from_bytes<T: DeserializeOwned>(bytes: &[u8]) -> std::result::Result<T, DeserializationError> {
    from_reader(bytes)
}

pub fn from_reader<T: DeserializeOwned, R: Read>(reader: R) -> std::result::Result<T, DeserializationError> {
    let mut deserializer = Deserializer::new(reader).map_err(|e| e.at(0))?;
    T::deserialize(&mut deserializer).map_err(|e| e.at(deserializer.position()))
}

impl<R: Read> Deserializer<R> {

    /// Validates the magic of the stream.
    pub fn new(reader: R) -> Result<Self> {
        Ok(Deserializer { decoder: Decoder::new(reader)?, peeked: None })
    }

    /// Bytes consumed from the source so far
    pub fn position(&self) -> usize {
        self.decoder.position()
    }

    pub fn into_inner(self) -> R {
        self.decoder.into_inner()
    }

    fn next(&mut self) -> Result<Event> {
        match self.peeked.take() {
            Some(event) => Ok(event),
            None        => Ok(self.decoder.next_event()?),
        }
    }

    /// Only valid once the payload of the current hunk has been consumed
    fn peek(&mut self) -> Result<&Event> {
        let event = match self.peeked.take() {
            Some(event) => event,
            None        => self.decoder.next_event()?,
        };
        Ok(self.peeked.insert(event))
    }

    fn next_hunk(&mut self) -> Result<Field> {
        match self.next()? {
            Event::Hunk(field) => Ok(field),
            Event::Truncated   => Err(Error::Truncated),
            other              => Err(unexpected("hunk", &other)),
        }
    }

    /// Consumes the end-of-subfield marker of an enum subfield.
    fn end_scope(&mut self) -> Result<()> {
        match self.next()? {
            Event::EndOfScope | Event::EndOfStream => Ok(()),
            Event::Truncated                       => Err(Error::Truncated),
            other                                  => Err(unexpected("end of subfield", &other)),
        }
    }

}

fn describe(event: &Event) -> String {
    match event {
        Event::Hunk(field) => describe_field(field),
        Event::EndOfScope  => "end of subfield".to_string(),
        Event::EndOfStream => "end of stream".to_string(),
        Event::Truncated   => "truncated hunk".to_string(),
    }
}

fn describe_field(field: &Field) -> String {
    format!("{} `{}` of {} bytes", field.kind().name(), field.name, field.size)
}

fn unexpected(expected: &'static str, found: &Event) -> Error {
    Error::Unexpected { expected, found: describe(found) }
}

impl<'de, 'a, R: Read> de::Deserializer<'de> for &'a mut Deserializer<R> {
    type Error = Error;

    fn deserialize_any<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value> {
        Err(Error::TopLevel("value of unknown type"))
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_some(self)
    }

    fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_unit()
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(self, _name: &'static str, visitor: V) -> Result<V::Value> {
        self.deserialize_unit(visitor)
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(self, _name: &'static str, visitor: V) -> Result<V::Value> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_map(RecordAccess::new(self, true))
    }

    fn deserialize_struct<V: Visitor<'de>>(self, _name: &'static str, _fields: &'static [&'static str], visitor: V) -> Result<V::Value> {
        self.deserialize_map(visitor)
    }

    fn is_human_readable(&self) -> bool {
        false
    }

    forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf seq tuple tuple_struct enum identifier ignored_any
    }
}

/// The hunks of one scope, keyed by their names
struct RecordAccess<'a, R: Read> {
    de: &'a mut Deserializer<R>,
    /// The outermost scope ends with the stream, not with an end marker
    top: bool,
    field: Option<Field>,
}

impl<'a, R: Read> RecordAccess<'a, R> {
    fn new(de: &'a mut Deserializer<R>, top: bool) -> Self {
        Self { de, top, field: None }
    }
}

impl<'de, 'a, R: Read> MapAccess<'de> for RecordAccess<'a, R> {
    type Error = Error;

    fn next_key_seed<K: DeserializeSeed<'de>>(&mut self, seed: K) -> Result<Option<K::Value>> {
        match self.de.next()? {
            Event::Hunk(field) => {
                let key = seed.deserialize(KeyDeserializer(field.name.clone()))?;
                self.field = Some(field);
                Ok(Some(key))
            },
            Event::EndOfScope if self.top => Err(unexpected("hunk", &Event::EndOfScope)),
            Event::EndOfScope | Event::EndOfStream => Ok(None),
            Event::Truncated => Err(Error::Truncated),
        }
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value> {
        let field = self.field.take().ok_or_else(|| Error::Message("value requested before its key".to_string()))?;
        seed.deserialize(HunkDeserializer { de: &mut *self.de, field })
    }
}

/// Consecutive array items sharing one name
struct ItemAccess<'a, R: Read> {
    de: &'a mut Deserializer<R>,
    name: String,
    first: Option<Field>,
}

impl<'de, 'a, R: Read> SeqAccess<'de> for ItemAccess<'a, R> {
    type Error = Error;

    fn next_element_seed<T: DeserializeSeed<'de>>(&mut self, seed: T) -> Result<Option<T::Value>> {
        let field = match self.first.take() {
            Some(field) => field,
            None => {
                let name = &self.name;
                let more = matches!(self.de.peek()?, Event::Hunk(f) if f.index.is_some() && &f.name == name);
                if !more {
                    return Ok(None);
                }
                self.de.next_hunk()?
            },
        };
        seed.deserialize(HunkDeserializer { de: &mut *self.de, field }).map(Some)
    }
}

/// Consecutive map items sharing one name
struct EntryAccess<'a, R: Read> {
    de: &'a mut Deserializer<R>,
    name: String,
    first: Option<Field>,
    current: Option<Field>,
}

impl<'de, 'a, R: Read> MapAccess<'de> for EntryAccess<'a, R> {
    type Error = Error;

    fn next_key_seed<K: DeserializeSeed<'de>>(&mut self, seed: K) -> Result<Option<K::Value>> {
        let field = match self.first.take() {
            Some(field) => field,
            None => {
                let name = &self.name;
                let more = matches!(self.de.peek()?, Event::Hunk(f) if f.kind() == Kind::MapItem && &f.name == name);
                if !more {
                    return Ok(None);
                }
                self.de.next_hunk()?
            },
        };
        let key = seed.deserialize(KeyDeserializer(field.sub_name.clone()))?;
        self.current = Some(field);
        Ok(Some(key))
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value> {
        let field = self.current.take().ok_or_else(|| Error::Message("value requested before its key".to_string()))?;
        seed.deserialize(HunkDeserializer { de: &mut *self.de, field })
    }
}

/// Deserializes the value of the hunk the decoder currently points at.
struct HunkDeserializer<'a, R: Read> {
    de: &'a mut Deserializer<R>,
    field: Field,
}

impl<'a, R: Read> HunkDeserializer<'a, R> {

    fn scalar<T: AsBytes + FromBytes>(self) -> Result<T> {
        let mut value = T::new_zeroed();
        if !self.de.decoder.read_value(&mut value)? {
            return Err(Error::Truncated);
        }
        Ok(value)
    }

    fn text(self) -> Result<String> {
        let mut text = String::new();
        if !self.de.decoder.read_text(&mut text)? {
            return Err(Error::Truncated);
        }
        Ok(text)
    }

    fn bytes(self) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        if !self.de.decoder.read_bytes(&mut bytes)? {
            return Err(Error::Truncated);
        }
        Ok(bytes)
    }

    /// A zero sized plain field opens a subfield
    fn is_subfield(&self) -> bool {
        self.field.kind() == Kind::Field && self.field.size == 0
    }

    fn mismatch(&self, expected: &'static str) -> Error {
        Error::Unexpected { expected, found: describe_field(&self.field) }
    }

}

impl<'de, 'a, R: Read> de::Deserializer<'de> for HunkDeserializer<'a, R> {
    type Error = Error;

    fn deserialize_any<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value> {
        Err(Error::Any)
    }

    fn deserialize_bool<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self.de.decoder.read_bool()? {
            Some(v) => visitor.visit_bool(v),
            None    => Err(Error::Truncated),
        }
    }

    fn deserialize_i8<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_i8(self.scalar()?)
    }

    fn deserialize_i16<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_i16(self.scalar()?)
    }

    fn deserialize_i32<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_i32(self.scalar()?)
    }

    fn deserialize_i64<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_i64(self.scalar()?)
    }

    fn deserialize_i128<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_i128(self.scalar()?)
    }

    fn deserialize_u8<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_u8(self.scalar()?)
    }

    fn deserialize_u16<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_u16(self.scalar()?)
    }

    fn deserialize_u32<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_u32(self.scalar()?)
    }

    fn deserialize_u64<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_u64(self.scalar()?)
    }

    fn deserialize_u128<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_u128(self.scalar()?)
    }

    fn deserialize_f32<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_f32(self.scalar()?)
    }

    fn deserialize_f64<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_f64(self.scalar()?)
    }

    fn deserialize_char<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        let text = self.text()?;
        let mut chars = text.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => visitor.visit_char(c),
            _               => Err(Error::Unexpected { expected: "char", found: format!("{:?}", text) }),
        }
    }

    fn deserialize_str<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_string(self.text()?)
    }

    fn deserialize_string<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.deserialize_str(visitor)
    }

    fn deserialize_bytes<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_byte_buf(self.bytes()?)
    }

    fn deserialize_byte_buf<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.deserialize_bytes(visitor)
    }

    /// Absent fields never reach a deserializer, so a present one is always `Some`
    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_some(self)
    }

    fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        if self.field.size != 0 {
            return Err(self.mismatch("empty field"));
        }
        visitor.visit_unit()
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(self, _name: &'static str, visitor: V) -> Result<V::Value> {
        self.deserialize_unit(visitor)
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(self, _name: &'static str, visitor: V) -> Result<V::Value> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        if self.field.index.is_none() {
            return Err(self.mismatch("array item"));
        }
        let name = self.field.name.clone();
        visitor.visit_seq(ItemAccess { de: self.de, name, first: Some(self.field) })
    }

    fn deserialize_tuple<V: Visitor<'de>>(self, _len: usize, visitor: V) -> Result<V::Value> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(self, _name: &'static str, _len: usize, visitor: V) -> Result<V::Value> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        if self.field.kind() != Kind::MapItem {
            return Err(self.mismatch("map item"));
        }
        let name = self.field.name.clone();
        visitor.visit_map(EntryAccess { de: self.de, name, first: Some(self.field), current: None })
    }

    fn deserialize_struct<V: Visitor<'de>>(self, _name: &'static str, _fields: &'static [&'static str], visitor: V) -> Result<V::Value> {
        if !self.is_subfield() {
            return Err(self.mismatch("subfield"));
        }
        visitor.visit_map(RecordAccess::new(self.de, false))
    }

    fn deserialize_enum<V: Visitor<'de>>(self, _name: &'static str, _variants: &'static [&'static str], visitor: V) -> Result<V::Value> {
        if !self.is_subfield() {
            return visitor.visit_enum(self.text()?.into_deserializer());
        }
        let field = self.de.next_hunk()?;
        visitor.visit_enum(VariantDeserializer { de: self.de, field })
    }

    fn deserialize_identifier<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.deserialize_str(visitor)
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        if self.is_subfield() {
            return visitor.visit_map(RecordAccess::new(self.de, false));
        }
        self.de.decoder.skip()?;
        visitor.visit_unit()
    }

    fn is_human_readable(&self) -> bool {
        false
    }
}

/// The first hunk inside an enum subfield, named after the variant
struct VariantDeserializer<'a, R: Read> {
    de: &'a mut Deserializer<R>,
    field: Field,
}

impl<'de, 'a, R: Read> EnumAccess<'de> for VariantDeserializer<'a, R> {
    type Error = Error;
    type Variant = Self;

    fn variant_seed<V: DeserializeSeed<'de>>(self, seed: V) -> Result<(V::Value, Self::Variant)> {
        let variant = seed.deserialize(KeyDeserializer(self.field.name.clone()))?;
        Ok((variant, self))
    }
}

impl<'de, 'a, R: Read> VariantAccess<'de> for VariantDeserializer<'a, R> {
    type Error = Error;

    fn unit_variant(self) -> Result<()> {
        self.de.end_scope()
    }

    fn newtype_variant_seed<T: DeserializeSeed<'de>>(self, seed: T) -> Result<T::Value> {
        let VariantDeserializer { de: inner, field } = self;
        let value = seed.deserialize(HunkDeserializer { de: &mut *inner, field })?;
        inner.end_scope()?;
        Ok(value)
    }

    fn tuple_variant<V: Visitor<'de>>(self, _len: usize, visitor: V) -> Result<V::Value> {
        let VariantDeserializer { de: inner, field } = self;
        let value = de::Deserializer::deserialize_seq(HunkDeserializer { de: &mut *inner, field }, visitor)?;
        inner.end_scope()?;
        Ok(value)
    }

    fn struct_variant<V: Visitor<'de>>(self, fields: &'static [&'static str], visitor: V) -> Result<V::Value> {
        let VariantDeserializer { de: inner, field } = self;
        let value = de::Deserializer::deserialize_struct(HunkDeserializer { de: &mut *inner, field }, "", fields, visitor)?;
        inner.end_scope()?;
        Ok(value)
    }
}

/// Names, map keys and variant names. Integers are parsed from their decimal form.
struct KeyDeserializer(String);

macro_rules! parse_key {
    ($($method:ident => $visit:ident($ty:ty),)*) => {
        $(fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
            match self.0.parse::<$ty>() {
                Ok(v)  => visitor.$visit(v),
                Err(_) => Err(Error::Key(self.0, stringify!($ty))),
            }
        })*
    };
}

impl<'de> de::Deserializer<'de> for KeyDeserializer {
    type Error = Error;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_string(self.0)
    }

    parse_key! {
        deserialize_i8 => visit_i8(i8),
        deserialize_i16 => visit_i16(i16),
        deserialize_i32 => visit_i32(i32),
        deserialize_i64 => visit_i64(i64),
        deserialize_u8 => visit_u8(u8),
        deserialize_u16 => visit_u16(u16),
        deserialize_u32 => visit_u32(u32),
        deserialize_u64 => visit_u64(u64),
        deserialize_char => visit_char(char),
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(self, _name: &'static str, visitor: V) -> Result<V::Value> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_enum<V: Visitor<'de>>(self, _name: &'static str, _variants: &'static [&'static str], visitor: V) -> Result<V::Value> {
        visitor.visit_enum(self.0.into_deserializer())
    }

    forward_to_deserialize_any! {
        bool i128 u128 f32 f64 str string bytes byte_buf option unit unit_struct
        seq tuple tuple_struct map struct identifier ignored_any
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use brs::{Encoder, MAGIC};
    use super::from_bytes;
    use crate::error::Error;

    fn stream(f: impl FnOnce(&mut Encoder<Vec<u8>>)) -> Vec<u8> {
        let mut buf = Vec::new();
        let mut encoder = Encoder::new(&mut buf).unwrap();
        f(&mut encoder);
        buf
    }

    #[derive(Deserialize, Debug, PartialEq)]
    struct Reading {
        sensor: String,
        value: f64,
        samples: Vec<u16>,
    }

    #[test]
    fn hand_written_stream() {
        let buf = stream(|e| {
            e.add_value("sensor", "t1").unwrap();
            e.add_value("value", &21.5f64).unwrap();
            e.add_indexed("samples", 0, &3u16).unwrap();
            e.add_indexed("samples", 1, &4u16).unwrap();
        });
        let reading: Reading = from_bytes(&buf).unwrap();
        assert_eq!(reading, Reading { sensor: "t1".into(), value: 21.5, samples: vec![3, 4] });
    }

    #[test]
    fn unknown_fields_are_skipped() {
        let buf = stream(|e| {
            e.add_value("extra", &[1u8, 2, 3][..]).unwrap();
            e.add_value("sensor", "t1").unwrap();
            e.add_keyed("tags", "a", "b").unwrap();
            e.add_value("value", &0f64).unwrap();
            e.add_indexed("samples", 0, &1u16).unwrap();
        });
        let reading: Reading = from_bytes(&buf).unwrap();
        assert_eq!(reading.samples, [1]);
    }

    #[test]
    fn size_mismatch_reports_position() {
        let buf = stream(|e| {
            e.add_value("sensor", "t1").unwrap();
            e.add_value("value", &1f32).unwrap();
        });
        let err = from_bytes::<Reading>(&buf).unwrap_err();
        // magic, "sensor" hunk and the header and name of "value"
        assert_eq!(err.position(), 4 + 4 + 6 + 2 + 4 + 5);
        assert!(matches!(err.into_inner(), Error::Decode(brs::DecodeError::SizeMismatch { hunk: 4, requested: 8 })));
    }

    #[test]
    fn truncated_payload() {
        let mut buf = stream(|e| { e.add_value("sensor", "t1").unwrap(); });
        buf.pop();
        let err = from_bytes::<Reading>(&buf).unwrap_err();
        assert!(matches!(err.into_inner(), Error::Truncated));
    }

    #[test]
    fn stray_end_marker() {
        let mut buf = stream(|e| { e.add_value("sensor", "t1").unwrap(); });
        buf.extend_from_slice(&[0; 4]);
        let err = from_bytes::<Reading>(&buf).unwrap_err();
        assert!(matches!(err.into_inner(), Error::Unexpected { expected: "hunk", .. }));
    }

    #[test]
    fn bad_magic() {
        let err = from_bytes::<Reading>(b"BRX\x01").unwrap_err();
        assert_eq!(err.position(), 0);
        assert!(from_bytes::<Reading>(&MAGIC).is_err());
    }

    #[test]
    fn not_self_describing() {
        let buf = stream(|e| { e.add_value("x", &1u8).unwrap(); });
        let ignored = from_bytes::<std::collections::HashMap<String, serde::de::IgnoredAny>>(&buf).unwrap();
        assert_eq!(ignored.len(), 1);

        #[derive(Deserialize, Debug)]
        #[serde(untagged)]
        enum Untagged {
            Byte(#[allow(dead_code)] u8),
        }

        #[derive(Deserialize, Debug)]
        struct Wrapper {
            #[allow(dead_code)]
            x: Untagged,
        }

        assert!(matches!(from_bytes::<Wrapper>(&buf).unwrap_err().into_inner(), Error::Any));
    }
}

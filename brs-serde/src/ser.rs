use serde::{ser, Serialize};
use brs::Encoder;
use std::io::Write;

use crate::error::{Error, Result};

/// Serializes the top level value, which must be a struct or a map. Its fields become the top level hunks of the
/// stream.
pub struct Serializer<'w, W: Write> {
    encoder: Encoder<'w, W>,
}

pub fn to_bytes<T: ?Sized + Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    to_writer(&mut buf, value)?;
    Ok(buf)
}

pub fn to_writer<T: ?Sized + Serialize, W: Write>(mut writer: W, value: &T) -> Result<()> {
    let mut serializer = Serializer::new(&mut writer)?;
    value.serialize(&mut serializer)
}

impl<'w, W: Write> Serializer<'w, W> {
    /// Writes the magic and prepares to serialize one value.
    pub fn new(writer: &'w mut W) -> Result<Self> {
        Ok(Serializer { encoder: Encoder::new(writer)? })
    }

    pub fn into_encoder(self) -> Encoder<'w, W> {
        self.encoder
    }

    fn record(&mut self) -> Compound<'_, 'w, W> {
        Compound { encoder: &mut self.encoder, name: None, index: 0, key: None, closes: 0 }
    }
}

macro_rules! reject {
    ($($method:ident($($arg:ty),*) => $what:expr,)*) => {
        $(fn $method(self, $(_: $arg),*) -> Result<()> {
            Err(Error::TopLevel($what))
        })*
    };
}

impl<'a, 'w, W: Write> ser::Serializer for &'a mut Serializer<'w, W> {

    type Ok = ();
    type Error = Error;
    type SerializeSeq = ser::Impossible<(), Error>;
    type SerializeTuple = ser::Impossible<(), Error>;
    type SerializeTupleStruct = ser::Impossible<(), Error>;
    type SerializeTupleVariant = ser::Impossible<(), Error>;
    type SerializeMap = Compound<'a, 'w, W>;
    type SerializeStruct = Compound<'a, 'w, W>;
    type SerializeStructVariant = ser::Impossible<(), Error>;

    reject! {
        serialize_bool(bool) => "bool",
        serialize_i8(i8) => "integer",
        serialize_i16(i16) => "integer",
        serialize_i32(i32) => "integer",
        serialize_i64(i64) => "integer",
        serialize_u8(u8) => "integer",
        serialize_u16(u16) => "integer",
        serialize_u32(u32) => "integer",
        serialize_u64(u64) => "integer",
        serialize_f32(f32) => "float",
        serialize_f64(f64) => "float",
        serialize_char(char) => "char",
        serialize_str(&str) => "string",
        serialize_bytes(&[u8]) => "bytes",
        serialize_unit_variant(&'static str, u32, &'static str) => "enum",
    }

    fn serialize_none(self) -> Result<()> {
        Ok(())
    }

    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> Result<()> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<()> {
        Ok(())
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<()> {
        self.serialize_unit()
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(self, _name: &'static str, value: &T) -> Result<()> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(self, _name: &'static str, _index: u32, _variant: &'static str, _value: &T) -> Result<()> {
        Err(Error::TopLevel("enum"))
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Self::SerializeSeq> {
        Err(Error::TopLevel("sequence"))
    }

    fn serialize_tuple(self, _len: usize) -> Result<Self::SerializeTuple> {
        Err(Error::TopLevel("tuple"))
    }

    fn serialize_tuple_struct(self, _name: &'static str, _len: usize) -> Result<Self::SerializeTupleStruct> {
        Err(Error::TopLevel("tuple struct"))
    }

    fn serialize_tuple_variant(self, _name: &'static str, _index: u32, _variant: &'static str, _len: usize) -> Result<Self::SerializeTupleVariant> {
        Err(Error::TopLevel("enum"))
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap> {
        Ok(self.record())
    }

    fn serialize_struct(self, _name: &'static str, _len: usize) -> Result<Self::SerializeStruct> {
        Ok(self.record())
    }

    fn serialize_struct_variant(self, _name: &'static str, _index: u32, _variant: &'static str, _len: usize) -> Result<Self::SerializeStructVariant> {
        Err(Error::TopLevel("enum"))
    }

    fn is_human_readable(&self) -> bool {
        false
    }

}

/// Where a value ends up in the stream
#[derive(Clone, Copy)]
enum Slot<'a> {
    Field,
    Item(usize),
    Entry(&'a str),
}

/// Serializes the value of one named field.
pub struct FieldSerializer<'a, 'w, W: Write> {
    encoder: &'a mut Encoder<'w, W>,
    name: &'a str,
    slot: Slot<'a>,
}

impl<'a, 'w, W: Write> FieldSerializer<'a, 'w, W> {

    /// An empty plain field would read back as the start of a subfield, so it is left out like `None`
    fn emit(self, payload: &[u8]) -> Result<()> {
        match self.slot {
            Slot::Field if payload.is_empty() => 0,
            Slot::Field    => self.encoder.add_raw(self.name, payload)?,
            Slot::Item(i)  => self.encoder.add_indexed_raw(self.name, i, payload)?,
            Slot::Entry(k) => self.encoder.add_keyed_raw(self.name, k, payload)?,
        };
        Ok(())
    }

    /// Only plain fields can hold records, arrays and maps
    fn ensure_field(&self, what: &'static str) -> Result<()> {
        match self.slot {
            Slot::Field => Ok(()),
            _           => Err(Error::Nested(what)),
        }
    }

    fn compound(self, name: Option<String>, closes: usize) -> Compound<'a, 'w, W> {
        Compound { encoder: self.encoder, name, index: 0, key: None, closes }
    }

}

impl<'a, 'w, W: Write> ser::Serializer for FieldSerializer<'a, 'w, W> {

    type Ok = ();
    type Error = Error;
    type SerializeSeq = Compound<'a, 'w, W>;
    type SerializeTuple = Compound<'a, 'w, W>;
    type SerializeTupleStruct = Compound<'a, 'w, W>;
    type SerializeTupleVariant = Compound<'a, 'w, W>;
    type SerializeMap = Compound<'a, 'w, W>;
    type SerializeStruct = Compound<'a, 'w, W>;
    type SerializeStructVariant = Compound<'a, 'w, W>;

    fn serialize_bool(self, v: bool) -> Result<()> {
        self.emit(&[v as u8])
    }

    fn serialize_i8(self, v: i8) -> Result<()> {
        self.emit(&v.to_ne_bytes())
    }

    fn serialize_i16(self, v: i16) -> Result<()> {
        self.emit(&v.to_ne_bytes())
    }

    fn serialize_i32(self, v: i32) -> Result<()> {
        self.emit(&v.to_ne_bytes())
    }

    fn serialize_i64(self, v: i64) -> Result<()> {
        self.emit(&v.to_ne_bytes())
    }

    fn serialize_i128(self, v: i128) -> Result<()> {
        self.emit(&v.to_ne_bytes())
    }

    fn serialize_u8(self, v: u8) -> Result<()> {
        self.emit(&[v])
    }

    fn serialize_u16(self, v: u16) -> Result<()> {
        self.emit(&v.to_ne_bytes())
    }

    fn serialize_u32(self, v: u32) -> Result<()> {
        self.emit(&v.to_ne_bytes())
    }

    fn serialize_u64(self, v: u64) -> Result<()> {
        self.emit(&v.to_ne_bytes())
    }

    fn serialize_u128(self, v: u128) -> Result<()> {
        self.emit(&v.to_ne_bytes())
    }

    fn serialize_f32(self, v: f32) -> Result<()> {
        self.emit(&v.to_ne_bytes())
    }

    fn serialize_f64(self, v: f64) -> Result<()> {
        self.emit(&v.to_ne_bytes())
    }

    fn serialize_char(self, v: char) -> Result<()> {
        self.emit(v.encode_utf8(&mut [0u8; 4]).as_bytes())
    }

    fn serialize_str(self, v: &str) -> Result<()> {
        self.emit(v.as_bytes())
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<()> {
        self.emit(v)
    }

    /// Absent values leave no trace in the stream. Array items and map entries cannot be left out without losing
    /// their position or key.
    fn serialize_none(self) -> Result<()> {
        match self.slot {
            Slot::Field => Ok(()),
            _           => Err(Error::Nested("missing value")),
        }
    }

    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> Result<()> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<()> {
        self.emit(&[])
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<()> {
        self.serialize_unit()
    }

    fn serialize_unit_variant(self, _name: &'static str, _index: u32, variant: &'static str) -> Result<()> {
        self.emit(variant.as_bytes())
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(self, _name: &'static str, value: &T) -> Result<()> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(self, _name: &'static str, _index: u32, variant: &'static str, value: &T) -> Result<()> {
        self.ensure_field("enum")?;
        self.encoder.start_subfield(self.name)?;
        value.serialize(FieldSerializer { encoder: &mut *self.encoder, name: variant, slot: Slot::Field })?;
        self.encoder.end_subfield()?;
        Ok(())
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Self::SerializeSeq> {
        self.ensure_field("sequence")?;
        let name = self.name.to_owned();
        Ok(self.compound(Some(name), 0))
    }

    fn serialize_tuple(self, len: usize) -> Result<Self::SerializeTuple> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(self, _name: &'static str, len: usize) -> Result<Self::SerializeTupleStruct> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(self, _name: &'static str, _index: u32, variant: &'static str, _len: usize) -> Result<Self::SerializeTupleVariant> {
        self.ensure_field("enum")?;
        self.encoder.start_subfield(self.name)?;
        Ok(self.compound(Some(variant.to_owned()), 1))
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap> {
        self.ensure_field("map")?;
        let name = self.name.to_owned();
        Ok(self.compound(Some(name), 0))
    }

    fn serialize_struct(self, _name: &'static str, _len: usize) -> Result<Self::SerializeStruct> {
        self.ensure_field("struct")?;
        self.encoder.start_subfield(self.name)?;
        Ok(self.compound(None, 1))
    }

    fn serialize_struct_variant(self, _name: &'static str, _index: u32, variant: &'static str, _len: usize) -> Result<Self::SerializeStructVariant> {
        self.ensure_field("enum")?;
        self.encoder.start_subfield(self.name)?;
        self.encoder.start_subfield(variant)?;
        Ok(self.compound(None, 2))
    }

    fn is_human_readable(&self) -> bool {
        false
    }

}

/// Serializes the contents of records, arrays and maps.
pub struct Compound<'a, 'w, W: Write> {
    encoder: &'a mut Encoder<'w, W>,
    /// Name of the array or map being written, `None` for records whose keys are field names
    name: Option<String>,
    index: usize,
    /// Key waiting for its value
    key: Option<String>,
    /// Subfields to close at the end
    closes: usize,
}

impl<'a, 'w, W: Write> Compound<'a, 'w, W> {

    fn item<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        let name = self.name.as_deref().unwrap_or_default();
        value.serialize(FieldSerializer { encoder: &mut *self.encoder, name, slot: Slot::Item(self.index) })?;
        self.index += 1;
        Ok(())
    }

    fn field<T: ?Sized + Serialize>(&mut self, name: &str, value: &T) -> Result<()> {
        value.serialize(FieldSerializer { encoder: &mut *self.encoder, name, slot: Slot::Field })
    }

    fn close(self) -> Result<()> {
        for _ in 0..self.closes {
            self.encoder.end_subfield()?;
        }
        Ok(())
    }

}

impl<'a, 'w, W: Write> ser::SerializeSeq for Compound<'a, 'w, W> {
    type Ok = ();
    type Error = Error;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        self.item(value)
    }

    fn end(self) -> Result<()> {
        self.close()
    }
}

impl<'a, 'w, W: Write> ser::SerializeTuple for Compound<'a, 'w, W> {
    type Ok = ();
    type Error = Error;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        self.item(value)
    }

    fn end(self) -> Result<()> {
        self.close()
    }
}

impl<'a, 'w, W: Write> ser::SerializeTupleStruct for Compound<'a, 'w, W> {
    type Ok = ();
    type Error = Error;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        self.item(value)
    }

    fn end(self) -> Result<()> {
        self.close()
    }
}

impl<'a, 'w, W: Write> ser::SerializeTupleVariant for Compound<'a, 'w, W> {
    type Ok = ();
    type Error = Error;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        self.item(value)
    }

    fn end(self) -> Result<()> {
        self.close()
    }
}

impl<'a, 'w, W: Write> ser::SerializeMap for Compound<'a, 'w, W> {
    type Ok = ();
    type Error = Error;

    fn serialize_key<T: ?Sized + Serialize>(&mut self, key: &T) -> Result<()> {
        self.key = Some(key.serialize(KeySerializer)?);
        Ok(())
    }

    fn serialize_value<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        let key = self.key.take().ok_or_else(|| Error::Message("map value without a key".to_string()))?;
        let encoder = &mut *self.encoder;
        match self.name.as_deref() {
            Some(name) => value.serialize(FieldSerializer { encoder, name, slot: Slot::Entry(&key) }),
            None       => value.serialize(FieldSerializer { encoder, name: &key, slot: Slot::Field }),
        }
    }

    fn end(self) -> Result<()> {
        self.close()
    }
}

impl<'a, 'w, W: Write> ser::SerializeStruct for Compound<'a, 'w, W> {
    type Ok = ();
    type Error = Error;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, key: &'static str, value: &T) -> Result<()> {
        self.field(key, value)
    }

    fn end(self) -> Result<()> {
        self.close()
    }
}

impl<'a, 'w, W: Write> ser::SerializeStructVariant for Compound<'a, 'w, W> {
    type Ok = ();
    type Error = Error;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, key: &'static str, value: &T) -> Result<()> {
        self.field(key, value)
    }

    fn end(self) -> Result<()> {
        self.close()
    }
}

/// Turns map keys into the names of hunks.
struct KeySerializer;

macro_rules! display_key {
    ($($method:ident($ty:ty),)*) => {
        $(fn $method(self, v: $ty) -> Result<String> {
            Ok(v.to_string())
        })*
    };
}

macro_rules! reject_key {
    ($($method:ident($($arg:ty),*),)*) => {
        $(fn $method(self, $(_: $arg),*) -> Result<String> {
            Err(Error::KeyType)
        })*
    };
}

impl ser::Serializer for KeySerializer {

    type Ok = String;
    type Error = Error;
    type SerializeSeq = ser::Impossible<String, Error>;
    type SerializeTuple = ser::Impossible<String, Error>;
    type SerializeTupleStruct = ser::Impossible<String, Error>;
    type SerializeTupleVariant = ser::Impossible<String, Error>;
    type SerializeMap = ser::Impossible<String, Error>;
    type SerializeStruct = ser::Impossible<String, Error>;
    type SerializeStructVariant = ser::Impossible<String, Error>;

    display_key! {
        serialize_i8(i8),
        serialize_i16(i16),
        serialize_i32(i32),
        serialize_i64(i64),
        serialize_u8(u8),
        serialize_u16(u16),
        serialize_u32(u32),
        serialize_u64(u64),
        serialize_char(char),
        serialize_str(&str),
    }

    reject_key! {
        serialize_bool(bool),
        serialize_f32(f32),
        serialize_f64(f64),
        serialize_bytes(&[u8]),
        serialize_unit(),
        serialize_unit_struct(&'static str),
    }

    fn serialize_unit_variant(self, _name: &'static str, _index: u32, variant: &'static str) -> Result<String> {
        Ok(variant.to_owned())
    }

    fn serialize_none(self) -> Result<String> {
        Err(Error::KeyType)
    }

    fn serialize_some<T: ?Sized + Serialize>(self, _value: &T) -> Result<String> {
        Err(Error::KeyType)
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(self, _name: &'static str, value: &T) -> Result<String> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(self, _name: &'static str, _index: u32, _variant: &'static str, _value: &T) -> Result<String> {
        Err(Error::KeyType)
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Self::SerializeSeq> {
        Err(Error::KeyType)
    }

    fn serialize_tuple(self, _len: usize) -> Result<Self::SerializeTuple> {
        Err(Error::KeyType)
    }

    fn serialize_tuple_struct(self, _name: &'static str, _len: usize) -> Result<Self::SerializeTupleStruct> {
        Err(Error::KeyType)
    }

    fn serialize_tuple_variant(self, _name: &'static str, _index: u32, _variant: &'static str, _len: usize) -> Result<Self::SerializeTupleVariant> {
        Err(Error::KeyType)
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap> {
        Err(Error::KeyType)
    }

    fn serialize_struct(self, _name: &'static str, _len: usize) -> Result<Self::SerializeStruct> {
        Err(Error::KeyType)
    }

    fn serialize_struct_variant(self, _name: &'static str, _index: u32, _variant: &'static str, _len: usize) -> Result<Self::SerializeStructVariant> {
        Err(Error::KeyType)
    }

}

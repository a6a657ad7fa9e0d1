//! Conveniently serialize and deserialize your Rust data structures into `brs` streams.
//!
//! # Mapping
//!
//! The top level value has to be a struct or a map; each of its fields becomes a hunk named after the field.
//! Scalars are written as plain fields in the byte order of the host, strings, chars and unit enum variants as
//! Utf-8 text. Sequences and tuples turn into array items sharing the field name, maps into map items keyed by the
//! map key. Nested structs and enum variants carrying data open a subfield.
//!
//! `None` leaves no trace in the stream and missing fields deserialize as `None`. The same holds for empty sequences
//! and maps, which is why they need `#[serde(default)]` to be read back. A plain field with an empty value, such as
//! an empty string or `()`, would look like the start of a subfield and is left out as well.
//!
//! Array items and map entries cannot contain records, further collections or `None`. `brs` is not self-describing either:
//! `deserialize_any` is not supported, so untagged enums and `serde_json::Value` style types do not work.
//!
//! # Examples
//!
//! ```
//! use serde::{Deserialize, Serialize};
//! use std::collections::BTreeMap;
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! enum Species {
//!     PrionailurusViverrinus,
//!     LynxLynx,
//!     FelisCatus,
//! }
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct Cat {
//!     name: String,
//!     species: Species,
//! }
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct Message {
//!     version: u32,
//!     cat: Cat,
//!     toys: Vec<String>,
//!     #[serde(default)]
//!     weights: BTreeMap<String, f32>,
//!     owner: Option<String>,
//! }
//!
//! // On a little-endian host `brsq` renders this message as
//! // ```
//! // version = 'AQAAAA=='
//! // cat (
//! //   name = "Jessica"
//! //   species = "PrionailurusViverrinus"
//! // )
//! // toys[0] = "mouse"
//! // toys[1] = "yarn"
//! // weights{morning} = 'ZmaGQA=='
//! // ```
//! let msg = Message {
//!     version: 1,
//!     cat: Cat { name: "Jessica".to_string(), species: Species::PrionailurusViverrinus },
//!     toys: vec!["mouse".to_string(), "yarn".to_string()],
//!     weights: [("morning".to_string(), 4.2)].into_iter().collect(),
//!     owner: None,
//! };
//!
//! let bytes = brs_serde::to_bytes(&msg).unwrap();
//! assert_eq!(bytes[..4], brs::MAGIC);
//!
//! let deserialized: Message = brs_serde::from_bytes(&bytes).unwrap();
//! assert_eq!(msg, deserialized);
//! ```

mod de;
mod error;
mod ser;

pub use de::{from_bytes, from_reader, Deserializer};
pub use error::{DeserializationError, Error, Result};
pub use ser::{to_bytes, to_writer, Serializer};

#[cfg(test)]
mod tests {
    use serde::{Serialize, Deserialize};
    use std::collections::HashMap;
    use brs::MAGIC;
    use super::{to_bytes, from_bytes, Error};

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    enum Enum {
        UnitVariant,
        NewtypeVariant(bool),
        TupleVariant(f32, f32),
        StructVariant{ a: usize, b: usize, c: usize },
    }

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct Struct {
        field: u8,
        inner: Option<Box<Struct>>,
    }

    #[derive(Serialize, Deserialize, Debug, PartialEq, Default)]
    struct UnitStruct;

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct NewtypeStruct(String);

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct TupleStruct(char, char, char);

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct Test {
        bool: bool,
        i8: i8,
        i16: i16,
        i32: i32,
        i64: i64,
        i128: i128,
        u8: u8,
        u16: u16,
        u32: u32,
        u64: u64,
        f32: f32,
        f64: f64,
        char: char,
        str: String,
        #[serde(default)]
        empty: String,
        #[serde(with = "serde_bytes")]
        bytes: Vec<u8>,
        none: Option<u8>,
        some: Option<u8>,
        #[serde(default)]
        unit: (),
        #[serde(default)]
        unit_struct: UnitStruct,
        newtype_struct: NewtypeStruct,
        tuple_struct: TupleStruct,
        seq: Vec<String>,
        #[serde(default)]
        empty_seq: Vec<u32>,
        tuple: (u16, u16, u16),
        map: HashMap<usize, String>,
        r#struct: Struct,
        unit_variant: Enum,
        newtype_variant: Enum,
        tuple_variant: Enum,
        struct_variant: Enum,
        variants: Vec<Enum>,
    }

    #[test]
    fn roundtrip() {
        let message = Test {
            bool: true,
            i8: -1,
            i16: -20,
            i32: -7000,
            i64: i64::MIN,
            i128: i128::MAX,
            u8: 1,
            u16: 20,
            u32: 7000,
            u64: u64::MAX,
            f32: 1337.8472,
            f64: 1337.8472,
            char: 'ß',
            str: "Test".to_string(),
            empty: String::new(),
            bytes: vec![0x00, 0xff, 0x42, 0x52],
            none: None,
            some: Some(0),
            unit: (),
            unit_struct: UnitStruct,
            newtype_struct: NewtypeStruct("Qapla'".to_string()),
            tuple_struct: TupleStruct('a', 'b', 'c'),
            seq: vec![
                "Elen".to_string(),
                "síla".to_string(),
                "lúmenn'".to_string(),
                "omentielvo".to_string(),
            ],
            empty_seq: Vec::new(),
            tuple: (0, 0, 0),
            map: [
                (1701, "Enterprise".to_string()),
                (74656, "Voyager".to_string())
            ].into_iter().collect(),
            r#struct: Struct {
                field: 42,
                inner: Some(Box::new(Struct { field: 43, inner: None })),
            },
            unit_variant: Enum::UnitVariant,
            newtype_variant: Enum::NewtypeVariant(false),
            tuple_variant: Enum::TupleVariant(1.0, 0.999),
            struct_variant: Enum::StructVariant {
                a: 255,
                b: 0,
                c: 33,
            },
            variants: vec![Enum::UnitVariant, Enum::UnitVariant],
        };
        let bytes = to_bytes(&message).unwrap();
        assert_eq!(message, from_bytes::<Test>(&bytes).unwrap());
    }

    #[test]
    fn byte_layout() {
        #[derive(Serialize)]
        struct Small {
            a: u8,
            b: Option<u8>,
        }
        let mut expected = MAGIC.to_vec();
        expected.extend_from_slice(&(1u32 << 2 | 1 << 9).to_ne_bytes());
        expected.extend_from_slice(b"a");
        expected.push(7);
        assert_eq!(to_bytes(&Small { a: 7, b: None }).unwrap(), expected);
    }

    #[test]
    fn nested_struct_layout() {
        #[derive(Serialize)]
        struct Inner {
            x: u8,
        }
        #[derive(Serialize)]
        struct Outer {
            inner: Inner,
        }
        let mut expected = MAGIC.to_vec();
        expected.extend_from_slice(&(5u32 << 2).to_ne_bytes());
        expected.extend_from_slice(b"inner");
        expected.extend_from_slice(&(1u32 << 2 | 1 << 9).to_ne_bytes());
        expected.extend_from_slice(b"x");
        expected.push(9);
        expected.extend_from_slice(&[0; 4]);
        assert_eq!(to_bytes(&Outer { inner: Inner { x: 9 } }).unwrap(), expected);
    }

    #[test]
    fn top_level_must_be_a_record() {
        assert!(matches!(to_bytes(&5u8), Err(Error::TopLevel(_))));
        assert!(matches!(to_bytes(&vec![1u8]), Err(Error::TopLevel(_))));
        let map: HashMap<String, u8> = [("k".to_string(), 1)].into_iter().collect();
        assert_eq!(from_bytes::<HashMap<String, u8>>(&to_bytes(&map).unwrap()).unwrap(), map);
    }

    #[test]
    fn collections_hold_plain_values() {
        #[derive(Serialize)]
        struct Point {
            x: i32,
        }
        #[derive(Serialize)]
        struct Path {
            points: Vec<Point>,
        }
        let result = to_bytes(&Path { points: vec![Point { x: 1 }] });
        assert!(matches!(result, Err(Error::Nested("struct"))));

        #[derive(Serialize)]
        struct Grid {
            rows: Vec<Vec<u8>>,
        }
        assert!(matches!(to_bytes(&Grid { rows: vec![vec![1]] }), Err(Error::Nested("sequence"))));
    }

    #[test]
    fn empty_values_are_left_out() {
        #[derive(Serialize)]
        struct Empty {
            text: String,
            unit: (),
            after: u8,
        }
        let mut expected = MAGIC.to_vec();
        expected.extend_from_slice(&(5u32 << 2 | 1 << 9).to_ne_bytes());
        expected.extend_from_slice(b"after");
        expected.push(3);
        assert_eq!(to_bytes(&Empty { text: String::new(), unit: (), after: 3 }).unwrap(), expected);
    }

    #[test]
    fn unknown_nested_records_are_skipped() {
        #[derive(Serialize)]
        struct Inner {
            x: u8,
            deeper: Struct,
            list: Vec<u8>,
        }
        #[derive(Serialize)]
        struct Newer {
            extra: Inner,
            n: u8,
        }
        #[derive(Deserialize, Debug, PartialEq)]
        struct Older {
            n: u8,
        }
        let newer = Newer {
            extra: Inner { x: 1, deeper: Struct { field: 2, inner: None }, list: vec![3, 4] },
            n: 2,
        };
        assert_eq!(from_bytes::<Older>(&to_bytes(&newer).unwrap()).unwrap(), Older { n: 2 });
    }

    #[test]
    fn none_cannot_be_an_element() {
        #[derive(Serialize)]
        struct Holes {
            items: Vec<Option<u8>>,
        }
        let result = to_bytes(&Holes { items: vec![Some(1), None, Some(3)] });
        assert!(matches!(result, Err(Error::Nested("missing value"))));

        #[derive(Serialize)]
        struct Sparse {
            map: HashMap<String, Option<u8>>,
        }
        let map = [("k".to_string(), None)].into_iter().collect();
        assert!(matches!(to_bytes(&Sparse { map }), Err(Error::Nested("missing value"))));

        #[derive(Serialize, Deserialize, Debug, PartialEq)]
        struct Full {
            items: Vec<Option<u8>>,
        }
        let full = Full { items: vec![Some(1), Some(2)] };
        assert_eq!(from_bytes::<Full>(&to_bytes(&full).unwrap()).unwrap(), full);
    }

    #[test]
    fn map_keys() {
        #[derive(Serialize)]
        struct Keys {
            map: HashMap<(u8, u8), u8>,
        }
        let map = [((1, 2), 3)].into_iter().collect();
        assert!(matches!(to_bytes(&Keys { map }), Err(Error::KeyType)));

        #[derive(Serialize, Deserialize, Debug, PartialEq)]
        struct Chars {
            map: HashMap<char, i16>,
        }
        let chars = Chars { map: [('x', -1), ('y', 1)].into_iter().collect() };
        assert_eq!(from_bytes::<Chars>(&to_bytes(&chars).unwrap()).unwrap(), chars);
    }

    #[test]
    fn too_many_items() {
        #[derive(Serialize)]
        struct Big {
            items: Vec<u8>,
        }
        let result = to_bytes(&Big { items: vec![0; brs::MAX_INDEX + 2] });
        assert!(matches!(result, Err(Error::Encode(brs::EncodeError::IndexOutOfRange(65536)))));
    }
}

//! `brs` is a self-describing binary record format. A stream consists of a four byte magic followed by hunks, each of
//! which carries a name and an opaque payload. Hunks come in three kinds: plain fields, items of a named array (with a
//! 16-bit index) and entries of a named map (with a secondary name). Records nest by opening a subfield, adding hunks
//! to it and closing it again with an end-of-subfield marker.
//!
//! There is no schema. Names are checked by whoever reads the stream, usually inside a `Handler` that dispatches on
//! the field name and reads the payload into the matching type. Hunks are decoded in exactly the order they were
//! encoded.
//!
//! # A note on byte order
//!
//! Headers, array indices and plain-data payloads are written in the byte order of the host. The magic records which
//! order was used and a decoder refuses streams written on a host of different endianness with
//! `DecodeError::MagicUnsupported`.
//!
//! # Errors
//!
//! Misuse of the API and violations of the format surface as `Err`. Running out of input does not: `deserialize` and
//! the typed reads return `Ok(false)` if the stream ended in the middle of a hunk.
//!
//! # Examples
//!
//! ```
//! use brs::*;
//!
//! let mut buf = Vec::new();
//! let mut encoder = Encoder::new(&mut buf).unwrap();
//! encoder.add_value("count", &7i32).unwrap();
//! encoder.add_indexed("items", 0, "a").unwrap();
//! {
//!     let mut meta = encoder.subfield("meta").unwrap();
//!     meta.add_keyed("tags", "colour", "red").unwrap();
//! }
//! assert_eq!(buf[..4], MAGIC);
//!
//! let mut count = 0i32;
//! let mut tags = Vec::new();
//! let mut decoder = Decoder::new(&buf[..]).unwrap();
//! let complete = decoder.deserialize_with(|d, field| match field.name.as_str() {
//!     "count" => d.read_value(&mut count),
//!     "meta"  => d.deserialize_with(|d, field| {
//!         let mut value = String::new();
//!         let ok = d.read_text(&mut value)?;
//!         tags.push((field.sub_name.clone(), value));
//!         Ok(ok)
//!     }),
//!     _       => d.skip(),
//! }).unwrap();
//! assert!(complete);
//! assert_eq!(count, 7);
//! assert_eq!(tags, [("colour".to_string(), "red".to_string())]);
//! ```

mod decoder;
mod encoder;
mod error;
mod header;

pub use decoder::*;
pub use encoder::*;
pub use error::*;
pub use header::*;

use nom::{
    character::complete::{char, digit1, multispace1, none_of, one_of},
    Finish,
    IResult,
    combinator::{all_consuming, map, map_res, opt, recognize, value},
    multi::many0,
    sequence::{delimited, pair, preceded, terminated, tuple},
    branch::alt,
    bytes::complete::{tag, take_till, take_while, take_while1, escaped_transform},
};
use brs::Encoder;
use anyhow::{anyhow, bail, Result};
use base64::decode;
use log::warn;
use std::io::Write;

/// One line of the text form, or a whole subfield with everything nested in it.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub name: String,
    pub key: Key,
    pub body: Body,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Key {
    None,
    Index(usize),
    SubName(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Payload(Vec<u8>),
    Subfield(Vec<Entry>),
}

const B64_CHARS: &'static str = "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/=";

/// Characters which may appear in a name without quoting it
pub fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || "_.-".contains(c)
}

fn comment(i: &str) -> IResult<&str, &str> {
    recognize(pair(char('#'), take_till(|c| c == '\n')))(i)
}

fn white(i: &str) -> IResult<&str, ()> {
    value((), many0(alt((multispace1, comment))))(i)
}

fn string(i: &str) -> IResult<&str, String> {
    delimited(
            tag("\""),
            map(opt(escaped_transform(
                none_of("\\\""),
                '\\',
                alt((
                        value("\\", tag("\\")),
                        value("\"", tag("\"")),
                        value("\n", tag("n")),
                )))), |c| c.unwrap_or_default()),
            tag("\"")
    )(i)
}

fn bytes(i: &str) -> IResult<&str, Vec<u8>> {
    map_res(delimited(char('\''), take_while(move |c| B64_CHARS.contains(c)), char('\'')), decode)(i)
}

fn keyword(i: &str) -> IResult<&str, Vec<u8>> {
    alt((
            value(vec![1], tag("true")),
            value(vec![0], tag("false")),
    ))(i)
}

fn digits(i: &str) -> IResult<&str, &str> {
    recognize(tuple((
        opt(one_of("+-")),
        digit1,
        opt(pair(char('.'), digit1)),
        opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
    )))(i)
}

fn suffix(i: &str) -> IResult<&str, &str> {
    alt((
        tag("u8"), tag("i8"), tag("u16"), tag("i16"), tag("u32"), tag("i32"),
        tag("u64"), tag("i64"), tag("f32"), tag("f64"),
    ))(i)
}

macro_rules! ne_bytes {
    ($n:expr, $ty:ty) => {
        $n.parse::<$ty>().map(|v| v.to_ne_bytes().to_vec()).map_err(anyhow::Error::from)
    };
}

/// Unsuffixed numbers are `i64`, or `f64` if they have a fraction or an exponent
fn to_bytes(n: &str, suffix: Option<&str>) -> Result<Vec<u8>> {
    let fractional = n.contains(|c| ".eE".contains(c));
    match suffix {
        Some("u8")  => ne_bytes!(n, u8),
        Some("i8")  => ne_bytes!(n, i8),
        Some("u16") => ne_bytes!(n, u16),
        Some("i16") => ne_bytes!(n, i16),
        Some("u32") => ne_bytes!(n, u32),
        Some("i32") => ne_bytes!(n, i32),
        Some("u64") => ne_bytes!(n, u64),
        Some("f32") => ne_bytes!(n, f32),
        Some("f64") => ne_bytes!(n, f64),
        None if fractional => ne_bytes!(n, f64),
        Some("i64") | None => ne_bytes!(n, i64),
        Some(other) => Err(anyhow!("unknown number suffix {}", other)),
    }
}

fn number(i: &str) -> IResult<&str, Vec<u8>> {
    map_res(pair(digits, opt(suffix)), |(n, s)| to_bytes(n, s))(i)
}

fn literal(i: &str) -> IResult<&str, Vec<u8>> {
    alt((map(string, String::into_bytes), bytes, keyword, number))(i)
}

fn name(i: &str) -> IResult<&str, String> {
    alt((string, map(take_while1(is_name_char), String::from)))(i)
}

fn key(i: &str) -> IResult<&str, Key> {
    alt((
        map(delimited(char('['), map_res(digit1, |n: &str| n.parse()), char(']')), Key::Index),
        map(delimited(char('{'), name, char('}')), Key::SubName),
    ))(i)
}

fn body(i: &str) -> IResult<&str, Body> {
    alt((
        map(preceded(pair(char('='), white), literal), Body::Payload),
        map(delimited(char('('), entries, preceded(white, char(')'))), Body::Subfield),
    ))(i)
}

fn entry(i: &str) -> IResult<&str, Entry> {
    map(
        tuple((name, opt(key), preceded(white, body))),
        |(name, key, body)| Entry { name, key: key.unwrap_or(Key::None), body },
    )(i)
}

fn entries(i: &str) -> IResult<&str, Vec<Entry>> {
    many0(preceded(white, entry))(i)
}

pub fn parse(i: &str) -> Result<Vec<Entry>> {
    Ok(all_consuming(terminated(entries, white))(i).finish().map_err(|e| anyhow!("{}", e))?.1)
}

/// Writes the parsed entries as hunks. Plain fields with an empty payload would read back as the start of a
/// subfield, so they are left out like absent values.
pub fn encode<W: Write>(entries: &[Entry], encoder: &mut Encoder<W>) -> Result<()> {
    for entry in entries {
        match (&entry.key, &entry.body) {
            (Key::None, Body::Payload(p)) if p.is_empty() => warn!("skipping empty field {}", entry.name),
            (Key::None, Body::Payload(p))         => { encoder.add_raw(&entry.name, p)?; },
            (Key::Index(i), Body::Payload(p))     => { encoder.add_indexed_raw(&entry.name, *i, p)?; },
            (Key::SubName(k), Body::Payload(p))   => { encoder.add_keyed_raw(&entry.name, k, p)?; },
            (Key::None, Body::Subfield(inner))    => encoder.with_subfield(&entry.name, |e| encode(inner, e))?,
            (_, Body::Subfield(_))                => bail!("subfield {} cannot be an array item or a map item", entry.name),
        }
    }
    Ok(())
}

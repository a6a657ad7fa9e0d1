use brs::{Decoder, Event, Field, Kind};
use anyhow::{anyhow, Result};
use log::warn;
use std::io::{Read, Write};

use crate::parser::is_name_char;

const INDENT: &'static str = "  ";

/// Prints every hunk of the stream in the text form understood by the parser. A zero sized plain field is always
/// printed as the start of a subfield.
pub fn print<R: Read, W: Write>(decoder: &mut Decoder<R>, out: &mut W) -> Result<()> {
    let mut depth = 0;
    let mut payload = Vec::new();
    loop {
        match decoder.next_event()? {
            Event::Hunk(field) => {
                write!(out, "{}{}", INDENT.repeat(depth), label(&field))?;
                if field.kind() == Kind::Field && field.size == 0 {
                    writeln!(out, " (")?;
                    depth += 1;
                } else {
                    if !decoder.read_bytes(&mut payload)? {
                        return Err(anyhow!("Stream truncated at position {}", decoder.position()));
                    }
                    writeln!(out, " = {}", literal(&payload))?;
                }
            },
            Event::EndOfScope => {
                if depth == 0 {
                    warn!("end of subfield without an open subfield at position {}", decoder.position());
                    continue;
                }
                depth -= 1;
                writeln!(out, "{})", INDENT.repeat(depth))?;
            },
            Event::EndOfStream => break,
            Event::Truncated => return Err(anyhow!("Stream truncated at position {}", decoder.position())),
        }
    }
    if depth > 0 {
        warn!("stream ended with {} open subfields", depth);
        while depth > 0 {
            depth -= 1;
            writeln!(out, "{})", INDENT.repeat(depth))?;
        }
    }
    Ok(())
}

fn label(field: &Field) -> String {
    match field.kind() {
        Kind::Field     => name(&field.name),
        Kind::ArrayItem => format!("{}[{}]", name(&field.name), field.index.unwrap_or_default()),
        Kind::MapItem   => format!("{}{{{}}}", name(&field.name), name(&field.sub_name)),
    }
}

fn name(name: &str) -> String {
    if !name.is_empty() && name.chars().all(is_name_char) {
        name.to_string()
    } else {
        quote(name)
    }
}

fn quote(s: &str) -> String {
    let mut quoted = String::with_capacity(s.len() + 2);
    quoted.push('"');
    for c in s.chars() {
        match c {
            '"'  => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            c    => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

/// Text if the payload is printable Utf-8, base64 otherwise
fn literal(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(s) if s.chars().all(|c| !c.is_control() || c == '\n' || c == '\t') => quote(s),
        _ => format!("'{}'", base64::encode(payload)),
    }
}

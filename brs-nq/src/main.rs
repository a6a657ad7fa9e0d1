mod parser;
mod printer;

use brs::{Decoder, Encoder};
use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::PathBuf;
use anyhow::{Context, Result};
use structopt::StructOpt;

/// Print brs streams as text
#[derive(StructOpt)]
#[structopt(name = "brsq", author = "Liv Fischer")]
struct Opt {
    /// parse the text form and encode it into a binary brs stream instead
    #[structopt(short, long)]
    encode: bool,
    /// read from this file instead of stdin
    #[structopt(parse(from_os_str))]
    file: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();
    let opt = Opt::from_args();
    let input: Box<dyn Read> = match &opt.file {
        Some(path) => Box::new(BufReader::new(File::open(path).with_context(|| format!("Failed to open {}", path.display()))?)),
        None       => Box::new(io::stdin()),
    };
    if opt.encode {
        encode(input)
    } else {
        print(input)
    }
}

fn print(input: Box<dyn Read>) -> Result<()> {
    let mut decoder = Decoder::new(input).context("Not a brs stream")?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    printer::print(&mut decoder, &mut out).context("Decoding error")?;
    out.flush()?;
    Ok(())
}

fn encode(mut input: Box<dyn Read>) -> Result<()> {
    let mut text = String::new();
    input.read_to_string(&mut text).context("Input is not utf-8")?;
    let entries = parser::parse(&text)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut encoder = Encoder::new(&mut out)?;
    parser::encode(&entries, &mut encoder).context("Encoding error")?;
    out.flush()?;
    Ok(())
}

use super::{address, memory};
use std::io::{BufRead, Read};
use std::path::Path;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Open(#[from] utils::fs::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("line {line}: {message}")]
    Hex { line: usize, message: String },
}

/// Program image format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    /// Intel HEX records with absolute addresses.
    IntelHex,
    /// Raw bytes placed at a base address.
    Binary,
}

impl Format {
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(std::ffi::OsStr::to_str)
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("hex" | "ihex") => Self::IntelHex,
            _ => Self::Binary,
        }
    }
}

/// Load a program image into memory.
///
/// Binary images are placed at `base`, Intel HEX images at the addresses they specify.
/// Returns the number of bytes written.
pub fn load(path: &Path, mem: &mut memory::Main, base: address) -> Result<usize, Error> {
    let reader = utils::fs::open_readable(path)?;
    let format = Format::from_path(path);
    let num_bytes = match format {
        Format::IntelHex => load_intel_hex(reader, mem)?,
        Format::Binary => load_binary(reader, mem, base)?,
    };
    log::info!(
        "loaded {} ({:?}, {})",
        path.display(),
        format,
        human_bytes::human_bytes(num_bytes as f64)
    );
    Ok(num_bytes)
}

pub fn load_binary(
    mut reader: impl Read,
    mem: &mut memory::Main,
    base: address,
) -> Result<usize, Error> {
    let mut data = Vec::new();
    reader.read_to_end(&mut data)?;
    mem.write_bytes(base, &data);
    Ok(data.len())
}

const DATA: u8 = 0x00;
const END_OF_FILE: u8 = 0x01;
const EXTENDED_SEGMENT_ADDRESS: u8 = 0x02;
const START_SEGMENT_ADDRESS: u8 = 0x03;
const EXTENDED_LINEAR_ADDRESS: u8 = 0x04;
const START_LINEAR_ADDRESS: u8 = 0x05;

fn parse_hex_bytes(digits: &str) -> Option<Vec<u8>> {
    if digits.len() % 2 != 0 || !digits.is_ascii() {
        return None;
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&digits[i..i + 2], 16).ok())
        .collect()
}

pub fn load_intel_hex(reader: impl BufRead, mem: &mut memory::Main) -> Result<usize, Error> {
    let mut base: address = 0;
    let mut num_bytes = 0;

    for (idx, line) in reader.lines().enumerate() {
        let line_num = idx + 1;
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let err = |message: &str| Error::Hex {
            line: line_num,
            message: message.to_string(),
        };

        let digits = line
            .strip_prefix(':')
            .ok_or_else(|| err("record does not start with ':'"))?;
        let bytes = parse_hex_bytes(digits).ok_or_else(|| err("invalid hex digits"))?;
        if bytes.len() < 5 {
            return Err(err("record too short"));
        }
        let count = bytes[0] as usize;
        if bytes.len() != count + 5 {
            return Err(err(&format!(
                "byte count {count} does not match record length {}",
                bytes.len() - 5
            )));
        }
        let checksum = bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
        if checksum != 0 {
            return Err(err("checksum mismatch"));
        }

        let offset = u64::from(u16::from_be_bytes([bytes[1], bytes[2]]));
        let kind = bytes[3];
        let data = &bytes[4..4 + count];

        match kind {
            DATA => {
                mem.write_bytes(base.wrapping_add(offset), data);
                num_bytes += data.len();
            }
            END_OF_FILE => break,
            EXTENDED_SEGMENT_ADDRESS if count == 2 => {
                base = u64::from(u16::from_be_bytes([data[0], data[1]])) << 4;
            }
            EXTENDED_LINEAR_ADDRESS if count == 2 => {
                base = u64::from(u16::from_be_bytes([data[0], data[1]])) << 16;
            }
            START_SEGMENT_ADDRESS | START_LINEAR_ADDRESS => {
                log::debug!("ignoring start address record on line {line_num}");
            }
            EXTENDED_SEGMENT_ADDRESS | EXTENDED_LINEAR_ADDRESS => {
                return Err(err("address record must carry two bytes"));
            }
            other => {
                return Err(err(&format!("unknown record type {other:#04x}")));
            }
        }
    }
    Ok(num_bytes)
}

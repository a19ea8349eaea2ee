pub mod fs;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid integer {value:?}")]
pub struct ParseIntError {
    pub value: String,
}

/// Parse an unsigned integer in decimal, hexadecimal (`0x`), octal (`0o`) or binary (`0b`).
///
/// Underscores are ignored, so `0x8000_0000` is accepted.
pub fn parse_u64(value: &str) -> Result<u64, ParseIntError> {
    let cleaned: String = value.trim().chars().filter(|c| *c != '_').collect();
    let lower = cleaned.to_ascii_lowercase();
    let (digits, radix) = if let Some(hex) = lower.strip_prefix("0x") {
        (hex, 16)
    } else if let Some(oct) = lower.strip_prefix("0o") {
        (oct, 8)
    } else if let Some(bin) = lower.strip_prefix("0b") {
        (bin, 2)
    } else {
        (lower.as_str(), 10)
    };
    u64::from_str_radix(digits, radix).map_err(|_| ParseIntError {
        value: value.to_string(),
    })
}

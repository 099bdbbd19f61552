//! Jump encoding command handlers
//!
//! Handles the `encode` and `decode` subcommands.

use anyhow::{bail, Context, Result};
use rewire::{Jump, PointerWidth};

use crate::cli::WidthArg;

/// Parse an address as hex (0x prefix) or decimal
pub fn parse_address(address: &str) -> Result<usize> {
    let address = address.trim();
    if let Some(hex) = address
        .strip_prefix("0x")
        .or_else(|| address.strip_prefix("0X"))
    {
        usize::from_str_radix(&hex.replace('_', ""), 16).context("Invalid hex address")
    } else {
        address.parse::<usize>().context("Invalid address")
    }
}

/// Parse hex bytes, with or without separating whitespace
pub fn parse_hex_bytes(bytes: &str) -> Result<Vec<u8>> {
    let compact: String = bytes.split_whitespace().collect();
    hex::decode(&compact).with_context(|| format!("Invalid hex bytes: {}", bytes))
}

/// Space-separated upper-case hex
pub fn format_bytes(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

fn describe(jump: &Jump, at: usize) -> String {
    match jump {
        Jump::Absolute64 { target } => format!("mov rax, {:#x}; jmp rax", target),
        Jump::Relative32 { offset } => {
            let sign = if *offset < 0 { '-' } else { '+' };
            format!(
                "jmp rel32 {}{:#x} -> {:#x}",
                sign,
                offset.unsigned_abs(),
                jump.target(at)
            )
        }
    }
}

/// Handle the encode command
pub fn encode(source: &str, destination: &str, width: WidthArg) -> Result<()> {
    let source = parse_address(source)?;
    let destination = parse_address(destination)?;
    let width = width.resolve()?;

    let jump = Jump::build(width, source, destination)
        .with_context(|| format!("Cannot encode a {}-bit jump", width.bits()))?;

    println!("{}", format_bytes(&jump.encode()));
    println!("  {}", describe(&jump, source));
    println!("  {} bytes overwritten at {:#x}", jump.size(), source);

    Ok(())
}

/// Handle the decode command
pub fn decode(bytes: &str, at: &str) -> Result<()> {
    let data = parse_hex_bytes(bytes)?;
    let at = parse_address(at)?;

    let Some(jump) = Jump::decode(&data) else {
        bail!("Not a redirection jump: {}", format_bytes(&data));
    };

    let width = match jump {
        Jump::Absolute64 { .. } => PointerWidth::Wide,
        Jump::Relative32 { .. } => PointerWidth::Narrow,
    };

    println!("{}-bit jump ({} bytes)", width.bits(), jump.size());
    println!("  {}", describe(&jump, at));
    println!("  target: {:#x}", jump.target(at));
    if data.len() > jump.size() {
        println!("  trailing: {}", format_bytes(&data[jump.size()..]));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_address() {
        assert_eq!(parse_address("0x1000").unwrap(), 0x1000);
        assert_eq!(parse_address("0X7fff_0000").unwrap(), 0x7fff_0000);
        assert_eq!(parse_address("4096").unwrap(), 4096);
        assert!(parse_address("0xZZ").is_err());
        assert!(parse_address("twelve").is_err());
    }

    #[test]
    fn test_parse_hex_bytes() {
        assert_eq!(
            parse_hex_bytes("48 B8 ff e0").unwrap(),
            vec![0x48, 0xB8, 0xFF, 0xE0]
        );
        assert_eq!(parse_hex_bytes("e900000000").unwrap(), vec![0xE9, 0, 0, 0, 0]);
        assert!(parse_hex_bytes("E9 0").is_err());
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(&[0x48, 0xB8, 0x0A]), "48 B8 0A");
        assert_eq!(format_bytes(&[]), "");
    }

    #[test]
    fn test_encode_and_decode_commands() {
        encode("0x401000", "0x502000", WidthArg::Narrow).unwrap();
        encode("0x1000", "0x2000", WidthArg::Wide).unwrap();
        decode("E9 FB 0F 00 00", "0x1000").unwrap();
        assert!(decode("90 90 90", "0").is_err());
    }

    #[test]
    fn test_describe_relative() {
        let jump = Jump::build(PointerWidth::Narrow, 0x1000, 0x2000).unwrap();
        assert_eq!(describe(&jump, 0x1000), "jmp rel32 +0xffb -> 0x2000");
    }
}

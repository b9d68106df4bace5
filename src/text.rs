//! Text codecs shared by the serial console and the command protocol
//!
//! Every parser here is strict: a value is either fully valid or rejected,
//! so callers never stage half-parsed configuration.

use core::net::Ipv4Addr;

use crate::BoardError;
use crate::profile::{InvertMask, MacAddress};

/// Parse a dotted-quad address: exactly four decimal parts, each 0..255,
/// no empty parts and nothing but digits and dots.
pub fn parse_dotted_quad(text: &str) -> Result<Ipv4Addr, BoardError> {
    let mut octets = [0u8; 4];
    let mut parts = 0usize;

    for part in text.split('.') {
        if parts == 4 {
            return Err(BoardError::InvalidIpFormat);
        }
        if part.is_empty() || part.len() > 3 || !part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(BoardError::InvalidIpFormat);
        }
        let value: u16 = part.parse().map_err(|_| BoardError::InvalidIpFormat)?;
        octets[parts] = u8::try_from(value).map_err(|_| BoardError::InvalidIpFormat)?;
        parts += 1;
    }

    if parts != 4 {
        return Err(BoardError::InvalidIpFormat);
    }
    Ok(Ipv4Addr::from(octets))
}

/// Parse a small decimal number, digits only (no sign, no blanks)
pub fn parse_small(text: &str) -> Option<u8> {
    if text.is_empty() || text.len() > 3 || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

/// Parse a decimal UDP/TCP port 0..65535
pub fn parse_port(text: &str) -> Result<u16, BoardError> {
    if text.is_empty() || text.len() > 5 || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(BoardError::InvalidIpFormat);
    }
    let value: u32 = text.parse().map_err(|_| BoardError::InvalidIpFormat)?;
    u16::try_from(value).map_err(|_| BoardError::InvalidIpFormat)
}

fn hex_digit(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

/// Convert two ASCII hex digits into a byte
pub fn hex_pair(up: u8, lo: u8) -> Option<u8> {
    Some((hex_digit(up)? << 4) | hex_digit(lo)?)
}

/// Parse six hex pairs, either plain (`AABBCCDDEEFF`) or with a uniform
/// `:` or `-` separator between pairs.
pub fn parse_mac(text: &str) -> Result<MacAddress, BoardError> {
    let bytes = text.as_bytes();
    let separator = match bytes.get(2) {
        Some(b':') => Some(b':'),
        Some(b'-') => Some(b'-'),
        _ => None,
    };
    let stride = if separator.is_some() { 3 } else { 2 };
    let expected_len = match separator {
        Some(_) => 17,
        None => 12,
    };
    if bytes.len() != expected_len {
        return Err(BoardError::InvalidMacFormat);
    }

    let mut mac = [0u8; 6];
    for (i, byte) in mac.iter_mut().enumerate() {
        let at = i * stride;
        if let Some(sep) = separator {
            if i > 0 && bytes[at - 1] != sep {
                return Err(BoardError::InvalidMacFormat);
            }
        }
        *byte = hex_pair(bytes[at], bytes[at + 1]).ok_or(BoardError::InvalidMacFormat)?;
    }
    Ok(MacAddress(mac))
}

/// Parse an on/off level: `1`, `0`, `ON`, `OFF` (any case)
pub fn parse_level(text: &str) -> Option<bool> {
    if text == "1" || text.eq_ignore_ascii_case("on") {
        Some(true)
    } else if text == "0" || text.eq_ignore_ascii_case("off") {
        Some(false)
    } else {
        None
    }
}

/// A parsed `INVERT` argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvertSetting {
    /// Replace the whole mask
    Mask(InvertMask),
    /// Change one output, leaving the others as they are
    Channel { bit: u8, inverted: bool },
}

impl InvertSetting {
    /// Resulting mask when applied on top of `current`
    pub fn apply(self, current: InvertMask) -> InvertMask {
        match self {
            InvertSetting::Mask(mask) => mask,
            InvertSetting::Channel { bit, inverted } => current.with_bit(bit, inverted),
        }
    }
}

/// Parse an invert setting for `count` outputs starting at logical `first`.
///
/// Accepted forms:
/// * `NONE` / `ALL`
/// * `0xHH` bitmask, bit 0 = first output
/// * a `0`/`1` string with one character per output, leftmost = first output
/// * `<n>=ON|OFF|1|0` changing a single output
pub fn parse_invert(token: &str, first: u8, count: usize) -> Result<InvertSetting, BoardError> {
    let valid_bits = InvertMask::all(count).0;

    if token.eq_ignore_ascii_case("none") {
        return Ok(InvertSetting::Mask(InvertMask(0)));
    }
    if token.eq_ignore_ascii_case("all") {
        return Ok(InvertSetting::Mask(InvertMask(valid_bits)));
    }

    if let Some(hex) = token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
        let value = match hex.as_bytes() {
            [lo] => hex_digit(*lo),
            [up, lo] => hex_pair(*up, *lo),
            _ => None,
        }
        .ok_or(BoardError::InvalidInvertFormat)?;
        if value & !valid_bits != 0 {
            return Err(BoardError::InvalidInvertFormat);
        }
        return Ok(InvertSetting::Mask(InvertMask(value)));
    }

    if let Some((channel, level)) = token.split_once('=') {
        let logical = parse_small(channel).ok_or(BoardError::InvalidInvertFormat)?;
        let bit = logical
            .checked_sub(first)
            .filter(|bit| usize::from(*bit) < count)
            .ok_or(BoardError::InvalidInvertFormat)?;
        let inverted = parse_level(level).ok_or(BoardError::InvalidInvertFormat)?;
        return Ok(InvertSetting::Channel { bit, inverted });
    }

    if token.len() == count && token.bytes().all(|b| b == b'0' || b == b'1') {
        let mask = token
            .bytes()
            .enumerate()
            .filter(|(_, b)| *b == b'1')
            .fold(0u8, |mask, (i, _)| mask | (1 << i));
        return Ok(InvertSetting::Mask(InvertMask(mask)));
    }

    Err(BoardError::InvalidInvertFormat)
}

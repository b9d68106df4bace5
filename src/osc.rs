//! Minimal OSC 1.0 message codec
//!
//! Handles the subset the board speaks: a single message (no bundles) with
//! `i`, `f` and `s` arguments. Strings are NUL terminated and padded to a
//! four byte boundary, numbers are big-endian.

use heapless::Vec;

use crate::BoardError;

/// One OSC argument
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OscArg<'a> {
    Int(i32),
    Float(f32),
    Str(&'a str),
}

impl OscArg<'_> {
    fn tag(&self) -> u8 {
        match self {
            OscArg::Int(_) => b'i',
            OscArg::Float(_) => b'f',
            OscArg::Str(_) => b's',
        }
    }

    /// Argument read as an on/off level: non-zero numbers and `1`/`on` strings are on
    pub fn as_level(&self) -> Option<bool> {
        match *self {
            OscArg::Int(v) => Some(v != 0),
            OscArg::Float(v) => Some(v >= 0.5),
            OscArg::Str(s) => crate::text::parse_level(s),
        }
    }
}

/// A decoded message borrowing the packet buffer
#[derive(Debug, Clone, Copy)]
pub struct OscMessage<'a> {
    address: &'a str,
    tags: &'a [u8],
    payload: &'a [u8],
}

fn padded(len: usize) -> usize {
    (len + 4) & !3
}

/// Read a padded OSC string from the front of `bytes`, returning it and the bytes consumed
fn read_str(bytes: &[u8]) -> Result<(&str, usize), BoardError> {
    let end = bytes.iter().position(|b| *b == 0).ok_or(BoardError::ProtocolError)?;
    let consumed = padded(end);
    if consumed > bytes.len() {
        return Err(BoardError::ProtocolError);
    }
    let text = core::str::from_utf8(&bytes[..end]).map_err(|_| BoardError::ProtocolError)?;
    Ok((text, consumed))
}

fn read_word(bytes: &[u8]) -> Result<[u8; 4], BoardError> {
    bytes
        .get(..4)
        .and_then(|w| w.try_into().ok())
        .ok_or(BoardError::ProtocolError)
}

impl<'a> OscMessage<'a> {
    pub fn decode(packet: &'a [u8]) -> Result<Self, BoardError> {
        if packet.first() != Some(&b'/') {
            return Err(BoardError::ProtocolError);
        }
        let (address, used) = read_str(packet)?;
        let rest = &packet[used..];

        // a message without a type tag string carries no arguments
        if rest.is_empty() {
            return Ok(Self { address, tags: &[], payload: &[] });
        }
        let (tags, used) = read_str(rest)?;
        let tags = tags.strip_prefix(',').ok_or(BoardError::ProtocolError)?;
        if !tags.bytes().all(|t| matches!(t, b'i' | b'f' | b's')) {
            return Err(BoardError::ProtocolError);
        }

        Ok(Self {
            address,
            tags: tags.as_bytes(),
            payload: &rest[used..],
        })
    }

    pub fn address(&self) -> &'a str {
        self.address
    }

    pub fn arg_count(&self) -> usize {
        self.tags.len()
    }

    /// Arguments in order; a truncated payload yields an error and ends the walk
    pub fn args(&self) -> OscArgs<'a> {
        OscArgs {
            tags: self.tags,
            payload: self.payload,
        }
    }
}

/// Iterator over the arguments of an [`OscMessage`]
pub struct OscArgs<'a> {
    tags: &'a [u8],
    payload: &'a [u8],
}

impl<'a> Iterator for OscArgs<'a> {
    type Item = Result<OscArg<'a>, BoardError>;

    fn next(&mut self) -> Option<Self::Item> {
        let (&tag, tags) = self.tags.split_first()?;
        self.tags = tags;

        let parsed = match tag {
            b'i' => read_word(self.payload).map(|w| (OscArg::Int(i32::from_be_bytes(w)), 4)),
            b'f' => read_word(self.payload).map(|w| (OscArg::Float(f32::from_be_bytes(w)), 4)),
            _ => read_str(self.payload).map(|(s, used)| (OscArg::Str(s), used)),
        };
        match parsed {
            Ok((arg, used)) => {
                self.payload = &self.payload[used..];
                Some(Ok(arg))
            }
            Err(e) => {
                self.tags = &[];
                Some(Err(e))
            }
        }
    }
}

/// Encode one message into a bounded buffer
pub fn encode<const N: usize>(address: &str, args: &[OscArg<'_>]) -> Result<Vec<u8, N>, BoardError> {
    let mut out = Vec::new();
    push_str(&mut out, address.as_bytes())?;

    let mut tags: Vec<u8, 32> = Vec::new();
    tags.push(b',').map_err(|_| BoardError::BufferFull)?;
    for arg in args {
        tags.push(arg.tag()).map_err(|_| BoardError::BufferFull)?;
    }
    push_str(&mut out, &tags)?;

    for arg in args {
        match *arg {
            OscArg::Int(v) => extend(&mut out, &v.to_be_bytes())?,
            OscArg::Float(v) => extend(&mut out, &v.to_be_bytes())?,
            OscArg::Str(s) => push_str(&mut out, s.as_bytes())?,
        }
    }
    Ok(out)
}

fn extend<const N: usize>(out: &mut Vec<u8, N>, bytes: &[u8]) -> Result<(), BoardError> {
    out.extend_from_slice(bytes).map_err(|_| BoardError::BufferFull)
}

fn push_str<const N: usize>(out: &mut Vec<u8, N>, bytes: &[u8]) -> Result<(), BoardError> {
    extend(out, bytes)?;
    for _ in bytes.len()..padded(bytes.len()) {
        out.push(0).map_err(|_| BoardError::BufferFull)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strings_are_padded_to_four_bytes() {
        let packet: Vec<u8, 64> = encode("/gpo", &[]).unwrap();
        assert_eq!(&packet[..], b"/gpo\0\0\0\0,\0\0\0");
        let packet: Vec<u8, 64> = encode("/ab", &[OscArg::Str("xyz")]).unwrap();
        assert_eq!(&packet[..], b"/ab\0,s\0\0xyz\0");
    }

    #[test]
    fn decodes_mixed_arguments() {
        let packet: Vec<u8, 64> = encode(
            "/gpo/switch",
            &[OscArg::Int(3), OscArg::Float(1.0), OscArg::Str("2=on")],
        )
        .unwrap();
        let message = OscMessage::decode(&packet).unwrap();
        assert_eq!(message.address(), "/gpo/switch");
        assert_eq!(message.arg_count(), 3);
        let args: std::vec::Vec<_> = message.args().collect::<Result<_, _>>().unwrap();
        assert_eq!(args, [OscArg::Int(3), OscArg::Float(1.0), OscArg::Str("2=on")]);
    }

    #[test]
    fn message_without_tags_has_no_arguments() {
        let message = OscMessage::decode(b"/gpo/status\0").unwrap();
        assert_eq!(message.address(), "/gpo/status");
        assert_eq!(message.args().count(), 0);
    }

    #[test]
    fn malformed_packets_are_rejected() {
        assert!(OscMessage::decode(b"gpo\0").is_err());
        assert!(OscMessage::decode(b"/gpo").is_err());
        assert!(OscMessage::decode(b"/gpo\0\0\0\0ii\0\0").is_err());
        assert!(OscMessage::decode(b"/gpo\0\0\0\0,x\0\0").is_err());

        // tag promises an int the payload does not carry
        let message = OscMessage::decode(b"/gpo\0\0\0\0,ii\0\0\0\0\0").unwrap();
        let mut args = message.args();
        assert_eq!(args.next(), Some(Ok(OscArg::Int(0))));
        assert_eq!(args.next(), Some(Err(BoardError::ProtocolError)));
        assert_eq!(args.next(), None);
    }

    #[test]
    fn encoder_reports_full_buffer() {
        let result: Result<Vec<u8, 8>, _> = encode("/gpo/status", &[]);
        assert_eq!(result, Err(BoardError::BufferFull));
    }

    #[test]
    fn argument_levels() {
        assert_eq!(OscArg::Int(2).as_level(), Some(true));
        assert_eq!(OscArg::Float(0.0).as_level(), Some(false));
        assert_eq!(OscArg::Str("OFF").as_level(), Some(false));
        assert_eq!(OscArg::Str("half").as_level(), None);
    }
}

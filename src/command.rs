//! Network command protocol
//!
//! Inbound packets come in three shapes, told apart by their first bytes:
//! OSC messages (`/`), HTTP request lines (`GET `) and plain switch-set
//! tokens such as `1=1 2=OFF`. Every switch token is applied on its own, so a
//! malformed token is logged and recorded without stopping the rest.

use core::fmt::Write;
use core::net::Ipv4Addr;

use heapless::{String, Vec};
use log::{debug, info, warn};

use crate::osc::{self, OscArg, OscMessage};
use crate::output::{MAX_OUTPUTS, Outputs, PinBank};
use crate::profile::ActiveConfiguration;
use crate::{BoardError, Variant, config};

/// Per-packet error records kept in an outcome
pub const MAX_REJECTED: usize = 16;

pub type Payload = Vec<u8, { config::MAX_REPLY_SIZE }>;

/// Packet shape, decided from the leading bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    Osc,
    HttpGet,
    Tokens,
}

pub fn classify(packet: &[u8]) -> PacketKind {
    if packet.first() == Some(&b'/') {
        PacketKind::Osc
    } else if packet.starts_with(b"GET ") {
        PacketKind::HttpGet
    } else {
        PacketKind::Tokens
    }
}

/// One `<logical>=<level>` request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchToken {
    pub logical: u8,
    pub level: bool,
}

/// Parse `<logical><sep><level>`, sep `=` or `:`, level `0|1|ON|OFF`
pub fn parse_switch_token(token: &str) -> Result<SwitchToken, BoardError> {
    let (logical, level) = token
        .split_once(['=', ':'])
        .ok_or(BoardError::ProtocolError)?;
    let logical = crate::text::parse_small(logical.trim()).ok_or(BoardError::BadLogicalIndex)?;
    let level = crate::text::parse_level(level.trim()).ok_or(BoardError::ProtocolError)?;
    Ok(SwitchToken { logical, level })
}

/// Split a token sequence on whitespace, `,`, `;` and `&`
pub fn switch_tokens(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| c.is_ascii_whitespace() || matches!(c, ',' | ';' | '&'))
        .filter(|t| !t.is_empty())
}

/// A packet to send back
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub address: Ipv4Addr,
    pub port: u16,
    pub payload: Payload,
}

/// What one inbound packet did
#[derive(Debug, Default)]
pub struct PacketOutcome {
    /// Switch requests driven to the pins
    pub applied: usize,
    /// Per-token or whole-packet failures, oldest first
    pub rejected: Vec<BoardError, MAX_REJECTED>,
    pub reply: Option<Reply>,
}

impl PacketOutcome {
    fn reject(&mut self, error: BoardError) {
        // keep the first failures when a packet is full of garbage
        let _ = self.rejected.push(error);
    }
}

/// Applies inbound packets against the active configuration
pub struct CommandProcessor {
    variant: Variant,
    active: ActiveConfiguration,
    status_enabled: bool,
}

impl CommandProcessor {
    pub fn new(variant: Variant, active: ActiveConfiguration, status_enabled: bool) -> Self {
        Self {
            variant,
            active,
            status_enabled,
        }
    }

    pub fn active(&self) -> &ActiveConfiguration {
        &self.active
    }

    pub fn set_active(&mut self, active: ActiveConfiguration) {
        self.active = active;
    }

    pub fn set_status_enabled(&mut self, enabled: bool) {
        self.status_enabled = enabled;
    }

    /// Handle one packet from `sender`
    pub fn process<B: PinBank>(
        &self,
        packet: &[u8],
        sender: (Ipv4Addr, u16),
        outputs: &mut Outputs<B>,
    ) -> PacketOutcome {
        let mut outcome = PacketOutcome::default();
        let kind = classify(packet);
        debug!("[CMD] {} byte {:?} packet from {}:{}", packet.len(), kind, sender.0, sender.1);

        let result = match kind {
            PacketKind::Osc => self.process_osc(packet, sender, outputs, &mut outcome),
            PacketKind::HttpGet => self.process_http(packet, sender, outputs, &mut outcome),
            PacketKind::Tokens => match core::str::from_utf8(packet) {
                Ok(text) => {
                    self.apply_tokens(text, outputs, &mut outcome);
                    self.report_after_switch(sender.0, outputs, &mut outcome)
                }
                Err(_) => Err(BoardError::ProtocolError),
            },
        };
        if let Err(e) = result {
            warn!("[CMD] Packet from {} rejected: {:?}", sender.0, e);
            outcome.reject(e);
        }

        if outcome.applied > 0 {
            info!(
                "[CMD] Applied {} switch request(s), {} rejected",
                outcome.applied,
                outcome.rejected.len()
            );
        }
        outcome
    }

    fn apply<B: PinBank>(
        &self,
        logical: u8,
        level: bool,
        outputs: &mut Outputs<B>,
        outcome: &mut PacketOutcome,
    ) {
        match outputs.set_logical(logical, level) {
            Ok(()) => outcome.applied += 1,
            Err(e) => {
                warn!("[CMD] Output {} not switched: {:?}", logical, e);
                outcome.reject(e);
            }
        }
    }

    fn apply_tokens<B: PinBank>(&self, text: &str, outputs: &mut Outputs<B>, outcome: &mut PacketOutcome) {
        for token in switch_tokens(text) {
            match parse_switch_token(token) {
                Ok(SwitchToken { logical, level }) => self.apply(logical, level, outputs, outcome),
                Err(e) => {
                    warn!("[CMD] Bad switch token '{}': {:?}", token, e);
                    outcome.reject(e);
                }
            }
        }
    }

    fn process_osc<B: PinBank>(
        &self,
        packet: &[u8],
        sender: (Ipv4Addr, u16),
        outputs: &mut Outputs<B>,
        outcome: &mut PacketOutcome,
    ) -> Result<(), BoardError> {
        let message = OscMessage::decode(packet)?;
        let path = message
            .address()
            .strip_prefix(config::OSC_PREFIX)
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or(BoardError::ProtocolError)?;

        if path == "status" {
            if self.variant != Variant::Osc {
                return Err(BoardError::ProtocolError);
            }
            outcome.reply = self.status_report(sender.0, outputs)?;
            return Ok(());
        }

        if path == "switch" {
            // a bad index still consumes its level, keeping later pairs aligned
            let mut pending: Option<Result<u8, BoardError>> = None;
            for arg in message.args() {
                match (arg?, pending.take()) {
                    (OscArg::Str(tokens), None) => self.apply_tokens(tokens, outputs, outcome),
                    (OscArg::Int(index), None) => {
                        pending = Some(u8::try_from(index).map_err(|_| BoardError::BadLogicalIndex))
                    }
                    (OscArg::Float(_), None) => {
                        warn!("[CMD] Float without an output index in /gpo/switch");
                        outcome.reject(BoardError::ProtocolError);
                    }
                    (level, Some(logical)) => match (logical, level.as_level()) {
                        (Ok(logical), Some(level)) => self.apply(logical, level, outputs, outcome),
                        (Err(e), _) => {
                            warn!("[CMD] Output index out of range in /gpo/switch");
                            outcome.reject(e);
                        }
                        (Ok(logical), None) => {
                            warn!("[CMD] Bad level for output {}: {:?}", logical, level);
                            outcome.reject(BoardError::ProtocolError);
                        }
                    },
                }
            }
            if pending.is_some() {
                warn!("[CMD] /gpo/switch ends with an index and no level");
                outcome.reject(BoardError::ProtocolError);
            }
        } else {
            let logical = crate::text::parse_small(path).ok_or(BoardError::ProtocolError)?;
            let mut args = message.args();
            let level = match (args.next(), args.next()) {
                (Some(arg), None) => arg?.as_level().ok_or(BoardError::ProtocolError)?,
                _ => return Err(BoardError::ProtocolError),
            };
            self.apply(logical, level, outputs, outcome);
        }

        self.report_after_switch(sender.0, outputs, outcome)
    }

    fn process_http<B: PinBank>(
        &self,
        packet: &[u8],
        sender: (Ipv4Addr, u16),
        outputs: &mut Outputs<B>,
        outcome: &mut PacketOutcome,
    ) -> Result<(), BoardError> {
        if self.variant != Variant::HttpGet {
            return Err(BoardError::ProtocolError);
        }
        let head = packet
            .split(|b| *b == b'\r' || *b == b'\n')
            .next()
            .unwrap_or_default();
        let line = core::str::from_utf8(head).map_err(|_| BoardError::ProtocolError)?;
        let target = line
            .strip_prefix("GET ")
            .and_then(|rest| rest.split(' ').next())
            .ok_or(BoardError::ProtocolError)?;
        let (path, query) = target.split_once('?').unwrap_or((target, ""));

        let payload = if path == config::SWITCH_PATH {
            self.apply_tokens(query, outputs, outcome);
            http_states(outputs)?
        } else {
            debug!("[CMD] HTTP path {} not found", path);
            http_not_found()?
        };

        outcome.reply = Some(Reply {
            address: sender.0,
            port: sender.1,
            payload,
        });
        Ok(())
    }

    fn report_after_switch<B: PinBank>(
        &self,
        sender: Ipv4Addr,
        outputs: &mut Outputs<B>,
        outcome: &mut PacketOutcome,
    ) -> Result<(), BoardError> {
        if self.variant == Variant::Osc && self.status_enabled && outcome.applied > 0 {
            outcome.reply = self.status_report(sender, outputs)?;
        }
        Ok(())
    }

    /// Build the OSC status report, or `None` when the status port is 0
    pub fn status_report<B: PinBank>(
        &self,
        sender: Ipv4Addr,
        outputs: &mut Outputs<B>,
    ) -> Result<Option<Reply>, BoardError> {
        let profile = &self.active.profile;
        if profile.status_port == 0 {
            debug!("[CMD] Status port is 0, no report sent");
            return Ok(None);
        }
        let address = if profile.secondary.is_unspecified() {
            sender
        } else {
            profile.secondary
        };

        let mut mac: String<17> = String::new();
        write!(mac, "{}", self.active.mac).map_err(|_| BoardError::BufferFull)?;
        let mut ip: String<15> = String::new();
        write!(ip, "{}", profile.ip).map_err(|_| BoardError::BufferFull)?;

        let mut args: Vec<OscArg<'_>, { MAX_OUTPUTS + 4 }> = Vec::new();
        let header = [
            OscArg::Str(&mac),
            OscArg::Str(&ip),
            OscArg::Int(i32::from(profile.listen_port)),
            OscArg::Int(i32::from(profile.status_port)),
        ];
        args.extend_from_slice(&header).map_err(|_| BoardError::BufferFull)?;
        for (_, level) in outputs.states()? {
            args.push(OscArg::Int(i32::from(level))).map_err(|_| BoardError::BufferFull)?;
        }

        let payload = osc::encode(config::OSC_STATUS_ADDRESS, &args)?;
        debug!("[CMD] Status report to {}:{}", address, profile.status_port);
        Ok(Some(Reply {
            address,
            port: profile.status_port,
            payload,
        }))
    }
}

fn http_states<B: PinBank>(outputs: &mut Outputs<B>) -> Result<Payload, BoardError> {
    let mut body: String<64> = String::new();
    for (i, (logical, level)) in outputs.states()?.into_iter().enumerate() {
        let sep = if i == 0 { "" } else { "&" };
        write!(body, "{}{}={}", sep, logical, u8::from(level)).map_err(|_| BoardError::BufferFull)?;
    }
    http_response("200 OK", &body)
}

fn http_not_found() -> Result<Payload, BoardError> {
    http_response("404 Not Found", "not found")
}

fn http_response(status: &str, body: &str) -> Result<Payload, BoardError> {
    let mut text: String<{ config::MAX_REPLY_SIZE }> = String::new();
    write!(
        text,
        "HTTP/1.1 {}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    )
    .map_err(|_| BoardError::BufferFull)?;
    Vec::from_slice(text.as_bytes()).map_err(|_| BoardError::BufferFull)
}

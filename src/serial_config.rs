//! Serial configuration console
//!
//! Line oriented command interpreter used from a terminal program to edit the
//! MAC, output inverts and the four IP sets. Edits are staged in an
//! [`EditSession`] and only reach the store on `COMMIT`, one whole region per
//! write. Malformed input is reported with a single `ERR` line and never
//! touches committed configuration.

use core::fmt::Write;

use embedded_storage::Storage;
use heapless::String;
use log::{info, warn};

use crate::layout::{PROFILE_FIELDS, ProfileField};
use crate::output::OutputMap;
use crate::profile::{FieldValue, InvertMask, IpProfile, MacAddress, ProfileIndex};
use crate::state_machine::{LineEvent, LineState, LineStateMachine};
use crate::store::ConfigStore;
use crate::text::{self, InvertSetting};
use crate::{APP_NAME, BoardError, VERSION, Variant, config};

type Line = String<{ config::SERIAL_LINE_CAPACITY }>;

/// A console line parsed into its effect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsedCommand {
    Mac(MacAddress),
    Invert(InvertSetting),
    SetIp {
        index: ProfileIndex,
        field: ProfileField,
        value: FieldValue,
    },
    Commit,
    Abort,
    Print,
    Ident,
    Reload,
    Help,
}

/// Parse one console line. Command words are case-insensitive.
pub fn parse_line(line: &str, variant: Variant, outputs: &OutputMap) -> Result<ParsedCommand, BoardError> {
    let mut words = line.split_ascii_whitespace();
    let command = words.next().ok_or(BoardError::UnknownCommand)?;
    let is = |name: &str| command.eq_ignore_ascii_case(name);

    let parsed = if is("MAC") {
        let value = single_argument(&mut words).ok_or(BoardError::InvalidMacFormat)?;
        ParsedCommand::Mac(text::parse_mac(value)?)
    } else if is("INVERT") {
        let value = single_argument(&mut words).ok_or(BoardError::InvalidInvertFormat)?;
        ParsedCommand::Invert(text::parse_invert(
            value,
            outputs.first_logical(),
            outputs.count(),
        )?)
    } else if is("IP") {
        let index = words
            .next()
            .and_then(text::parse_small)
            .ok_or(BoardError::BadProfileIndex)?;
        let index = ProfileIndex::new(index)?;
        let field = ProfileField::from_name(words.next().ok_or(BoardError::UnknownField)?, variant)?;
        let raw = single_argument(&mut words).ok_or(BoardError::InvalidIpFormat)?;
        let value = match field {
            ProfileField::ListenPort | ProfileField::StatusPort => FieldValue::Port(text::parse_port(raw)?),
            _ => FieldValue::Address(text::parse_dotted_quad(raw)?),
        };
        ParsedCommand::SetIp { index, field, value }
    } else if is("COMMIT") || is("WRITE") || is("SAVE") {
        ParsedCommand::Commit
    } else if is("ABORT") || is("DISCARD") {
        ParsedCommand::Abort
    } else if is("PRINT") || is("SHOW") || is("?") {
        ParsedCommand::Print
    } else if is("IDENT") || is("ID") {
        ParsedCommand::Ident
    } else if is("RELOAD") {
        ParsedCommand::Reload
    } else if is("HELP") {
        ParsedCommand::Help
    } else {
        return Err(BoardError::UnknownCommand);
    };
    Ok(parsed)
}

fn single_argument<'a>(words: &mut impl Iterator<Item = &'a str>) -> Option<&'a str> {
    let value = words.next()?;
    match words.next() {
        Some(_) => None,
        None => Some(value),
    }
}

/// A staged copy of one IP set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditableProfile {
    pub index: ProfileIndex,
    pub profile: IpProfile,
}

/// Edits waiting for `COMMIT`
#[derive(Debug, Default)]
pub struct EditSession {
    mac: Option<MacAddress>,
    invert: Option<InvertMask>,
    profiles: [Option<EditableProfile>; config::IP_SETS],
}

impl EditSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.mac.is_none() && self.invert.is_none() && self.profiles.iter().all(Option::is_none)
    }

    pub fn staged_mac(&self) -> Option<MacAddress> {
        self.mac
    }

    pub fn staged_invert(&self) -> Option<InvertMask> {
        self.invert
    }

    pub fn staged_profile(&self, index: ProfileIndex) -> Option<&EditableProfile> {
        self.profiles[usize::from(index.get())].as_ref()
    }

    pub fn stage_mac(&mut self, mac: MacAddress) {
        self.mac = Some(mac);
    }

    /// Stage an invert change; single-channel forms build on the staged or stored mask
    pub fn stage_invert<S: Storage>(
        &mut self,
        store: &mut ConfigStore<S>,
        setting: InvertSetting,
    ) -> Result<InvertMask, BoardError> {
        let current = match (self.invert, setting) {
            (Some(staged), _) => staged,
            (None, InvertSetting::Channel { .. }) => store.read_invert()?,
            (None, InvertSetting::Mask(_)) => InvertMask(0),
        };
        let mask = setting.apply(current);
        self.invert = Some(mask);
        Ok(mask)
    }

    /// Stage one field of an IP set. The set is read from the store the first
    /// time it is edited so the commit writes a complete block.
    pub fn stage_field<S: Storage>(
        &mut self,
        store: &mut ConfigStore<S>,
        index: ProfileIndex,
        field: ProfileField,
        value: FieldValue,
    ) -> Result<(), BoardError> {
        let slot = &mut self.profiles[usize::from(index.get())];
        let mut editable = match slot {
            Some(editable) => *editable,
            None => EditableProfile {
                index,
                profile: store.read_profile(index.get())?,
            },
        };
        editable.profile.set(field, value)?;
        *slot = Some(editable);
        Ok(())
    }

    /// Write every staged region. Regions written are cleared from the
    /// session; on a storage failure the remaining ones stay staged.
    pub fn commit<S: Storage>(&mut self, store: &mut ConfigStore<S>) -> Result<usize, BoardError> {
        let mut written = 0;

        if let Some(mac) = self.mac {
            store.write_mac(mac)?;
            self.mac = None;
            written += 1;
        }
        if let Some(mask) = self.invert {
            store.write_invert(mask)?;
            self.invert = None;
            written += 1;
        }
        for slot in self.profiles.iter_mut() {
            if let Some(editable) = slot {
                store.write_profile(editable.index.get(), &editable.profile)?;
                *slot = None;
                written += 1;
            }
        }

        Ok(written)
    }

    pub fn discard(&mut self) {
        *self = Self::new();
    }
}

/// Outcome of one console line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleEvent {
    /// The line was applied
    Done,
    /// The line was rejected and reported
    Rejected(BoardError),
    /// The operator asked for the active configuration to be rebuilt
    ReloadRequested,
}

/// Serial console: line accumulator, parser and edit session
pub struct SerialConsole {
    line: Line,
    state_machine: LineStateMachine,
    session: EditSession,
    outputs: OutputMap,
    variant: Variant,
    active: Option<ProfileIndex>,
}

impl SerialConsole {
    pub fn new(variant: Variant, outputs: OutputMap, active: Option<ProfileIndex>) -> Self {
        Self {
            line: Line::new(),
            state_machine: LineStateMachine::new(),
            session: EditSession::new(),
            outputs,
            variant,
            active,
        }
    }

    pub fn session(&self) -> &EditSession {
        &self.session
    }

    pub fn line_state(&self) -> LineState {
        self.state_machine.get_current_state()
    }

    pub fn set_active(&mut self, active: Option<ProfileIndex>) {
        self.active = active;
    }

    /// Feed one received byte. Returns an event when a line completes or is
    /// rejected for length; responses are written to `out`.
    pub fn feed<S: Storage, W: Write>(
        &mut self,
        byte: u8,
        store: &mut ConfigStore<S>,
        out: &mut W,
    ) -> Option<ConsoleEvent> {
        match byte {
            b'\r' | b'\n' => self.end_of_line(store, out),
            0x08 | 0x7F => {
                if self.state_machine.get_current_state() == LineState::Accumulating {
                    self.line.pop();
                }
                None
            }
            0x20..=0x7E => self.accept(byte as char, out),
            _ => None,
        }
    }

    /// Feed a run of bytes, returning the last event produced
    pub fn feed_all<S: Storage, W: Write>(
        &mut self,
        bytes: &[u8],
        store: &mut ConfigStore<S>,
        out: &mut W,
    ) -> Option<ConsoleEvent> {
        let mut last = None;
        for &byte in bytes {
            if let Some(event) = self.feed(byte, store, out) {
                last = Some(event);
            }
        }
        last
    }

    fn accept<W: Write>(&mut self, c: char, out: &mut W) -> Option<ConsoleEvent> {
        if !self.state_machine.is_accepting() {
            return None;
        }
        self.state_machine.handle_event(LineEvent::Byte);
        if self.line.push(c).is_err() {
            self.state_machine.handle_event(LineEvent::Overflow);
            self.line.clear();
            warn!("[SERIAL] Line longer than {} characters dropped", config::SERIAL_LINE_CAPACITY);
            let _ = writeln!(out, "ERR {}", BoardError::LineOverflow);
            return Some(ConsoleEvent::Rejected(BoardError::LineOverflow));
        }
        None
    }

    fn end_of_line<S: Storage, W: Write>(
        &mut self,
        store: &mut ConfigStore<S>,
        out: &mut W,
    ) -> Option<ConsoleEvent> {
        match self.state_machine.get_current_state() {
            LineState::Discarding => {
                self.state_machine.handle_event(LineEvent::Terminator);
                None
            }
            LineState::Accumulating if !self.line.trim().is_empty() => {
                self.state_machine.handle_event(LineEvent::Terminator);
                let line = core::mem::take(&mut self.line);
                let event = match self.dispatch(line.trim(), store, out) {
                    Ok(event) => event,
                    Err(e) => {
                        warn!("[SERIAL] Rejected '{}': {:?}", line.as_str(), e);
                        let _ = writeln!(out, "ERR {}", e);
                        ConsoleEvent::Rejected(e)
                    }
                };
                self.state_machine.handle_event(LineEvent::Dispatched);
                Some(event)
            }
            _ => {
                self.line.clear();
                None
            }
        }
    }

    fn dispatch<S: Storage, W: Write>(
        &mut self,
        line: &str,
        store: &mut ConfigStore<S>,
        out: &mut W,
    ) -> Result<ConsoleEvent, BoardError> {
        let command = parse_line(line, self.variant, &self.outputs)?;

        match command {
            ParsedCommand::Mac(mac) => {
                self.session.stage_mac(mac);
                let _ = writeln!(out, "OK MAC {} staged, COMMIT to save", mac);
            }
            ParsedCommand::Invert(setting) => {
                let mask = self.session.stage_invert(store, setting)?;
                let _ = writeln!(out, "OK INVERT {} staged, COMMIT to save", mask.render(self.outputs.count()));
            }
            ParsedCommand::SetIp { index, field, value } => {
                self.session.stage_field(store, index, field, value)?;
                let _ = write!(out, "OK SET {} {} ", index.get(), field.display_name(self.variant));
                let _ = write_value(out, value);
                let _ = writeln!(out, " staged, COMMIT to save");
            }
            ParsedCommand::Commit => {
                if self.session.is_empty() {
                    let _ = writeln!(out, "OK nothing to commit");
                } else {
                    let written = self.session.commit(store)?;
                    info!("[SERIAL] Committed {} region(s)", written);
                    let _ = writeln!(out, "OK committed {} region(s), RELOAD or restart to apply", written);
                }
            }
            ParsedCommand::Abort => {
                self.session.discard();
                let _ = writeln!(out, "OK staged edits discarded");
            }
            ParsedCommand::Print => self.print(store, out)?,
            ParsedCommand::Ident => {
                let _ = writeln!(out, "{} {} ({} variant)", APP_NAME, VERSION, self.variant.name());
            }
            ParsedCommand::Reload => {
                let _ = writeln!(out, "OK reloading active profile");
                return Ok(ConsoleEvent::ReloadRequested);
            }
            ParsedCommand::Help => self.help(out),
        }
        Ok(ConsoleEvent::Done)
    }

    fn print<S: Storage, W: Write>(&self, store: &mut ConfigStore<S>, out: &mut W) -> Result<(), BoardError> {
        let count = self.outputs.count();
        let mac = store.read_mac()?;
        let invert = store.read_invert()?;

        let _ = writeln!(out, "{} {} ({} variant)", APP_NAME, VERSION, self.variant.name());
        let _ = writeln!(out, "MAC    {}", mac);
        let _ = writeln!(out, "INVERT {}", invert.render(count));
        for index in ProfileIndex::all() {
            let profile = store.read_profile(index.get())?;
            let marker = if self.active == Some(index) { '*' } else { ' ' };
            let _ = write!(out, "SET {}{} ", index.get(), marker);
            let _ = write_profile(out, self.variant, &profile);
            let _ = writeln!(out);
        }

        if let Some(mac) = self.session.staged_mac() {
            let _ = writeln!(out, "STAGED MAC    {}", mac);
        }
        if let Some(mask) = self.session.staged_invert() {
            let _ = writeln!(out, "STAGED INVERT {}", mask.render(count));
        }
        for index in ProfileIndex::all() {
            if let Some(editable) = self.session.staged_profile(index) {
                let _ = write!(out, "STAGED SET {}  ", index.get());
                let _ = write_profile(out, self.variant, &editable.profile);
                let _ = writeln!(out);
            }
        }
        Ok(())
    }

    fn help<W: Write>(&self, out: &mut W) {
        let secondary = ProfileField::Secondary.display_name(self.variant);
        let _ = writeln!(out, "MAC aa:bb:cc:dd:ee:ff        stage MAC address");
        let _ = writeln!(out, "INVERT <0101..|0xHH|ALL|NONE|n=ON|n=OFF>");
        let _ = writeln!(out, "IP <0-3> <ip|mask|gw|{}|port> <value>", secondary);
        if self.variant == Variant::Osc {
            let _ = writeln!(out, "IP <0-3> statport <value>");
        }
        let _ = writeln!(out, "COMMIT | ABORT | PRINT | IDENT | RELOAD");
    }
}

fn write_value<W: Write>(out: &mut W, value: FieldValue) -> core::fmt::Result {
    match value {
        FieldValue::Address(address) => write!(out, "{}", address),
        FieldValue::Port(port) => write!(out, "{}", port),
    }
}

/// One line rendering of an IP set, fields in layout order
pub fn write_profile<W: Write>(out: &mut W, variant: Variant, profile: &IpProfile) -> core::fmt::Result {
    let mut first = true;
    for field in PROFILE_FIELDS.iter().map(|s| s.field).filter(|f| f.present_in(variant)) {
        if !first {
            out.write_char(' ')?;
        }
        first = false;
        write!(out, "{} ", field.display_name(variant))?;
        write_value(out, profile.get(field))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::tests::EIGHT;
    use crate::store::RamEeprom;
    use core::net::Ipv4Addr;
    use std::string::String as StdString;

    fn console(variant: Variant) -> (SerialConsole, ConfigStore<RamEeprom>) {
        let store = ConfigStore::new(RamEeprom::new(), variant).unwrap();
        let map = OutputMap::new(&EIGHT).unwrap();
        (SerialConsole::new(variant, map, ProfileIndex::new(0).ok()), store)
    }

    fn send(
        console: &mut SerialConsole,
        store: &mut ConfigStore<RamEeprom>,
        line: &str,
    ) -> (Option<ConsoleEvent>, StdString) {
        let mut out = StdString::new();
        let mut bytes = line.as_bytes().to_vec();
        bytes.push(b'\n');
        let event = console.feed_all(&bytes, store, &mut out);
        (event, out)
    }

    #[test]
    fn parse_line_produces_tagged_commands() {
        let map = OutputMap::new(&EIGHT).unwrap();
        assert_eq!(
            parse_line("mac AA:BB:CC:DD:EE:FF", Variant::Osc, &map),
            Ok(ParsedCommand::Mac(MacAddress([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF])))
        );
        assert_eq!(
            parse_line("IP 2 gw 10.0.0.1", Variant::Osc, &map),
            Ok(ParsedCommand::SetIp {
                index: ProfileIndex::new(2).unwrap(),
                field: ProfileField::Gateway,
                value: FieldValue::Address(Ipv4Addr::new(10, 0, 0, 1)),
            })
        );
        assert_eq!(
            parse_line("ip 0 port 8000", Variant::HttpGet, &map),
            Ok(ParsedCommand::SetIp {
                index: ProfileIndex::new(0).unwrap(),
                field: ProfileField::ListenPort,
                value: FieldValue::Port(8000),
            })
        );
        assert_eq!(parse_line("save", Variant::Osc, &map), Ok(ParsedCommand::Commit));
        assert_eq!(parse_line("?", Variant::Osc, &map), Ok(ParsedCommand::Print));
        assert_eq!(parse_line("reboot", Variant::Osc, &map), Err(BoardError::UnknownCommand));
        assert_eq!(parse_line("IP 4 ip 1.2.3.4", Variant::Osc, &map), Err(BoardError::BadProfileIndex));
        assert_eq!(parse_line("IP x ip 1.2.3.4", Variant::Osc, &map), Err(BoardError::BadProfileIndex));
        assert_eq!(parse_line("IP +1 ip 1.2.3.4", Variant::Osc, &map), Err(BoardError::BadProfileIndex));
        assert_eq!(parse_line("IP 1 ip 1.2.3", Variant::Osc, &map), Err(BoardError::InvalidIpFormat));
        assert_eq!(parse_line("IP 1 port 70000", Variant::Osc, &map), Err(BoardError::InvalidIpFormat));
        assert_eq!(parse_line("IP 1 ip 1.2.3.4 5", Variant::Osc, &map), Err(BoardError::InvalidIpFormat));
        assert_eq!(parse_line("IP 1 statport 9", Variant::HttpGet, &map), Err(BoardError::UnknownField));
        assert_eq!(parse_line("MAC AA:BB:CC:DD:EE", Variant::Osc, &map), Err(BoardError::InvalidMacFormat));
        assert_eq!(parse_line("INVERT sometimes", Variant::Osc, &map), Err(BoardError::InvalidInvertFormat));
    }

    #[test]
    fn staged_ip_is_persisted_only_on_commit() {
        let (mut console, mut store) = console(Variant::Osc);
        let before = store.storage().snapshot();

        let (event, out) = send(&mut console, &mut store, "IP 1 ip 192.168.1.10");
        assert_eq!(event, Some(ConsoleEvent::Done));
        assert!(out.starts_with("OK SET 1 ip 192.168.1.10"));
        assert_eq!(store.storage().snapshot(), before);

        let (event, _) = send(&mut console, &mut store, "COMMIT");
        assert_eq!(event, Some(ConsoleEvent::Done));
        let profile = store.read_profile(1).unwrap();
        assert_eq!(profile.ip, Ipv4Addr::new(192, 168, 1, 10));
        // untouched fields keep their stored bytes
        assert_eq!(profile.gateway, Ipv4Addr::new(255, 255, 255, 255));
        assert!(console.session().is_empty());
    }

    #[test]
    fn rejected_addresses_leave_store_unchanged() {
        let (mut console, mut store) = console(Variant::Osc);
        send(&mut console, &mut store, "IP 0 ip 10.1.1.1");
        send(&mut console, &mut store, "COMMIT");
        let before = store.storage().snapshot();

        for bad in ["IP 0 ip 192.168.1", "IP 0 ip 999.1.1.1", "IP 0 ip 10.0.0.1.5"] {
            let (event, out) = send(&mut console, &mut store, bad);
            assert_eq!(event, Some(ConsoleEvent::Rejected(BoardError::InvalidIpFormat)));
            assert!(out.starts_with("ERR "));
        }
        let (event, _) = send(&mut console, &mut store, "IP 7 ip 10.0.0.1");
        assert_eq!(event, Some(ConsoleEvent::Rejected(BoardError::BadProfileIndex)));

        send(&mut console, &mut store, "COMMIT");
        assert_eq!(store.storage().snapshot(), before);
        assert_eq!(store.read_profile(0).unwrap().ip, Ipv4Addr::new(10, 1, 1, 1));
    }

    #[test]
    fn mac_edit_and_rejection() {
        let (mut console, mut store) = console(Variant::HttpGet);
        send(&mut console, &mut store, "MAC AA:BB:CC:DD:EE:FF");
        send(&mut console, &mut store, "COMMIT");
        assert_eq!(store.read_mac().unwrap().0, [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);

        let (event, _) = send(&mut console, &mut store, "MAC 11:22:33:44:55");
        assert_eq!(event, Some(ConsoleEvent::Rejected(BoardError::InvalidMacFormat)));
        let (event, _) = send(&mut console, &mut store, "MAC 11:22:33:44:55:GG");
        assert_eq!(event, Some(ConsoleEvent::Rejected(BoardError::InvalidMacFormat)));
        send(&mut console, &mut store, "COMMIT");
        assert_eq!(store.read_mac().unwrap().0, [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
    }

    #[test]
    fn channel_invert_builds_on_stored_mask() {
        let (mut console, mut store) = console(Variant::Osc);
        store.write_invert(InvertMask(0x01)).unwrap();
        let (_, out) = send(&mut console, &mut store, "INVERT 8=on");
        assert!(out.contains("10000001"), "{out}");
        send(&mut console, &mut store, "commit");
        assert_eq!(store.read_invert(), Ok(InvertMask(0x81)));
    }

    #[test]
    fn abort_discards_staged_edits() {
        let (mut console, mut store) = console(Variant::Osc);
        let before = store.storage().snapshot();
        send(&mut console, &mut store, "MAC 02:00:00:00:00:01");
        send(&mut console, &mut store, "INVERT ALL");
        send(&mut console, &mut store, "IP 3 statport 9000");
        assert!(!console.session().is_empty());
        send(&mut console, &mut store, "ABORT");
        let (_, out) = send(&mut console, &mut store, "COMMIT");
        assert!(out.contains("nothing to commit"));
        assert_eq!(store.storage().snapshot(), before);
    }

    #[test]
    fn overlong_line_is_reported_and_dropped() {
        let (mut console, mut store) = console(Variant::Osc);
        let before = store.storage().snapshot();
        let long = format!("IP 0 ip 10.0.0.1 {}", "x".repeat(config::SERIAL_LINE_CAPACITY));

        let (event, out) = send(&mut console, &mut store, &long);
        assert_eq!(event, Some(ConsoleEvent::Rejected(BoardError::LineOverflow)));
        assert_eq!(out.lines().count(), 1);
        assert!(console.session().is_empty());
        assert_eq!(console.line_state(), LineState::Reset);

        let (event, _) = send(&mut console, &mut store, "IP 0 ip 10.0.0.2");
        assert_eq!(event, Some(ConsoleEvent::Done));
        assert_eq!(store.storage().snapshot(), before);
    }

    #[test]
    fn unknown_command_and_line_editing() {
        let (mut console, mut store) = console(Variant::Osc);
        let (event, out) = send(&mut console, &mut store, "FORMAT");
        assert_eq!(event, Some(ConsoleEvent::Rejected(BoardError::UnknownCommand)));
        assert_eq!(out, "ERR unknown command, try HELP\n");

        // backspace fixes a typo before the terminator
        let (event, _) = send(&mut console, &mut store, "IDENTX\x08");
        assert_eq!(event, Some(ConsoleEvent::Done));

        // CRLF does not produce a second, empty dispatch
        let mut out = StdString::new();
        let event = console.feed_all(b"RELOAD\r\n", &mut store, &mut out);
        assert_eq!(event, Some(ConsoleEvent::ReloadRequested));
        assert_eq!(out.lines().count(), 1);
    }

    #[test]
    fn print_renders_stored_and_staged_values() {
        let (mut console, mut store) = console(Variant::Osc);
        send(&mut console, &mut store, "MAC 02:00:00:00:00:01");
        send(&mut console, &mut store, "IP 0 ip 192.168.1.10");
        send(&mut console, &mut store, "IP 0 statport 0");
        send(&mut console, &mut store, "COMMIT");
        send(&mut console, &mut store, "IP 2 gw 10.0.0.1");
        let before = store.storage().snapshot();

        let (_, out) = send(&mut console, &mut store, "PRINT");
        assert!(out.contains("MAC    02:00:00:00:00:01"), "{out}");
        assert!(out.contains("SET 0* ip 192.168.1.10 mask 255.255.255.255"), "{out}");
        assert!(out.contains("statport 0"), "{out}");
        assert!(out.contains("STAGED SET 2  ip 255.255.255.255 mask 255.255.255.255 gw 10.0.0.1"), "{out}");
        assert_eq!(store.storage().snapshot(), before);
    }

    #[test]
    fn worst_case_print_fits_reply_buffer() {
        // an erased store renders every address and port at full width
        let (mut console, mut store) = console(Variant::Osc);
        send(&mut console, &mut store, "MAC 02:00:00:00:00:01");
        send(&mut console, &mut store, "INVERT 0x0F");
        for n in 0..4 {
            send(&mut console, &mut store, &format!("IP {n} port 65535"));
        }

        let mut bounded: String<{ config::SERIAL_REPLY_CAPACITY }> = String::new();
        console.feed_all(b"PRINT\n", &mut store, &mut bounded);
        let (_, unbounded) = send(&mut console, &mut store, "PRINT");
        assert!(unbounded.contains("STAGED SET 3"), "{unbounded}");
        assert_eq!(bounded.as_str(), unbounded);
    }

    #[test]
    fn commit_failure_keeps_unwritten_edits() {
        let (mut console, mut store) = console(Variant::Osc);
        send(&mut console, &mut store, "INVERT 0x0F");
        store.storage_mut().fail_writes(true);
        let (event, _) = send(&mut console, &mut store, "COMMIT");
        assert_eq!(event, Some(ConsoleEvent::Rejected(BoardError::Storage)));
        assert_eq!(console.session().staged_invert(), Some(InvertMask(0x0F)));

        store.storage_mut().fail_writes(false);
        send(&mut console, &mut store, "COMMIT");
        assert_eq!(store.read_invert(), Ok(InvertMask(0x0F)));
    }
}

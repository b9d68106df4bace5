//! Configuration data model and profile selection
//!
//! Two select inputs form a 2-bit index choosing one of four stored IP
//! profiles. The chosen profile, together with the MAC and invert mask, is
//! cached as the [`ActiveConfiguration`] for the rest of the run.

use core::fmt;
use core::net::Ipv4Addr;

use embedded_hal::digital::InputPin;
use embedded_storage::Storage;
use log::info;

use crate::layout::{Codec, PROFILE_FIELDS, ProfileField};
use crate::store::ConfigStore;
use crate::{BoardError, Variant, config};

/// Ethernet hardware address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MacAddress(pub [u8; 6]);

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            m[0], m[1], m[2], m[3], m[4], m[5]
        )
    }
}

/// Output polarity flags, bit `k` belongs to the `k`th logical output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InvertMask(pub u8);

impl InvertMask {
    /// Mask with every one of `count` outputs inverted
    pub fn all(count: usize) -> Self {
        match count {
            0 => InvertMask(0),
            1..=7 => InvertMask((1u8 << count) - 1),
            _ => InvertMask(0xFF),
        }
    }

    pub fn is_inverted(self, bit: u8) -> bool {
        bit < 8 && self.0 & (1 << bit) != 0
    }

    pub fn with_bit(self, bit: u8, inverted: bool) -> Self {
        if bit >= 8 {
            return self;
        }
        if inverted {
            InvertMask(self.0 | (1 << bit))
        } else {
            InvertMask(self.0 & !(1 << bit))
        }
    }

    /// Render as one `0`/`1` per output, first output leftmost
    pub fn render(self, count: usize) -> heapless::String<8> {
        let mut out = heapless::String::new();
        for bit in 0..count.min(8) {
            let c = if self.is_inverted(bit as u8) { '1' } else { '0' };
            let _ = out.push(c);
        }
        out
    }
}

/// Validated index of one of the four stored IP profiles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileIndex(u8);

impl ProfileIndex {
    pub fn new(index: u8) -> Result<Self, BoardError> {
        if usize::from(index) < config::IP_SETS {
            Ok(ProfileIndex(index))
        } else {
            Err(BoardError::BadProfileIndex)
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// Every valid index, in order
    pub fn all() -> impl Iterator<Item = ProfileIndex> {
        (0..config::IP_SETS as u8).map(ProfileIndex)
    }
}

/// One network profile as stored in an IP set block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpProfile {
    pub ip: Ipv4Addr,
    pub subnet_mask: Ipv4Addr,
    pub gateway: Ipv4Addr,
    /// DNS server (HTTP GET) or status report target (OSC)
    pub secondary: Ipv4Addr,
    pub listen_port: u16,
    /// Destination port for status reports, OSC only; 0 disables reports
    pub status_port: u16,
}

impl Default for IpProfile {
    fn default() -> Self {
        Self {
            ip: Ipv4Addr::UNSPECIFIED,
            subnet_mask: Ipv4Addr::UNSPECIFIED,
            gateway: Ipv4Addr::UNSPECIFIED,
            secondary: Ipv4Addr::UNSPECIFIED,
            listen_port: 0,
            status_port: 0,
        }
    }
}

/// A decoded profile value for one field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldValue {
    Address(Ipv4Addr),
    Port(u16),
}

impl IpProfile {
    pub fn get(&self, field: ProfileField) -> FieldValue {
        match field {
            ProfileField::Ip => FieldValue::Address(self.ip),
            ProfileField::SubnetMask => FieldValue::Address(self.subnet_mask),
            ProfileField::Gateway => FieldValue::Address(self.gateway),
            ProfileField::Secondary => FieldValue::Address(self.secondary),
            ProfileField::ListenPort => FieldValue::Port(self.listen_port),
            ProfileField::StatusPort => FieldValue::Port(self.status_port),
        }
    }

    /// Store a value into a field; the value kind must match the field codec
    pub fn set(&mut self, field: ProfileField, value: FieldValue) -> Result<(), BoardError> {
        match (field, value) {
            (ProfileField::Ip, FieldValue::Address(a)) => self.ip = a,
            (ProfileField::SubnetMask, FieldValue::Address(a)) => self.subnet_mask = a,
            (ProfileField::Gateway, FieldValue::Address(a)) => self.gateway = a,
            (ProfileField::Secondary, FieldValue::Address(a)) => self.secondary = a,
            (ProfileField::ListenPort, FieldValue::Port(p)) => self.listen_port = p,
            (ProfileField::StatusPort, FieldValue::Port(p)) => self.status_port = p,
            _ => return Err(BoardError::InvalidIpFormat),
        }
        Ok(())
    }

    /// Encode into a block laid out per the profile field table
    pub fn encode(&self, variant: Variant, block: &mut [u8]) -> Result<(), BoardError> {
        for spec in PROFILE_FIELDS.iter().filter(|s| s.field.present_in(variant)) {
            let dst = block
                .get_mut(spec.offset..spec.offset + spec.length)
                .ok_or(BoardError::StoreBounds)?;
            match (spec.codec, self.get(spec.field)) {
                (Codec::Ipv4, FieldValue::Address(a)) => dst.copy_from_slice(&a.octets()),
                (Codec::U16Le, FieldValue::Port(p)) => dst.copy_from_slice(&p.to_le_bytes()),
                _ => return Err(BoardError::StoreBounds),
            }
        }
        Ok(())
    }

    /// Decode a block laid out per the profile field table
    pub fn decode(variant: Variant, block: &[u8]) -> Result<Self, BoardError> {
        let mut profile = IpProfile::default();
        for spec in PROFILE_FIELDS.iter().filter(|s| s.field.present_in(variant)) {
            let src = block
                .get(spec.offset..spec.offset + spec.length)
                .ok_or(BoardError::StoreBounds)?;
            let value = match spec.codec {
                Codec::Ipv4 => FieldValue::Address(Ipv4Addr::new(src[0], src[1], src[2], src[3])),
                Codec::U16Le => FieldValue::Port(u16::from_le_bytes([src[0], src[1]])),
                Codec::Bytes | Codec::Bitmask => return Err(BoardError::StoreBounds),
            };
            profile.set(spec.field, value)?;
        }
        Ok(profile)
    }
}

/// The profile in effect for this run, plus the device identity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveConfiguration {
    pub index: ProfileIndex,
    pub mac: MacAddress,
    pub invert: InvertMask,
    pub profile: IpProfile,
}

/// Read the MAC, invert mask and the selected profile from the store
pub fn load_active_configuration<S: Storage>(
    store: &mut ConfigStore<S>,
    index: u8,
) -> Result<ActiveConfiguration, BoardError> {
    let index = ProfileIndex::new(index)?;
    let mac = store.read_mac()?;
    let invert = store.read_invert()?;
    let profile = store.read_profile(index.get())?;

    info!(
        "[PROFILE] Loaded set {}: ip={} mask={} gw={} port={}",
        index.get(),
        profile.ip,
        profile.subnet_mask,
        profile.gateway,
        profile.listen_port
    );

    Ok(ActiveConfiguration {
        index,
        mac,
        invert,
        profile,
    })
}

/// Reads the two profile select inputs
pub struct ProfileSelector<A, B> {
    bit0: A,
    bit1: B,
}

impl<A: InputPin, B: InputPin> ProfileSelector<A, B> {
    pub fn new(bit0: A, bit1: B) -> Self {
        Self { bit0, bit1 }
    }

    /// Sample both inputs; the second pin is the most significant bit
    pub fn select_index(&mut self) -> Result<ProfileIndex, BoardError> {
        let low = self.bit0.is_high().map_err(|_| BoardError::Pin)?;
        let high = self.bit1.is_high().map_err(|_| BoardError::Pin)?;
        ProfileIndex::new((u8::from(high) << 1) | u8::from(low))
    }

    pub fn release(self) -> (A, B) {
        (self.bit0, self.bit1)
    }
}

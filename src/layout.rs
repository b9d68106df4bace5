//! Persistent store layout
//!
//! The byte layout of the configuration EEPROM is described once here and
//! used by both the read and write paths. Offsets are a fixed contract with
//! devices already in the field:
//!
//! | region      | offset | length            |
//! |-------------|--------|-------------------|
//! | MAC         | 0x00   | 6                 |
//! | invert mask | 0x10   | 1                 |
//! | IP set 0..3 | 0x20 + 0x20 * n | 18 (HTTP GET) / 20 (OSC) |

use crate::{BoardError, Variant, config};

pub const MAC_ADDRESS_START: usize = 0x00;
pub const MAC_ADDRESS_LENGTH: usize = 6;

pub const OUTPUT_INVERT_START: usize = 0x10;
pub const OUTPUT_INVERT_LENGTH: usize = 1;

pub const IP_SET_BASE: usize = 0x20;
pub const IP_SET_STRIDE: usize = 0x20;

/// Largest profile block of any variant
pub const IP_SET_MAX_LENGTH: usize = 20;

/// How a field's bytes are interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    /// Raw bytes, copied as-is
    Bytes,
    /// IPv4 address in network order
    Ipv4,
    /// 16-bit unsigned integer, little-endian (AVR byte order)
    U16Le,
    /// One flag bit per logical output
    Bitmask,
}

/// Names of the fields inside one IP profile block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileField {
    Ip,
    SubnetMask,
    Gateway,
    /// DNS server in the HTTP GET variant, status report target in OSC
    Secondary,
    ListenPort,
    StatusPort,
}

/// One entry of the layout schema
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec<F> {
    pub field: F,
    pub name: &'static str,
    pub offset: usize,
    pub length: usize,
    pub codec: Codec,
}

/// Top level regions of the store
pub const MAC_FIELD: FieldSpec<()> = FieldSpec {
    field: (),
    name: "mac",
    offset: MAC_ADDRESS_START,
    length: MAC_ADDRESS_LENGTH,
    codec: Codec::Bytes,
};

pub const INVERT_FIELD: FieldSpec<()> = FieldSpec {
    field: (),
    name: "invert",
    offset: OUTPUT_INVERT_START,
    length: OUTPUT_INVERT_LENGTH,
    codec: Codec::Bitmask,
};

/// Field layout inside an IP profile block; offsets are relative to the block
pub const PROFILE_FIELDS: [FieldSpec<ProfileField>; 6] = [
    FieldSpec { field: ProfileField::Ip, name: "ip", offset: 0, length: 4, codec: Codec::Ipv4 },
    FieldSpec { field: ProfileField::SubnetMask, name: "mask", offset: 4, length: 4, codec: Codec::Ipv4 },
    FieldSpec { field: ProfileField::Gateway, name: "gw", offset: 8, length: 4, codec: Codec::Ipv4 },
    FieldSpec { field: ProfileField::Secondary, name: "secondary", offset: 12, length: 4, codec: Codec::Ipv4 },
    FieldSpec { field: ProfileField::ListenPort, name: "port", offset: 16, length: 2, codec: Codec::U16Le },
    FieldSpec { field: ProfileField::StatusPort, name: "statport", offset: 18, length: 2, codec: Codec::U16Le },
];

impl ProfileField {
    /// Whether this field is stored for the given variant
    pub fn present_in(self, variant: Variant) -> bool {
        !(self == ProfileField::StatusPort && variant == Variant::HttpGet)
    }

    /// Layout entry for this field
    pub fn spec(self) -> &'static FieldSpec<ProfileField> {
        // PROFILE_FIELDS is indexed in declaration order
        &PROFILE_FIELDS[self as usize]
    }

    /// Console name of the secondary address for the variant
    pub fn display_name(self, variant: Variant) -> &'static str {
        match (self, variant) {
            (ProfileField::Secondary, Variant::HttpGet) => "dns",
            (ProfileField::Secondary, Variant::Osc) => "target",
            _ => self.spec().name,
        }
    }

    /// Parse a console field name
    pub fn from_name(name: &str, variant: Variant) -> Result<Self, BoardError> {
        let field = if name.eq_ignore_ascii_case("ip") || name.eq_ignore_ascii_case("addr") {
            ProfileField::Ip
        } else if name.eq_ignore_ascii_case("mask") || name.eq_ignore_ascii_case("subnet") {
            ProfileField::SubnetMask
        } else if name.eq_ignore_ascii_case("gw")
            || name.eq_ignore_ascii_case("gateway")
            || name.eq_ignore_ascii_case("router")
        {
            ProfileField::Gateway
        } else if name.eq_ignore_ascii_case("dns")
            || name.eq_ignore_ascii_case("target")
            || name.eq_ignore_ascii_case("secondary")
        {
            ProfileField::Secondary
        } else if name.eq_ignore_ascii_case("port") || name.eq_ignore_ascii_case("listen") {
            ProfileField::ListenPort
        } else if name.eq_ignore_ascii_case("statport") || name.eq_ignore_ascii_case("status") {
            ProfileField::StatusPort
        } else {
            return Err(BoardError::UnknownField);
        };

        if field.present_in(variant) {
            Ok(field)
        } else {
            Err(BoardError::UnknownField)
        }
    }
}

/// Length in bytes of one profile block for the variant
pub const fn profile_block_length(variant: Variant) -> usize {
    match variant {
        Variant::HttpGet => 18,
        Variant::Osc => 20,
    }
}

/// Addressable regions of the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Mac,
    Invert,
    Profile(u8),
}

impl Region {
    /// Absolute start offset of the region.
    ///
    /// Fails with `BadProfileIndex` for profiles outside 0..3.
    pub fn base(self) -> Result<usize, BoardError> {
        match self {
            Region::Mac => Ok(MAC_FIELD.offset),
            Region::Invert => Ok(INVERT_FIELD.offset),
            Region::Profile(index) if usize::from(index) < config::IP_SETS => {
                Ok(IP_SET_BASE + usize::from(index) * IP_SET_STRIDE)
            }
            Region::Profile(_) => Err(BoardError::BadProfileIndex),
        }
    }

    /// Length of the region in bytes
    pub fn length(self, variant: Variant) -> usize {
        match self {
            Region::Mac => MAC_FIELD.length,
            Region::Invert => INVERT_FIELD.length,
            Region::Profile(_) => profile_block_length(variant),
        }
    }

    /// Resolve `offset..offset + len` inside the region into an absolute range
    pub fn span(self, variant: Variant, offset: usize, len: usize) -> Result<(usize, usize), BoardError> {
        let base = self.base()?;
        let end = offset.checked_add(len).ok_or(BoardError::StoreBounds)?;
        if end > self.length(variant) {
            return Err(BoardError::StoreBounds);
        }
        Ok((base + offset, base + end))
    }
}

/// Smallest backing store able to hold every region
pub const fn required_capacity(variant: Variant) -> usize {
    IP_SET_BASE + (config::IP_SETS - 1) * IP_SET_STRIDE + profile_block_length(variant)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_bases_match_fixed_offsets() {
        let bases: [usize; 4] = core::array::from_fn(|i| Region::Profile(i as u8).base().unwrap());
        assert_eq!(bases, [0x20, 0x40, 0x60, 0x80]);
        assert_eq!(Region::Mac.base(), Ok(0x00));
        assert_eq!(Region::Invert.base(), Ok(0x10));
        assert_eq!(Region::Profile(4).base(), Err(BoardError::BadProfileIndex));
    }

    #[test]
    fn fields_fit_inside_their_block() {
        for spec in PROFILE_FIELDS {
            if spec.field.present_in(Variant::HttpGet) {
                assert!(spec.offset + spec.length <= profile_block_length(Variant::HttpGet));
            }
            assert!(spec.offset + spec.length <= profile_block_length(Variant::Osc));
            assert_eq!(spec.field.spec().name, spec.name);
        }
        assert!(profile_block_length(Variant::Osc) <= IP_SET_STRIDE);
        assert!(IP_SET_MAX_LENGTH >= profile_block_length(Variant::Osc));
    }

    #[test]
    fn spans_are_bounds_checked() {
        assert_eq!(Region::Mac.span(Variant::Osc, 0, 6), Ok((0, 6)));
        assert_eq!(Region::Mac.span(Variant::Osc, 1, 6), Err(BoardError::StoreBounds));
        assert_eq!(Region::Profile(3).span(Variant::Osc, 18, 2), Ok((0x92, 0x94)));
        assert_eq!(
            Region::Profile(3).span(Variant::HttpGet, 18, 2),
            Err(BoardError::StoreBounds)
        );
        assert_eq!(Region::Invert.span(Variant::Osc, usize::MAX, 2), Err(BoardError::StoreBounds));
    }

    #[test]
    fn status_port_is_osc_only() {
        assert_eq!(
            ProfileField::from_name("STATPORT", Variant::HttpGet),
            Err(BoardError::UnknownField)
        );
        assert_eq!(
            ProfileField::from_name("statport", Variant::Osc),
            Ok(ProfileField::StatusPort)
        );
        assert_eq!(ProfileField::from_name("Router", Variant::Osc), Ok(ProfileField::Gateway));
        assert_eq!(ProfileField::from_name("dhcp", Variant::Osc), Err(BoardError::UnknownField));
        assert_eq!(required_capacity(Variant::Osc), 0x94);
    }
}

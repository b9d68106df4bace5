//! Configuration store
//!
//! Typed access to the MAC, invert mask and IP profile regions of a
//! byte-addressable non-volatile store. Every access is bounds-checked against
//! the layout before the storage driver is touched.

use embedded_storage::{ReadStorage, Storage};
use log::{debug, warn};

use crate::layout::{self, IP_SET_MAX_LENGTH, Region};
use crate::profile::{InvertMask, IpProfile, MacAddress};
use crate::{BoardError, Variant, config};

/// Configuration store over any `embedded-storage` backend
pub struct ConfigStore<S> {
    storage: S,
    variant: Variant,
}

impl<S: Storage> ConfigStore<S> {
    /// Wrap a storage backend; fails if it cannot hold the whole layout
    pub fn new(storage: S, variant: Variant) -> Result<Self, BoardError> {
        if storage.capacity() < layout::required_capacity(variant) {
            warn!(
                "[STORE] Backing store too small: {} bytes, need {}",
                storage.capacity(),
                layout::required_capacity(variant)
            );
            return Err(BoardError::StoreBounds);
        }
        Ok(Self { storage, variant })
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    pub fn into_inner(self) -> S {
        self.storage
    }

    fn resolve(&self, region: Region, offset: usize, len: usize) -> Result<u32, BoardError> {
        let (start, end) = region.span(self.variant, offset, len)?;
        if end > self.storage.capacity() {
            return Err(BoardError::StoreBounds);
        }
        u32::try_from(start).map_err(|_| BoardError::StoreBounds)
    }

    /// Read `buf.len()` bytes starting `offset` bytes into `region`
    pub fn read_bytes(&mut self, region: Region, offset: usize, buf: &mut [u8]) -> Result<(), BoardError> {
        let at = self.resolve(region, offset, buf.len())?;
        self.storage.read(at, buf).map_err(|_| BoardError::Storage)
    }

    /// Write `bytes` starting `offset` bytes into `region`
    pub fn write_bytes(&mut self, region: Region, offset: usize, bytes: &[u8]) -> Result<(), BoardError> {
        let at = self.resolve(region, offset, bytes.len())?;
        debug!("[STORE] Writing {} bytes at 0x{:02x} ({:?})", bytes.len(), at, region);
        self.storage.write(at, bytes).map_err(|_| BoardError::Storage)
    }

    pub fn read_mac(&mut self) -> Result<MacAddress, BoardError> {
        let mut mac = [0u8; layout::MAC_ADDRESS_LENGTH];
        self.read_bytes(Region::Mac, 0, &mut mac)?;
        Ok(MacAddress(mac))
    }

    pub fn write_mac(&mut self, mac: MacAddress) -> Result<(), BoardError> {
        self.write_bytes(Region::Mac, 0, &mac.0)
    }

    pub fn read_invert(&mut self) -> Result<InvertMask, BoardError> {
        let mut mask = [0u8; layout::OUTPUT_INVERT_LENGTH];
        self.read_bytes(Region::Invert, 0, &mut mask)?;
        Ok(InvertMask(mask[0]))
    }

    pub fn write_invert(&mut self, mask: InvertMask) -> Result<(), BoardError> {
        self.write_bytes(Region::Invert, 0, &[mask.0])
    }

    /// Read one whole IP profile block
    pub fn read_profile(&mut self, index: u8) -> Result<IpProfile, BoardError> {
        let len = Region::Profile(index).length(self.variant);
        let mut block = [0u8; IP_SET_MAX_LENGTH];
        self.read_bytes(Region::Profile(index), 0, &mut block[..len])?;
        IpProfile::decode(self.variant, &block[..len])
    }

    /// Replace one whole IP profile block in a single write
    pub fn write_profile(&mut self, index: u8, profile: &IpProfile) -> Result<(), BoardError> {
        // validate the index before encoding so a bad set never reaches storage
        Region::Profile(index).base()?;
        let len = Region::Profile(index).length(self.variant);
        let mut block = [0u8; IP_SET_MAX_LENGTH];
        profile.encode(self.variant, &mut block[..len])?;
        self.write_bytes(Region::Profile(index), 0, &block[..len])
    }
}

/// Error of the RAM store; only produced when a failure is injected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RamEepromError;

/// RAM-backed EEPROM image, erased to 0xFF like a fresh AVR EEPROM
pub struct RamEeprom {
    data: [u8; config::EEPROM_SIZE],
    accesses: usize,
    fail_writes: bool,
}

impl RamEeprom {
    pub fn new() -> Self {
        Self {
            data: [0xFF; config::EEPROM_SIZE],
            accesses: 0,
            fail_writes: false,
        }
    }

    /// Start from an existing image
    pub fn with_image(data: [u8; config::EEPROM_SIZE]) -> Self {
        Self {
            data,
            ..Self::new()
        }
    }

    /// Copy of the whole image
    pub fn snapshot(&self) -> [u8; config::EEPROM_SIZE] {
        self.data
    }

    /// Number of read and write calls seen
    pub fn access_count(&self) -> usize {
        self.accesses
    }

    /// Make every following write fail
    pub fn fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    fn range(&self, offset: u32, len: usize) -> Result<core::ops::Range<usize>, RamEepromError> {
        let start = usize::try_from(offset).map_err(|_| RamEepromError)?;
        let end = start.checked_add(len).ok_or(RamEepromError)?;
        if end > self.data.len() {
            return Err(RamEepromError);
        }
        Ok(start..end)
    }
}

impl Default for RamEeprom {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadStorage for RamEeprom {
    type Error = RamEepromError;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        self.accesses += 1;
        let range = self.range(offset, bytes.len())?;
        bytes.copy_from_slice(&self.data[range]);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.data.len()
    }
}

impl Storage for RamEeprom {
    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        self.accesses += 1;
        if self.fail_writes {
            return Err(RamEepromError);
        }
        let range = self.range(offset, bytes.len())?;
        self.data[range].copy_from_slice(bytes);
        Ok(())
    }
}

//! Emulated EEPROM on the ESP32-C3 SPI flash
//!
//! Exposes a fixed window of the flash as a small byte-addressable store so
//! [`ConfigStore`](crate::store::ConfigStore) sees the same offsets it would
//! on a real EEPROM. Writes go through `esp-storage`, which performs the
//! sector read-modify-write.

use embedded_storage::{ReadStorage, Storage};
use esp_storage::{FlashStorage, FlashStorageError};
use log::{debug, warn};

use crate::config;

#[derive(Debug)]
pub enum FlashEepromError {
    /// Access outside the EEPROM window
    OutOfBounds,
    Flash(FlashStorageError),
}

impl From<FlashStorageError> for FlashEepromError {
    fn from(e: FlashStorageError) -> Self {
        FlashEepromError::Flash(e)
    }
}

/// Flash window of [`config::EEPROM_SIZE`] bytes at [`config::EEPROM_FLASH_OFFSET`]
pub struct FlashEeprom {
    flash: FlashStorage,
    base: u32,
}

impl FlashEeprom {
    pub fn new() -> Self {
        debug!(
            "[STORE] Flash EEPROM at 0x{:05x}, {} bytes",
            config::EEPROM_FLASH_OFFSET,
            config::EEPROM_SIZE
        );
        Self {
            flash: FlashStorage::new(),
            base: config::EEPROM_FLASH_OFFSET,
        }
    }

    fn locate(&self, offset: u32, len: usize) -> Result<u32, FlashEepromError> {
        let end = usize::try_from(offset)
            .ok()
            .and_then(|start| start.checked_add(len))
            .ok_or(FlashEepromError::OutOfBounds)?;
        if end > config::EEPROM_SIZE {
            warn!("[STORE] Flash access 0x{:02x}+{} outside window", offset, len);
            return Err(FlashEepromError::OutOfBounds);
        }
        Ok(self.base + offset)
    }
}

impl Default for FlashEeprom {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadStorage for FlashEeprom {
    type Error = FlashEepromError;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        let at = self.locate(offset, bytes.len())?;
        self.flash.read(at, bytes)?;
        Ok(())
    }

    fn capacity(&self) -> usize {
        config::EEPROM_SIZE
    }
}

impl Storage for FlashEeprom {
    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        let at = self.locate(offset, bytes.len())?;
        self.flash.write(at, bytes)?;
        Ok(())
    }
}

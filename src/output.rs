//! Output mapping and relay drive
//!
//! Remote clients address outputs by logical number. A fixed table built once
//! from the hardware description turns that into a GPIO number, and the invert
//! mask turns the requested logical level into the level driven on the pin.

use embedded_hal::digital::StatefulOutputPin;
use heapless::Vec;
use log::{debug, warn};

use crate::BoardError;
use crate::profile::InvertMask;

/// Outputs supported by the one-byte invert mask
pub const MAX_OUTPUTS: usize = 8;

/// Declared wiring of the relay outputs
#[derive(Debug, Clone, Copy)]
pub struct HardwareDescription {
    /// Logical number of the first output
    pub first_logical: u8,
    /// GPIO number per output, in logical order
    pub physical_pins: &'static [u8],
}

/// Immutable logical to physical lookup table
#[derive(Debug, Clone)]
pub struct OutputMap {
    first: u8,
    pins: Vec<u8, MAX_OUTPUTS>,
}

impl OutputMap {
    pub fn new(hardware: &HardwareDescription) -> Result<Self, BoardError> {
        if hardware.physical_pins.is_empty() {
            return Err(BoardError::BadLogicalIndex);
        }
        let last = usize::from(hardware.first_logical) + hardware.physical_pins.len() - 1;
        if last > usize::from(u8::MAX) {
            return Err(BoardError::BadLogicalIndex);
        }
        let pins = Vec::from_slice(hardware.physical_pins).map_err(|_| BoardError::BadLogicalIndex)?;
        Ok(Self {
            first: hardware.first_logical,
            pins,
        })
    }

    /// Number of logical outputs
    pub fn count(&self) -> usize {
        self.pins.len()
    }

    pub fn first_logical(&self) -> u8 {
        self.first
    }

    /// Every logical output number, in order
    pub fn logicals(&self) -> impl Iterator<Item = u8> + '_ {
        (0..self.pins.len()).map(move |i| self.first + i as u8)
    }

    /// Position of the output in the table and the invert mask
    pub fn bit(&self, logical: u8) -> Result<u8, BoardError> {
        logical
            .checked_sub(self.first)
            .filter(|bit| usize::from(*bit) < self.pins.len())
            .ok_or(BoardError::BadLogicalIndex)
    }

    pub fn logical_to_physical(&self, logical: u8) -> Result<u8, BoardError> {
        let bit = self.bit(logical)?;
        Ok(self.pins[usize::from(bit)])
    }

    /// Level to drive on the pin for a requested logical level
    pub fn apply_invert(&self, mask: InvertMask, logical: u8, level: bool) -> Result<bool, BoardError> {
        let bit = self.bit(logical)?;
        Ok(level ^ mask.is_inverted(bit))
    }
}

/// A set of GPIO outputs addressed by physical pin number
pub trait PinBank {
    fn set_level(&mut self, physical: u8, high: bool) -> Result<(), BoardError>;
    fn level(&mut self, physical: u8) -> Result<bool, BoardError>;
}

/// `PinBank` over `embedded-hal` output pins
pub struct GpioBank<P> {
    pins: Vec<(u8, P), MAX_OUTPUTS>,
}

impl<P: StatefulOutputPin> GpioBank<P> {
    pub fn new() -> Self {
        Self { pins: Vec::new() }
    }

    /// Register the pin wired to GPIO `physical`
    pub fn add(&mut self, physical: u8, pin: P) -> Result<(), BoardError> {
        self.pins.push((physical, pin)).map_err(|_| BoardError::BufferFull)
    }

    fn pin(&mut self, physical: u8) -> Result<&mut P, BoardError> {
        self.pins
            .iter_mut()
            .find(|(number, _)| *number == physical)
            .map(|(_, pin)| pin)
            .ok_or(BoardError::Pin)
    }
}

impl<P: StatefulOutputPin> Default for GpioBank<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: StatefulOutputPin> PinBank for GpioBank<P> {
    fn set_level(&mut self, physical: u8, high: bool) -> Result<(), BoardError> {
        let pin = self.pin(physical)?;
        let result = if high { pin.set_high() } else { pin.set_low() };
        result.map_err(|_| BoardError::Pin)
    }

    fn level(&mut self, physical: u8) -> Result<bool, BoardError> {
        self.pin(physical)?.is_set_high().map_err(|_| BoardError::Pin)
    }
}

/// Logical outputs: mapping, polarity and the pins behind them
pub struct Outputs<B> {
    map: OutputMap,
    invert: InvertMask,
    bank: B,
}

impl<B: PinBank> Outputs<B> {
    pub fn new(map: OutputMap, invert: InvertMask, bank: B) -> Self {
        Self { map, invert, bank }
    }

    pub fn map(&self) -> &OutputMap {
        &self.map
    }

    pub fn invert(&self) -> InvertMask {
        self.invert
    }

    pub fn bank(&self) -> &B {
        &self.bank
    }

    /// Drive a logical output to the requested logical level
    pub fn set_logical(&mut self, logical: u8, level: bool) -> Result<(), BoardError> {
        let physical = self.map.logical_to_physical(logical)?;
        let actual = self.map.apply_invert(self.invert, logical, level)?;
        debug!("[OUT] logical {} -> pin {} level {}", logical, physical, actual);
        self.bank.set_level(physical, actual)
    }

    /// Logical level currently presented to clients (pin level with invert undone)
    pub fn logical_state(&mut self, logical: u8) -> Result<bool, BoardError> {
        let physical = self.map.logical_to_physical(logical)?;
        let actual = self.bank.level(physical)?;
        self.map.apply_invert(self.invert, logical, actual)
    }

    /// `(logical, level)` for every output
    pub fn states(&mut self) -> Result<Vec<(u8, bool), MAX_OUTPUTS>, BoardError> {
        let mut states = Vec::new();
        for i in 0..self.map.count() {
            let logical = self.map.first_logical() + i as u8;
            let level = self.logical_state(logical)?;
            states.push((logical, level)).map_err(|_| BoardError::BufferFull)?;
        }
        Ok(states)
    }

    /// Drive every output to logical off
    pub fn reset_all(&mut self) -> Result<(), BoardError> {
        for i in 0..self.map.count() {
            let logical = self.map.first_logical() + i as u8;
            self.set_logical(logical, false)?;
        }
        Ok(())
    }

    /// Swap the invert mask, keeping every output at its current logical level
    pub fn set_invert(&mut self, invert: InvertMask) -> Result<(), BoardError> {
        if invert == self.invert {
            return Ok(());
        }
        let states = self.states()?;
        self.invert = invert;
        for (logical, level) in states {
            if let Err(e) = self.set_logical(logical, level) {
                warn!("[OUT] Failed to re-drive output {}: {:?}", logical, e);
                return Err(e);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use core::convert::Infallible;
    use embedded_hal::digital::{ErrorType, OutputPin};

    pub const EIGHT: HardwareDescription = HardwareDescription {
        first_logical: 1,
        physical_pins: &[2, 3, 5, 6, 7, 8, 9, 4],
    };

    /// Records every pin write, indexed by physical pin number
    #[derive(Default)]
    pub struct RecordingBank {
        pub levels: [bool; 32],
        pub writes: std::vec::Vec<(u8, bool)>,
    }

    impl PinBank for RecordingBank {
        fn set_level(&mut self, physical: u8, high: bool) -> Result<(), BoardError> {
            let slot = self.levels.get_mut(usize::from(physical)).ok_or(BoardError::Pin)?;
            *slot = high;
            self.writes.push((physical, high));
            Ok(())
        }

        fn level(&mut self, physical: u8) -> Result<bool, BoardError> {
            self.levels.get(usize::from(physical)).copied().ok_or(BoardError::Pin)
        }
    }

    pub fn outputs(invert: InvertMask) -> Outputs<RecordingBank> {
        Outputs::new(OutputMap::new(&EIGHT).unwrap(), invert, RecordingBank::default())
    }

    #[test]
    fn logical_to_physical_enforces_both_bounds() {
        let map = OutputMap::new(&EIGHT).unwrap();
        assert_eq!(map.logical_to_physical(1), Ok(2));
        assert_eq!(map.logical_to_physical(8), Ok(4));
        assert_eq!(map.logical_to_physical(0), Err(BoardError::BadLogicalIndex));
        assert_eq!(map.logical_to_physical(9), Err(BoardError::BadLogicalIndex));
        assert_eq!(map.logical_to_physical(255), Err(BoardError::BadLogicalIndex));
        assert_eq!(map.logicals().collect::<std::vec::Vec<_>>(), [1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn invert_flips_and_double_invert_is_identity() {
        let map = OutputMap::new(&EIGHT).unwrap();
        for mask in [0x00u8, 0xFF, 0xA5, 0x01] {
            let mask = InvertMask(mask);
            for logical in map.logicals() {
                let bit = map.bit(logical).unwrap();
                for level in [false, true] {
                    let once = map.apply_invert(mask, logical, level).unwrap();
                    assert_eq!(once, level ^ mask.is_inverted(bit));
                    assert_eq!(map.apply_invert(mask, logical, once), Ok(level));
                }
            }
        }
        assert_eq!(
            map.apply_invert(InvertMask(0), 9, true),
            Err(BoardError::BadLogicalIndex)
        );
    }

    #[test]
    fn oversized_description_is_rejected() {
        let nine = HardwareDescription {
            first_logical: 0,
            physical_pins: &[1, 2, 3, 4, 5, 6, 7, 8, 9],
        };
        assert!(OutputMap::new(&nine).is_err());
        let empty = HardwareDescription {
            first_logical: 0,
            physical_pins: &[],
        };
        assert!(OutputMap::new(&empty).is_err());
    }

    #[test]
    fn inverted_output_drives_complement_and_reads_back_logical() {
        let mut out = outputs(InvertMask(0b0000_0010));
        out.set_logical(2, true).unwrap();
        out.set_logical(1, true).unwrap();
        assert_eq!(out.bank().levels[3], false);
        assert_eq!(out.bank().levels[2], true);
        assert_eq!(out.logical_state(2), Ok(true));
        assert_eq!(out.logical_state(1), Ok(true));
        assert_eq!(out.set_logical(0, true), Err(BoardError::BadLogicalIndex));
    }

    #[test]
    fn reset_all_and_invert_swap_preserve_logical_view() {
        let mut out = outputs(InvertMask(0x0F));
        out.reset_all().unwrap();
        assert!(out.states().unwrap().iter().all(|(_, level)| !level));
        assert_eq!(out.bank().levels[2], true);

        out.set_logical(8, true).unwrap();
        out.set_invert(InvertMask(0x80)).unwrap();
        assert_eq!(out.logical_state(8), Ok(true));
        assert_eq!(out.bank().levels[4], false);
        assert_eq!(out.logical_state(1), Ok(false));
        assert_eq!(out.bank().levels[2], false);
    }

    struct FakePin(bool);

    impl ErrorType for FakePin {
        type Error = Infallible;
    }

    impl OutputPin for FakePin {
        fn set_low(&mut self) -> Result<(), Infallible> {
            self.0 = false;
            Ok(())
        }
        fn set_high(&mut self) -> Result<(), Infallible> {
            self.0 = true;
            Ok(())
        }
    }

    impl StatefulOutputPin for FakePin {
        fn is_set_high(&mut self) -> Result<bool, Infallible> {
            Ok(self.0)
        }
        fn is_set_low(&mut self) -> Result<bool, Infallible> {
            Ok(!self.0)
        }
    }

    #[test]
    fn gpio_bank_routes_by_physical_number() {
        let mut bank = GpioBank::new();
        bank.add(3, FakePin(false)).unwrap();
        bank.add(18, FakePin(true)).unwrap();
        bank.set_level(3, true).unwrap();
        assert_eq!(bank.level(3), Ok(true));
        assert_eq!(bank.level(18), Ok(true));
        assert_eq!(bank.set_level(4, true), Err(BoardError::Pin));
    }
}

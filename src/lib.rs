#![cfg_attr(not(test), no_std)]

//! Network GPO Controller Board Library
//!
//! This library holds the relay controller logic: the persistent configuration
//! store, profile selection, logical-to-physical output mapping, the serial
//! configuration console and the network command protocol. Hardware drivers are
//! reached through `embedded-hal` and `embedded-storage` traits so the core runs
//! the same on the board and in host tests.

use core::fmt;

pub mod command;
pub mod layout;
pub mod osc;
pub mod output;
pub mod profile;
pub mod serial_config;
pub mod state_machine;
pub mod store;
pub mod text;

#[cfg(feature = "firmware")]
pub mod ethernet;
#[cfg(feature = "firmware")]
pub mod flash;
#[cfg(feature = "firmware")]
pub mod http_server;
#[cfg(feature = "firmware")]
pub mod udp_server;

/// Project version information
pub const VERSION: &str = "0.1.0-dev";

/// Application name reported by the console and status packets
pub const APP_NAME: &str = "GPO Controller";

/// Default configuration constants
pub mod config {
    /// Number of selectable IP profiles held in the store
    pub const IP_SETS: usize = 4;

    /// First logical output number exposed to remote clients
    pub const FIRST_LOGICAL_OUTPUT: u8 = 1;

    /// GPIO numbers driving the relays, in logical output order.
    ///
    /// GPIO18 and GPIO19 are the USB-Serial-JTAG D-/D+ pads on the ESP32-C3.
    /// Claiming them as GPIO disconnects the USB console, so logs and the
    /// configuration console must be read on UART0 (GPIO20/21) or the board
    /// must be flashed over the UART bootloader. Every other free pad is taken
    /// by the select inputs, the W5500 bus or UART0.
    pub const OUTPUT_PINS: [u8; 4] = [3, 4, 5, 18];

    /// Profile select inputs (bit 0, bit 1)
    pub const PROFILE_SELECT_PINS: [u8; 2] = [0, 1];

    /// Status report enable input, on the USB D+ pad (see `OUTPUT_PINS`)
    pub const STATUS_ENABLE_PIN: u8 = 19;

    /// Serial console baud rate
    pub const SERIAL_BAUD: u32 = 115_200;

    /// Longest console line accepted, excluding the terminator
    pub const SERIAL_LINE_CAPACITY: usize = 64;

    /// Console output collected per dispatched line (fits a full PRINT)
    pub const SERIAL_REPLY_CAPACITY: usize = 2048;

    /// W5500 SPI clock
    pub const W5500_SPI_MHZ: u32 = 20;

    /// Largest inbound command packet
    pub const MAX_PACKET_SIZE: usize = 512;

    /// Largest outbound reply or status packet
    pub const MAX_REPLY_SIZE: usize = 256;

    /// Flash offset of the emulated EEPROM (start of the `nvs` partition)
    pub const EEPROM_FLASH_OFFSET: u32 = 0x9000;

    /// Size of the emulated EEPROM window
    pub const EEPROM_SIZE: usize = 0x100;

    /// HTTP path carrying switch requests in the HTTP GET variant
    pub const SWITCH_PATH: &str = "/gpiswitch/out";

    /// OSC address prefix for every message handled by the board
    pub const OSC_PREFIX: &str = "/gpo";

    /// OSC address of the outbound status report
    pub const OSC_STATUS_ADDRESS: &str = "/gpo/status";
}

/// Which network control surface the board serves. The variant also fixes
/// the profile block layout: only OSC profiles carry a status port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    /// Request-line control over TCP, `GET /gpiswitch/out?1=1`
    HttpGet,
    /// Token and OSC message control over UDP, with status reports
    Osc,
}

impl Variant {
    /// Variant selected at build time
    pub const fn build() -> Self {
        if cfg!(feature = "http-get") {
            Variant::HttpGet
        } else {
            Variant::Osc
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Variant::HttpGet => "HTTP GET",
            Variant::Osc => "OSC",
        }
    }
}

/// Error types for the GPO board
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardError {
    /// Profile index outside 0..3
    BadProfileIndex,
    /// Logical output outside the hardware's declared range
    BadLogicalIndex,
    /// MAC address text is not six hex pairs
    InvalidMacFormat,
    /// Invert token is not one of the accepted forms
    InvalidInvertFormat,
    /// Dotted quad or port value is malformed or out of range
    InvalidIpFormat,
    /// Region, offset or length outside the declared store layout
    StoreBounds,
    /// Console line starts with an unknown command token
    UnknownCommand,
    /// Profile field name not known for this variant
    UnknownField,
    /// Console line longer than the line buffer
    LineOverflow,
    /// Storage driver failed a read or write
    Storage,
    /// GPIO driver failed
    Pin,
    /// Packet parsing error
    ProtocolError,
    /// Encoded packet does not fit its buffer
    BufferFull,
    /// UDP server error
    UdpError,
    /// Network bring-up error
    NetworkError,
    /// On-chip peripheral rejected its configuration
    Peripheral,
}

impl fmt::Display for BoardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            BoardError::BadProfileIndex => "bad set, profile index must be 0..3",
            BoardError::BadLogicalIndex => "logical output out of range",
            BoardError::InvalidMacFormat => "invalid MAC, expected 6 hex pairs",
            BoardError::InvalidInvertFormat => "invalid invert setting",
            BoardError::InvalidIpFormat => "invalid address or port",
            BoardError::StoreBounds => "store access out of bounds",
            BoardError::UnknownCommand => "unknown command, try HELP",
            BoardError::UnknownField => "unknown profile field",
            BoardError::LineOverflow => "line too long",
            BoardError::Storage => "storage access failed",
            BoardError::Pin => "pin access failed",
            BoardError::ProtocolError => "malformed packet",
            BoardError::BufferFull => "buffer full",
            BoardError::UdpError => "udp error",
            BoardError::NetworkError => "network error",
            BoardError::Peripheral => "peripheral setup failed",
        };
        f.write_str(msg)
    }
}

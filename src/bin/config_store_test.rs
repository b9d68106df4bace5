//! Configuration store self test
//!
//! Runs on the board against the real flash window: writes every region,
//! reads it back through the typed store and puts the original image back.

#![no_std]
#![no_main]

use core::net::Ipv4Addr;

use embedded_storage::{ReadStorage, Storage};
use esp_hal::clock::CpuClock;
use esp_println::println;
use gpo_board::flash::FlashEeprom;
use gpo_board::output::{HardwareDescription, OutputMap};
use gpo_board::profile::{InvertMask, IpProfile, MacAddress, ProfileIndex, load_active_configuration};
use gpo_board::serial_config::{ConsoleEvent, SerialConsole};
use gpo_board::store::ConfigStore;
use gpo_board::{BoardError, Variant, config};

// Add app descriptor for espflash compatibility
esp_bootloader_esp_idf::esp_app_desc!();

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    println!("❌ {}", info);
    loop {}
}

struct Sink;

impl core::fmt::Write for Sink {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        esp_println::print!("{}", s);
        Ok(())
    }
}

#[esp_hal::main]
fn main() -> ! {
    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let _peripherals = esp_hal::init(config);

    println!("=== Configuration store test ===");

    let variant = Variant::Osc;
    let mut flash = FlashEeprom::new();
    let mut original = [0u8; config::EEPROM_SIZE];
    assert!(flash.read(0, &mut original).is_ok());
    println!("Saved {} bytes of the current image", original.len());

    let mut store = match ConfigStore::new(flash, variant) {
        Ok(store) => store,
        Err(e) => panic!("store refused the flash window: {}", e),
    };

    println!("\n1. MAC and invert regions");
    let mac = MacAddress([0x02, 0x47, 0x50, 0x4F, 0x00, 0x01]);
    assert_eq!(store.write_mac(mac), Ok(()));
    assert_eq!(store.write_invert(InvertMask(0x05)), Ok(()));
    assert_eq!(store.read_mac(), Ok(mac));
    assert_eq!(store.read_invert(), Ok(InvertMask(0x05)));
    println!("✅ MAC {} and invert mask read back", mac);

    println!("\n2. Profile blocks");
    for index in ProfileIndex::all() {
        let n = index.get();
        let profile = IpProfile {
            ip: Ipv4Addr::new(192, 168, n, 10),
            subnet_mask: Ipv4Addr::new(255, 255, 255, 0),
            gateway: Ipv4Addr::new(192, 168, n, 1),
            secondary: Ipv4Addr::UNSPECIFIED,
            listen_port: 8000 + u16::from(n),
            status_port: 9000 + u16::from(n),
        };
        assert_eq!(store.write_profile(n, &profile), Ok(()));
        assert_eq!(store.read_profile(n), Ok(profile));
        println!("✅ Set {} at 0x{:02x} read back", n, 0x20 + 0x20 * usize::from(n));
    }
    assert_eq!(store.read_profile(4), Err(BoardError::BadProfileIndex));
    println!("✅ Set 4 rejected");

    println!("\n3. Active configuration");
    let active = load_active_configuration(&mut store, 2);
    assert!(matches!(active, Ok(a) if a.profile.listen_port == 8002 && a.invert == InvertMask(0x05)));
    println!("✅ Set 2 loaded");

    println!("\n4. Console commit");
    let hardware = HardwareDescription {
        first_logical: config::FIRST_LOGICAL_OUTPUT,
        physical_pins: &config::OUTPUT_PINS,
    };
    let map = match OutputMap::new(&hardware) {
        Ok(map) => map,
        Err(e) => panic!("output table rejected: {}", e),
    };
    let mut console = SerialConsole::new(variant, map, ProfileIndex::new(2).ok());
    let mut sink = Sink;
    console.feed_all(b"IP 1 ip 10.20.30.40\n", &mut store, &mut sink);
    let event = console.feed_all(b"COMMIT\n", &mut store, &mut sink);
    assert_eq!(event, Some(ConsoleEvent::Done));
    assert!(matches!(store.read_profile(1), Ok(p) if p.ip == Ipv4Addr::new(10, 20, 30, 40)));
    println!("✅ Console edit reached flash");

    println!("\n5. Restore");
    let mut flash = store.into_inner();
    assert!(flash.write(0, &original).is_ok());
    let mut check = [0u8; config::EEPROM_SIZE];
    assert!(flash.read(0, &mut check).is_ok());
    assert_eq!(check, original);
    println!("✅ Original image restored");

    println!("\n=== All configuration store tests passed ===");
    loop {
        core::hint::spin_loop();
    }
}

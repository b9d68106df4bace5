//! W5500 ethernet bring-up
//!
//! Builds the `embassy-net` stack on a WIZnet W5500 over SPI, addressed from
//! the active profile. The board always runs with a static address; there is
//! no DHCP.

use core::net::Ipv4Addr;

use embassy_net::{Config, Ipv4Cidr, Stack, StackResources, StaticConfigV4};
use embassy_net_wiznet::chip::W5500;
use embassy_net_wiznet::{Device, Runner, State};
use embassy_time::Delay;
use embedded_hal_bus::spi::ExclusiveDevice;
use esp_hal::Async;
use esp_hal::gpio::{Input, Output};
use esp_hal::spi::master::Spi;
use heapless::Vec;
use log::{info, warn};
use static_cell::StaticCell;

use crate::profile::ActiveConfiguration;
use crate::{BoardError, Variant};

pub type W5500Spi = ExclusiveDevice<Spi<'static, Async>, Output<'static>, Delay>;
pub type EthernetRunner = Runner<'static, W5500, W5500Spi, Input<'static>, Output<'static>>;
pub type NetRunner = embassy_net::Runner<'static, Device<'static>>;

static WIZNET_STATE: StaticCell<State<8, 8>> = StaticCell::new();
static STACK_RESOURCES: StaticCell<StackResources<4>> = StaticCell::new();

/// Prefix length of a subnet mask; non-contiguous masks keep their leading ones
pub fn prefix_len(mask: Ipv4Addr) -> u8 {
    let bits = u32::from(mask);
    let prefix = bits.leading_ones();
    if bits.count_ones() != prefix {
        warn!("[NET] Subnet mask {} is not contiguous, using /{}", mask, prefix);
    }
    prefix as u8
}

/// Static IPv4 configuration for the active profile
pub fn static_config(active: &ActiveConfiguration, variant: Variant) -> StaticConfigV4 {
    let profile = &active.profile;
    let gateway = (!profile.gateway.is_unspecified()).then_some(profile.gateway);

    let mut dns_servers = Vec::new();
    // the secondary address is a DNS server only on the HTTP board
    if variant == Variant::HttpGet && !profile.secondary.is_unspecified() {
        let _ = dns_servers.push(profile.secondary);
    }

    StaticConfigV4 {
        address: Ipv4Cidr::new(profile.ip, prefix_len(profile.subnet_mask)),
        gateway,
        dns_servers,
    }
}

/// Reset and configure the W5500; runs once per boot
pub async fn start_w5500(
    active: &ActiveConfiguration,
    spi: W5500Spi,
    int: Input<'static>,
    reset: Output<'static>,
) -> Result<(Device<'static>, EthernetRunner), BoardError> {
    info!("[NET] Initialising W5500, MAC {}", active.mac);
    let state = WIZNET_STATE.init(State::<8, 8>::new());
    embassy_net_wiznet::new(active.mac.0, state, spi, int, reset)
        .await
        .map_err(|_| {
            warn!("[NET] W5500 did not respond");
            BoardError::NetworkError
        })
}

/// Create the network stack with the profile's static address
pub fn start_stack(
    device: Device<'static>,
    active: &ActiveConfiguration,
    variant: Variant,
) -> (Stack<'static>, NetRunner) {
    let config = static_config(active, variant);
    info!(
        "[NET] Static address {} gateway {:?}",
        config.address, config.gateway
    );
    // MAC bytes make the port randomisation seed differ between boards
    let seed = active
        .mac
        .0
        .iter()
        .fold(0x5eed_0000_0000_0000u64, |acc, b| acc.rotate_left(8) ^ u64::from(*b));
    embassy_net::new(
        device,
        Config::ipv4_static(config),
        STACK_RESOURCES.init(StackResources::new()),
        seed,
    )
}

/// Apply a reloaded profile to the running stack
pub fn reconfigure(stack: Stack<'static>, active: &ActiveConfiguration, variant: Variant) {
    let config = static_config(active, variant);
    info!("[NET] Re-addressing to {}", config.address);
    stack.set_config_v4(embassy_net::ConfigV4::Static(config));
}

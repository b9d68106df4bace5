#![no_std]
#![no_main]

use core::net::Ipv4Addr;

use embassy_executor::Spawner;
use embassy_futures::select::{Either, select};
use embassy_net::Stack;
use embassy_net::tcp::TcpSocket;
use embassy_time::{Delay, Duration, Timer};
use embedded_hal_bus::spi::ExclusiveDevice;
use esp_hal::Async;
use esp_hal::clock::CpuClock;
use esp_hal::gpio::{Input, InputConfig, Level, Output, OutputConfig, Pull};
use esp_hal::peripherals::Peripherals;
use esp_hal::spi::Mode;
use esp_hal::spi::master::{Config as SpiConfig, Spi};
use esp_hal::time::Rate;
use esp_hal::timer::timg::TimerGroup;
use esp_hal::uart::{Config as UartConfig, Uart, UartRx, UartTx};
use esp_hal_embassy::Executor;
use heapless::String;
use log::{debug, error, info, warn};
use static_cell::StaticCell;

use gpo_board::command::{CommandProcessor, PacketOutcome};
use gpo_board::ethernet::{self, EthernetRunner, NetRunner, W5500Spi};
use gpo_board::flash::FlashEeprom;
use gpo_board::output::{GpioBank, HardwareDescription, OutputMap, Outputs};
use gpo_board::profile::{ActiveConfiguration, ProfileSelector, load_active_configuration};
use gpo_board::serial_config::{ConsoleEvent, SerialConsole};
use gpo_board::store::ConfigStore;
use gpo_board::udp_server::{UdpBuffers, UdpServer};
use gpo_board::{APP_NAME, BoardError, VERSION, Variant, config, http_server};

// Add app descriptor for espflash compatibility
esp_bootloader_esp_idf::esp_app_desc!();

static EXECUTOR: StaticCell<Executor> = StaticCell::new();

const HARDWARE: HardwareDescription = HardwareDescription {
    first_logical: config::FIRST_LOGICAL_OUTPUT,
    physical_pins: &config::OUTPUT_PINS,
};

#[panic_handler]
fn panic(_: &core::panic::PanicInfo) -> ! {
    loop {}
}

type Relays = Outputs<GpioBank<Output<'static>>>;

/// W5500 wiring handed to the control task
struct W5500Pins {
    spi: W5500Spi,
    int: Input<'static>,
    reset: Output<'static>,
}

/// State owned by the control loop
struct Controller {
    variant: Variant,
    store: ConfigStore<FlashEeprom>,
    selector: ProfileSelector<Input<'static>, Input<'static>>,
    status_enable: Input<'static>,
    outputs: Relays,
    console: SerialConsole,
    processor: CommandProcessor,
    tx: UartTx<'static, Async>,
}

impl Controller {
    /// Feed received console bytes; true when a reload was requested
    async fn on_serial(&mut self, bytes: &[u8]) -> bool {
        let mut reply: String<{ config::SERIAL_REPLY_CAPACITY }> = String::new();
        let mut reload = false;
        for &byte in bytes {
            if self.console.feed(byte, &mut self.store, &mut reply) == Some(ConsoleEvent::ReloadRequested) {
                reload = true;
            }
            // one dispatched line fits the buffer, several may not
            if !reply.is_empty() {
                write_serial(&mut self.tx, reply.as_bytes()).await;
                reply.clear();
            }
        }
        reload
    }

    fn on_packet(&mut self, packet: &[u8], sender: (Ipv4Addr, u16)) -> PacketOutcome {
        self.processor.set_status_enabled(self.status_enable.is_high());
        self.processor.process(packet, sender, &mut self.outputs)
    }

    /// Re-sample the selector and rebuild the active configuration
    fn reload(&mut self) -> Result<ActiveConfiguration, BoardError> {
        let index = self.selector.select_index()?;
        let active = load_active_configuration(&mut self.store, index.get())?;
        if active.mac != self.processor.active().mac {
            warn!("[MAIN] New MAC {} takes effect after restart", active.mac);
        }
        self.outputs.set_invert(active.invert)?;
        self.console.set_active(Some(active.index));
        self.processor.set_active(active);
        Ok(active)
    }
}

async fn write_serial(tx: &mut UartTx<'static, Async>, mut bytes: &[u8]) {
    while !bytes.is_empty() {
        match tx.write_async(bytes).await {
            Ok(0) => break,
            Err(e) => {
                warn!("[SERIAL] Write failed: {:?}", e);
                break;
            }
            Ok(n) => bytes = &bytes[n..],
        }
    }
}

#[embassy_executor::task]
async fn ethernet_task(runner: EthernetRunner) -> ! {
    runner.run().await
}

#[embassy_executor::task]
async fn net_task(mut runner: NetRunner) -> ! {
    runner.run().await
}

/// Serve UDP commands and the console until a reload is requested
async fn serve_udp(
    ctl: &mut Controller,
    rx: &mut UartRx<'static, Async>,
    stack: Stack<'static>,
) -> Result<(), BoardError> {
    let mut buffers = UdpBuffers::new();
    let mut server = UdpServer::bind(stack, &mut buffers, ctl.processor.active().profile.listen_port)?;
    let mut packet = [0u8; config::MAX_PACKET_SIZE];
    let mut serial = [0u8; 32];

    loop {
        let event = select(server.receive(&mut packet), rx.read_async(&mut serial)).await;
        match event {
            Either::First(Ok((len, sender))) => {
                let outcome = ctl.on_packet(&packet[..len], sender);
                if let Some(reply) = outcome.reply {
                    if let Err(e) = server.send(&reply).await {
                        warn!("[CMD] Reply to {}:{} dropped: {}", reply.address, reply.port, e);
                    }
                }
            }
            Either::First(Err(e)) => debug!("[UDP] Receive failed: {}", e),
            Either::Second(Ok(n)) => {
                if ctl.on_serial(&serial[..n]).await {
                    return Ok(());
                }
            }
            Either::Second(Err(e)) => warn!("[SERIAL] Read error: {:?}", e),
        }
    }
}

/// Serve HTTP requests and the console until a reload is requested
async fn serve_http(
    ctl: &mut Controller,
    rx: &mut UartRx<'static, Async>,
    stack: Stack<'static>,
) -> Result<(), BoardError> {
    let port = ctl.processor.active().profile.listen_port;
    let mut rx_buffer = [0u8; 1024];
    let mut tx_buffer = [0u8; 1024];
    let mut request = [0u8; config::MAX_PACKET_SIZE];
    let mut serial = [0u8; 32];
    info!("[HTTP] Listening on port {}", port);

    loop {
        let mut socket = TcpSocket::new(stack, &mut rx_buffer, &mut tx_buffer);
        let event = select(socket.accept(port), rx.read_async(&mut serial)).await;
        match event {
            Either::First(Ok(())) => match http_server::read_request(&mut socket, &mut request).await {
                Ok((len, peer)) => match ctl.on_packet(&request[..len], peer).reply {
                    Some(reply) => {
                        if let Err(e) = http_server::respond(&mut socket, &reply.payload).await {
                            warn!("[HTTP] Response to {} incomplete: {}", peer.0, e);
                        }
                    }
                    None => socket.abort(),
                },
                Err(_) => socket.abort(),
            },
            Either::First(Err(e)) => {
                warn!("[HTTP] Accept failed: {:?}", e);
                Timer::after(Duration::from_millis(100)).await;
            }
            Either::Second(Ok(n)) => {
                if ctl.on_serial(&serial[..n]).await {
                    return Ok(());
                }
            }
            Either::Second(Err(e)) => warn!("[SERIAL] Read error: {:?}", e),
        }
    }
}

/// Console only, used when the ethernet controller is missing
async fn serve_console(ctl: &mut Controller, rx: &mut UartRx<'static, Async>) {
    let mut serial = [0u8; 32];
    loop {
        match rx.read_async(&mut serial).await {
            Ok(n) => {
                if ctl.on_serial(&serial[..n]).await {
                    if let Err(e) = ctl.reload() {
                        warn!("[MAIN] Reload failed: {}", e);
                    }
                }
            }
            Err(e) => warn!("[SERIAL] Read error: {:?}", e),
        }
    }
}

#[embassy_executor::task]
async fn control_task(
    spawner: Spawner,
    mut ctl: Controller,
    mut rx: UartRx<'static, Async>,
    w5500: W5500Pins,
) {
    write_serial(&mut ctl.tx, b"\r\n").await;
    write_serial(&mut ctl.tx, APP_NAME.as_bytes()).await;
    write_serial(&mut ctl.tx, b" ready, type HELP\r\n").await;

    let active = *ctl.processor.active();
    let device = match ethernet::start_w5500(&active, w5500.spi, w5500.int, w5500.reset).await {
        Ok((device, runner)) => {
            spawner.spawn(ethernet_task(runner)).ok();
            device
        }
        Err(e) => {
            error!("[NET] Ethernet unavailable ({}), console only", e);
            serve_console(&mut ctl, &mut rx).await;
            return;
        }
    };

    let (stack, runner) = ethernet::start_stack(device, &active, ctl.variant);
    spawner.spawn(net_task(runner)).ok();

    loop {
        let served = match ctl.variant {
            Variant::Osc => serve_udp(&mut ctl, &mut rx, stack).await,
            Variant::HttpGet => serve_http(&mut ctl, &mut rx, stack).await,
        };
        match served {
            Ok(()) => match ctl.reload() {
                Ok(active) => ethernet::reconfigure(stack, &active, ctl.variant),
                Err(e) => warn!("[MAIN] Reload failed: {}", e),
            },
            Err(e) => {
                warn!("[MAIN] Server stopped: {}", e);
                Timer::after(Duration::from_secs(1)).await;
            }
        }
    }
}

fn pulled_down() -> InputConfig {
    InputConfig::default().with_pull(Pull::Down)
}

/// Configure pins and peripherals and load the active profile
fn bring_up(
    p: Peripherals,
    variant: Variant,
) -> Result<(Controller, UartRx<'static, Async>, W5500Pins), BoardError> {
    // Initialize embassy time system
    let timer_group0 = TimerGroup::new(p.TIMG0);
    esp_hal_embassy::init(timer_group0.timer0);

    let mut store = ConfigStore::new(FlashEeprom::new(), variant)?;

    let mut selector = ProfileSelector::new(
        Input::new(p.GPIO0, pulled_down()),
        Input::new(p.GPIO1, pulled_down()),
    );
    let status_enable = Input::new(p.GPIO19, pulled_down());
    let index = selector.select_index()?;
    let active = load_active_configuration(&mut store, index.get())?;
    info!("[MAIN] MAC {} invert 0x{:02x}", active.mac, active.invert.0);

    let map = OutputMap::new(&HARDWARE)?;
    let mut bank = GpioBank::new();
    let off = OutputConfig::default();
    bank.add(config::OUTPUT_PINS[0], Output::new(p.GPIO3, Level::Low, off))?;
    bank.add(config::OUTPUT_PINS[1], Output::new(p.GPIO4, Level::Low, off))?;
    bank.add(config::OUTPUT_PINS[2], Output::new(p.GPIO5, Level::Low, off))?;
    bank.add(config::OUTPUT_PINS[3], Output::new(p.GPIO18, Level::Low, off))?;
    let mut outputs = Outputs::new(map.clone(), active.invert, bank);
    outputs.reset_all()?;

    let uart = Uart::new(p.UART0, UartConfig::default().with_baudrate(config::SERIAL_BAUD))
        .map_err(|_| BoardError::Peripheral)?
        .with_rx(p.GPIO20)
        .with_tx(p.GPIO21)
        .into_async();
    let (rx, tx) = uart.split();

    let spi_config = SpiConfig::default()
        .with_frequency(Rate::from_mhz(config::W5500_SPI_MHZ))
        .with_mode(Mode::_0);
    let spi = Spi::new(p.SPI2, spi_config)
        .map_err(|_| BoardError::Peripheral)?
        .with_sck(p.GPIO6)
        .with_mosi(p.GPIO7)
        .with_miso(p.GPIO2)
        .into_async();
    let cs = Output::new(p.GPIO10, Level::High, OutputConfig::default());
    let w5500 = W5500Pins {
        spi: ExclusiveDevice::new(spi, cs, Delay),
        int: Input::new(p.GPIO8, InputConfig::default().with_pull(Pull::Up)),
        reset: Output::new(p.GPIO9, Level::High, OutputConfig::default()),
    };

    let controller = Controller {
        variant,
        store,
        selector,
        status_enable,
        outputs,
        console: SerialConsole::new(variant, map, Some(active.index)),
        processor: CommandProcessor::new(variant, active, false),
        tx,
    };
    Ok((controller, rx, w5500))
}

#[esp_hal::main]
fn main() -> ! {
    esp_println::logger::init_logger(log::LevelFilter::Info);

    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    let variant = Variant::build();
    info!("[MAIN] {} {} ({} variant)", APP_NAME, VERSION, variant.name());

    let (controller, rx, w5500) = match bring_up(peripherals, variant) {
        Ok(parts) => parts,
        Err(e) => {
            error!("[MAIN] Bring-up failed: {}", e);
            loop {
                core::hint::spin_loop();
            }
        }
    };

    let executor = EXECUTOR.init(Executor::new());
    executor.run(|spawner| {
        info!("[MAIN] Spawning control task...");
        spawner.spawn(control_task(spawner, controller, rx, w5500)).ok();
    });
}

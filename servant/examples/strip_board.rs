//! strip_board
//!
//! Run on target: `cd servant`
//! cargo embed --example strip_board --no-default-features --features board --release
//!
//! Run on host: `cd master`
//! cargo run -- /dev/ttyUSB0
//!
//! The power strip firmware on its SAM E70 controller.
//!
//! Serial at 9600bps, over programmer or ftdi.
//!     TX PA10
//!     RX PA9
//!
//! Relays PA0..PA3, zero cross detector PA4, external control PA5 PA6 PA11.
//! Current sensors on AFEC0 (PB3, PB2, PA17), light sensor on AFEC1 (PB1).
//!
//! There is no card driver, day files and the saved state are kept in RAM
//! and the oldest day is dropped when the files run out.
#![no_std]
#![no_main]

use panic_rtt_target as _;

use servant::CurrentSnapshot;

static CURRENTS: CurrentSnapshot = CurrentSnapshot::new();

/// Core and SysTick clock.
const CORE_HZ: u32 = 16_000_000;

mod board {
    use core::convert::Infallible;

    use atsamx7x_hal as hal;
    use hal::afec::*;
    use hal::ehal::adc::OneShot;
    use hal::ehal::digital::v2::{InputPin, OutputPin, PinState};
    use hal::ehal::serial::Write as _;
    use hal::pio::*;
    use hal::serial::uart::*;
    use heapless::spsc::Consumer;
    use heapless::{String, Vec};
    use log::warn;
    use nb::block;
    use servant::hal::{
        serial, AuxInputs, Board, CurrentAdc, DelayUs, Edge, FileRead, RealTimeClock, RelayBank,
        Storage, ZeroCrossDetector,
    };
    use servant::settings::STATE_FILE;

    pub const RX_QUEUE: usize = 64;
    pub const MAX_FILES: usize = 4;
    pub const FILE_CAP: usize = 24 * 1024;

    const VREF: f32 = 3.3;
    const FULL_SCALE: f32 = 8192.0;
    const MID_SCALE: u16 = 4096;

    fn counts(volts: f32) -> u16 {
        (volts / VREF * FULL_SCALE) as u16
    }

    pub struct StripBoard;

    impl Board for StripBoard {
        type Serial = QueuedSerial;
        type Relays = RelayPins;
        type ZeroCross = ZeroCrossPin;
        type Rtc = UptimeClock;
        type Storage = RamCard;
        type Aux = AuxPins;
        type Delay = CycleDelay;
    }

    /// Received bytes come from the UART interrupt through a queue.
    pub struct QueuedSerial {
        pub rx: Consumer<'static, u8, RX_QUEUE>,
        pub tx: Tx<Uart0>,
    }

    impl serial::Read<u8> for QueuedSerial {
        type Error = Infallible;

        fn read(&mut self) -> nb::Result<u8, Infallible> {
            self.rx.dequeue().ok_or(nb::Error::WouldBlock)
        }
    }

    impl serial::Write<u8> for QueuedSerial {
        type Error = <Tx<Uart0> as serial::Write<u8>>::Error;

        fn write(&mut self, byte: u8) -> nb::Result<(), Self::Error> {
            self.tx.write(byte)
        }

        fn flush(&mut self) -> nb::Result<(), Self::Error> {
            self.tx.flush()
        }
    }

    pub struct RelayPins {
        pub pins: (
            Pin<PA0, Output>,
            Pin<PA1, Output>,
            Pin<PA2, Output>,
            Pin<PA3, Output>,
        ),
        pub state: u8,
    }

    impl RelayBank for RelayPins {
        fn set(&mut self, socket: usize, on: bool) {
            let level = PinState::from(on);
            let written = match socket {
                0 => self.pins.0.set_state(level).ok(),
                1 => self.pins.1.set_state(level).ok(),
                2 => self.pins.2.set_state(level).ok(),
                3 => self.pins.3.set_state(level).ok(),
                _ => None,
            };
            if written.is_some() {
                self.state = (self.state & !(1 << socket)) | ((on as u8) << socket);
            }
        }

        fn is_on(&self, socket: usize) -> bool {
            socket < 8 && self.state & (1 << socket) != 0
        }
    }

    /// Sampled from the idle loop, edges between polls are seen late.
    pub struct ZeroCrossPin {
        pub pin: Pin<PA4, Input>,
        pub high: bool,
    }

    impl ZeroCrossDetector for ZeroCrossPin {
        fn poll(&mut self) -> Option<Edge> {
            let high = self.pin.is_high().ok()?;
            if high == self.high {
                return None;
            }
            self.high = high;
            Some(if high { Edge::Rising } else { Edge::Falling })
        }
    }

    /// Seconds since boot plus whatever the host set last.
    pub struct UptimeClock {
        pub uptime: fn() -> u64,
        pub base: i64,
    }

    impl RealTimeClock for UptimeClock {
        fn now(&mut self) -> i64 {
            self.base + (self.uptime)() as i64
        }

        fn set(&mut self, unix: i64) {
            self.base = unix - (self.uptime)() as i64;
        }
    }

    pub struct SensorAdc {
        pub afec: Afec<Afec0>,
        pub pins: (Pin<PB3, Input>, Pin<PB2, Input>, Pin<PA17, Input>),
    }

    impl CurrentAdc for SensorAdc {
        fn read(&mut self, channel: usize) -> u16 {
            let volts: Option<f32> = match channel {
                0 => block!(self.afec.read(&mut self.pins.0)).ok(),
                1 => block!(self.afec.read(&mut self.pins.1)).ok(),
                _ => block!(self.afec.read(&mut self.pins.2)).ok(),
            };
            volts.map(counts).unwrap_or(MID_SCALE)
        }
    }

    pub struct AuxPins {
        pub afec: Afec<Afec1>,
        pub light: Pin<PB1, Input>,
        pub ext: (Pin<PA5, Input>, Pin<PA6, Input>, Pin<PA11, Input>),
    }

    impl AuxInputs for AuxPins {
        fn light_level(&mut self) -> u16 {
            let volts: Option<f32> = block!(self.afec.read(&mut self.light)).ok();
            volts.map(counts).unwrap_or(0)
        }

        fn ext_pin(&mut self, pin: usize) -> bool {
            let high = match pin {
                0 => self.ext.0.is_high(),
                1 => self.ext.1.is_high(),
                _ => self.ext.2.is_high(),
            };
            high.unwrap_or(false)
        }
    }

    /// Busy wait on the core clock.
    pub struct CycleDelay;

    impl DelayUs<u16> for CycleDelay {
        fn delay_us(&mut self, us: u16) {
            cortex_m::asm::delay(us as u32 * (super::CORE_HZ / 1_000_000));
        }
    }

    #[derive(Debug)]
    pub enum RamError {
        NotFound,
        Name,
        Full,
    }

    type File = (String<8>, Vec<u8, FILE_CAP>);

    pub struct RamFiles {
        files: Vec<File, MAX_FILES>,
    }

    impl RamFiles {
        pub const fn new() -> Self {
            Self { files: Vec::new() }
        }

        fn find(&self, name: &str) -> Option<usize> {
            self.files.iter().position(|(n, _)| n.as_str() == name)
        }

        fn file_mut(&mut self, name: &str) -> Result<&mut Vec<u8, FILE_CAP>, RamError> {
            let index = match self.find(name) {
                Some(index) => index,
                None => {
                    if self.files.is_full() {
                        self.drop_oldest_day();
                    }
                    let mut key = String::new();
                    key.push_str(name).map_err(|_| RamError::Name)?;
                    self.files.push((key, Vec::new())).map_err(|_| RamError::Full)?;
                    self.files.len() - 1
                }
            };
            Ok(&mut self.files[index].1)
        }

        fn drop_oldest_day(&mut self) {
            let oldest = self
                .files
                .iter()
                .enumerate()
                .filter(|(_, (name, _))| name.as_str() != STATE_FILE)
                .min_by(|(_, a), (_, b)| a.0.as_str().cmp(b.0.as_str()))
                .map(|(index, _)| index);
            if let Some(index) = oldest {
                let (name, _) = self.files.swap_remove(index);
                warn!("{}: dropped, out of files", name);
            }
        }
    }

    pub struct RamCard(pub &'static mut RamFiles);

    pub struct RamReader<'a> {
        data: &'a [u8],
    }

    impl FileRead for RamReader<'_> {
        type Error = RamError;

        fn read(&mut self, buf: &mut [u8]) -> Result<usize, RamError> {
            let n = buf.len().min(self.data.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Ok(n)
        }
    }

    impl Storage for RamCard {
        type Error = RamError;
        type Reader<'a> = RamReader<'a>;

        fn exists(&mut self, name: &str) -> bool {
            self.0.find(name).is_some()
        }

        fn open_read(&mut self, name: &str) -> Result<RamReader<'_>, RamError> {
            let index = self.0.find(name).ok_or(RamError::NotFound)?;
            Ok(RamReader {
                data: &self.0.files[index].1,
            })
        }

        fn append(&mut self, name: &str, bytes: &[u8]) -> Result<(), RamError> {
            self.0
                .file_mut(name)?
                .extend_from_slice(bytes)
                .map_err(|_| RamError::Full)
        }

        fn overwrite(&mut self, name: &str, bytes: &[u8]) -> Result<(), RamError> {
            let file = self.0.file_mut(name)?;
            for (i, byte) in bytes.iter().enumerate() {
                match file.get_mut(i) {
                    Some(slot) => *slot = *byte,
                    None => file.push(*byte).map_err(|_| RamError::Full)?,
                }
            }
            Ok(())
        }

        fn remove(&mut self, name: &str) -> Result<(), RamError> {
            let index = self.0.find(name).ok_or(RamError::NotFound)?;
            self.0.files.swap_remove(index);
            Ok(())
        }
    }
}

/// `log` records to the RTT channel.
struct RttLogger;

impl log::Log for RttLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::Level::Info
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            rtt_target::rprintln!("{} {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: RttLogger = RttLogger;

#[rtic::app(device = atsamx7x_hal::pac, peripherals = true, dispatchers = [IXC])]
mod app {
    // Backend dependencies
    use atsamx7x_hal as hal;
    use dwt_systick_monotonic::DwtSystick;
    use hal::afec::*;
    use hal::clocks::*;
    use hal::efc::*;
    use hal::ehal::serial::Read;
    use hal::fugit::{ExtU64, Instant, RateExtU32};
    use hal::generics::events::EventHandler;
    use hal::pio::*;
    use hal::serial::uart::UartConfiguration;
    use hal::serial::{uart::*, ExtBpsU32};
    use rtt_target::{rprintln, rtt_init_print};

    // Application dependencies
    use heapless::spsc::{Producer, Queue};
    use log::{error, LevelFilter};
    use servant::sampling::{SamplingEngine, TICK_PERIOD_MS};
    use servant::{Device, DeviceConfig, Parts};

    use super::board::*;
    use super::{CURRENTS, LOGGER};

    #[monotonic(binds = SysTick, default = true)]
    type Mono = DwtSystick<16_000_000>;

    #[shared]
    struct Shared {}

    #[local]
    struct Local {
        device: Device<'static, StripBoard>,
        engine: SamplingEngine<SensorAdc, CycleDelay>,
        rx: Rx<Uart0>,
        producer: Producer<'static, u8, RX_QUEUE>,
    }

    fn uptime() -> u64 {
        monotonics::now().duration_since_epoch().to_secs()
    }

    #[init(local = [
        queue: Queue<u8, RX_QUEUE> = Queue::new(),
        files: RamFiles = RamFiles::new(),
    ])]
    fn init(mut ctx: init::Context) -> (Shared, Local, init::Monotonics) {
        let pac = ctx.device;

        pac.WDT.mr.modify(|_r, c| c.wddis().set_bit());
        pac.RSWDT.mr.modify(|_r, c| c.wddis().set_bit());

        rtt_init_print!();
        if log::set_logger(&LOGGER).is_ok() {
            log::set_max_level(LevelFilter::Info);
        }
        rprintln!("reset - strip_board");

        let clocks = Tokens::new((pac.PMC, pac.SUPC, pac.UTMI), &pac.WDT.into());
        // use internal rc oscillator for slow clock
        let slck = clocks.slck.configure_internal();
        // use external xtal as oscillator for main clock
        let mainck = clocks.mainck.configure_external_normal(16.MHz()).unwrap();
        let pck: Pck<Pck4> = clocks.pcks.pck4.configure(&mainck, 3).unwrap();
        let (hclk, mut mck) = HostClockController::new(clocks.hclk, clocks.mck)
            .configure(
                &mainck,
                &mut Efc::new(pac.EFC, VddioLevel::V3),
                HostClockConfig {
                    pres: HccPrescaler::Div1,
                    div: MckDivider::Div1,
                },
            )
            .unwrap();

        let banka = BankA::new(pac.PIOA, &mut mck, &slck, BankConfiguration::default());
        let bankb = BankB::new(pac.PIOB, &mut mck, &slck, BankConfiguration::default());

        // serial setup
        let tx = banka.pa10.into_peripheral();
        let rx = banka.pa9.into_peripheral();
        let mut uart = Uart::new_uart0(
            pac.UART0,
            (tx, rx),
            UartConfiguration::default(9_600.bps()).mode(ChannelMode::Normal),
            PeripheralClock::Other(&mut mck, &pck),
        )
        .unwrap();
        uart.listen_slice(&[Event::RxReady]);
        let (tx, rx) = uart.split();
        let (producer, consumer) = ctx.local.queue.split();

        // relays start off, the device restores the saved state
        let relays = RelayPins {
            pins: (
                banka.pa0.into_output(false),
                banka.pa1.into_output(false),
                banka.pa2.into_output(false),
                banka.pa3.into_output(false),
            ),
            state: 0,
        };

        let sensors = SensorAdc {
            afec: Afec::new_afec0(pac.AFEC0, &mut mck).unwrap(),
            pins: (
                bankb.pb3.into_input(PullDir::PullUp),
                bankb.pb2.into_input(PullDir::PullUp),
                banka.pa17.into_input(PullDir::PullUp),
            ),
        };
        let aux = AuxPins {
            afec: Afec::new_afec1(pac.AFEC1, &mut mck).unwrap(),
            light: bankb.pb1.into_input(PullDir::PullUp),
            ext: (
                banka.pa5.into_input(PullDir::PullDown),
                banka.pa6.into_input(PullDir::PullDown),
                banka.pa11.into_input(PullDir::PullDown),
            ),
        };

        // monotonic timer
        let mut mono = DwtSystick::new(
            &mut ctx.core.DCB,
            ctx.core.DWT,
            ctx.core.SYST,
            hclk.systick_freq().to_Hz(),
        );
        let now = mono.now();

        let config = DeviceConfig::default();
        let engine = SamplingEngine::new(sensors, CycleDelay, config.sensor);
        let parts = Parts::<StripBoard> {
            serial: QueuedSerial { rx: consumer, tx },
            relays,
            zero_cross: ZeroCrossPin {
                pin: banka.pa4.into_input(PullDir::PullUp),
                high: false,
            },
            rtc: UptimeClock { uptime, base: 0 },
            storage: RamCard(ctx.local.files),
            aux,
            delay: CycleDelay,
        };
        let device = Device::new(parts, &CURRENTS, config);

        // spawn first sample directly
        sample::spawn_at(now, now).unwrap();

        (
            Shared {},
            Local {
                device,
                engine,
                rx,
                producer,
            },
            init::Monotonics(mono),
        )
    }

    #[idle(local = [device])]
    fn idle(ctx: idle::Context) -> ! {
        loop {
            ctx.local.device.poll();
        }
    }

    #[task(binds = UART0, local = [rx, producer], priority = 3)]
    fn uart0(ctx: uart0::Context) {
        let uart0::LocalResources { rx, producer } = ctx.local;
        while let Ok(byte) = rx.read() {
            // a full queue drops the byte, the host resends the request
            let _ = producer.enqueue(byte);
        }
    }

    #[task(priority = 2, local = [engine])]
    fn sample(ctx: sample::Context, at: Instant<u64, 1, 16_000_000>) {
        ctx.local.engine.tick(&CURRENTS);
        let next = at + TICK_PERIOD_MS.millis();
        if sample::spawn_at(next, next).is_err() {
            error!("sampling stopped");
        }
    }
}

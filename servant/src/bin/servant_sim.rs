//! The power strip firmware on a PC.
//!
//! Serves the serial line on TCP port 2000 like the strip's WiFi bridge, so
//! `master 127.0.0.1` talks to it. Day files and the saved state go to a
//! directory.

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use log::{info, LevelFilter};
use powerstrip::SENSED_SOCKETS;
use servant::sampling::{SamplingEngine, TICK_PERIOD_MS};
use servant::sim::{self, FsStorage, SimAdc, SimRelays, StdDelay, TcpBoard, TcpSerial};
use servant::{CurrentSnapshot, Device, DeviceConfig};

static CURRENTS: CurrentSnapshot = CurrentSnapshot::new();

/// Simulated power strip.
#[derive(Debug, Parser)]
#[command(name = "servant-sim", version)]
struct Args {
    /// Address the serial bridge listens on.
    #[arg(long, default_value = "0.0.0.0:2000")]
    listen: String,

    /// Directory standing in for the storage card.
    #[arg(long, default_value = "sdcard")]
    data_dir: PathBuf,

    /// Seconds east of UTC of the calendar naming the day files.
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    utc_offset: i32,

    /// Load in milliamps on sockets 1 to 3 while they are switched on.
    #[arg(long, value_delimiter = ',', default_values_t = [500u16, 250, 0])]
    load: Vec<u16>,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::new()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();
    let args = Args::parse();

    let config = DeviceConfig {
        utc_offset_secs: args.utc_offset,
        ..Default::default()
    };
    let storage = FsStorage::open(&args.data_dir)
        .with_context(|| format!("storage {}", args.data_dir.display()))?;
    let serial = TcpSerial::bind(&args.listen).with_context(|| format!("listen {}", args.listen))?;
    info!("serving on {}", serial.local_addr()?);

    let relays = SimRelays::default();
    let adc = SimAdc::new(&relays, config.sensor.calibration);
    for (channel, load) in args.load.iter().enumerate().take(SENSED_SOCKETS) {
        adc.set_load(channel, *load);
    }
    let mut engine = SamplingEngine::new(adc, StdDelay, config.sensor);
    thread::Builder::new()
        .name("sampling".into())
        .spawn(move || loop {
            engine.tick(&CURRENTS);
            thread::sleep(Duration::from_millis(TICK_PERIOD_MS));
        })
        .context("sampling thread")?;

    let mut device = Device::new(TcpBoard::parts(serial, relays, storage), &CURRENTS, config);
    let stop = AtomicBool::new(false);
    sim::run(&mut device, &stop);
    Ok(())
}

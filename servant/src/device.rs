//! The device: command dispatch, relay switching, behaviors and logging.

use log::{debug, info, warn};
use powerstrip::{Command, EnergyReply, StatusReply, LOG_CADENCE_SECS, SENSED_SOCKETS, SOCKETS};

use crate::aggregate;
use crate::behavior::{Behavior, Behaviors, DIMMED_SOCKET, DIM_PULSE_US, EXT_CONTROLLED, LAMP_SOCKET};
use crate::hal::{AuxInputs, Board, DelayUs, Parts, RealTimeClock, RelayBank, ZeroCrossDetector};
use crate::link::SerialLink;
use crate::logstore::{CadenceTimer, LogStore};
use crate::sampling::{CurrentSnapshot, SensorConfig};
use crate::settings::{PersistedState, Settings};

/// Sockets the host can switch, a toggle for any other index is acked and
/// ignored.
pub const SWITCHABLE_SOCKETS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceConfig {
    /// Shift from UTC of the calendar used to name day files.
    pub utc_offset_secs: i32,
    pub cadence_secs: i32,
    /// Limit of the current limiter, per socket.
    pub current_limit_ma: u16,
    /// Bit `i` set: socket `i` is switched on at a zero crossing.
    pub zero_cross_sockets: u8,
    /// Light level above which the auto lamp goes off.
    pub light_threshold: u16,
    pub sensor: SensorConfig,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            utc_offset_secs: 0,
            cadence_secs: LOG_CADENCE_SECS,
            current_limit_ma: 5000,
            zero_cross_sockets: 0b1101,
            light_threshold: 1000,
            sensor: SensorConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Switching {
    AwaitZeroCross,
    Assert,
}

pub struct Device<'a, B: Board> {
    link: SerialLink<B::Serial>,
    relays: B::Relays,
    zero_cross: B::ZeroCross,
    rtc: B::Rtc,
    storage: B::Storage,
    aux: B::Aux,
    delay: B::Delay,
    currents: &'a CurrentSnapshot,
    config: DeviceConfig,
    settings: Settings,
    behaviors: Behaviors,
    cadence: CadenceTimer,
}

impl<'a, B: Board> Device<'a, B> {
    /// Takes over the board and restores the saved relay states.
    pub fn new(parts: Parts<B>, currents: &'a CurrentSnapshot, config: DeviceConfig) -> Self {
        let Parts {
            serial,
            mut relays,
            zero_cross,
            mut rtc,
            mut storage,
            aux,
            delay,
        } = parts;
        let state = PersistedState::load(&mut storage);
        for (socket, on) in state.sockets.iter().enumerate() {
            relays.set(socket, *on);
        }
        let now = rtc.now();
        info!("device up at {}, {:?}", now, state.settings);
        Self {
            link: SerialLink::new(serial),
            relays,
            zero_cross,
            rtc,
            storage,
            aux,
            delay,
            currents,
            config,
            settings: state.settings,
            behaviors: Behaviors::default(),
            cadence: CadenceTimer::new(config.cadence_secs as i64, now),
        }
    }

    /// One turn of the main loop.
    pub fn poll(&mut self) {
        if let Some(request) = self.link.poll_request() {
            self.dispatch(&request);
        }
        self.run_behaviors();
        if self.settings.limiter_on() {
            self.limit_current();
        }
        let now = self.rtc.now();
        if self.settings.logging && self.cadence.expired(now) {
            let currents = self.currents.load();
            self.log_store().append(now, currents);
        }
    }

    /// Runs one request payload, replying if it is understood.
    pub fn dispatch(&mut self, payload: &[u8]) {
        let command = match Command::decode(payload) {
            Ok(command) => command,
            Err(err) => {
                warn!("request {:?} dropped: {}", payload, err);
                return;
            }
        };
        info!("{:?}", command);
        match command {
            Command::ToggleSocket { socket, on } => {
                let socket = socket as usize;
                if socket < SWITCHABLE_SOCKETS {
                    self.switch_socket(socket, on);
                } else {
                    warn!("socket {} can not be switched", socket);
                }
                self.link.reply(&[]);
            }
            Command::RequestStatus => match self.status().encode() {
                Ok(reply) => self.link.reply(&reply),
                Err(err) => warn!("status: {}", err),
            },
            Command::SetTime { unix } => {
                self.set_time(unix as i64);
                self.link.reply(&[]);
            }
            Command::EnergyQuery { start, end } => {
                let joules = self.energy_between(start as i64, end as i64);
                match (EnergyReply { joules }).encode() {
                    Ok(reply) => self.link.reply(&reply),
                    Err(err) => warn!("energy: {}", err),
                }
            }
        }
    }

    pub fn status(&self) -> StatusReply {
        let mut sockets = 0;
        for socket in 0..SOCKETS {
            if self.relays.is_on(socket) {
                sockets |= 1 << socket;
            }
        }
        StatusReply {
            sockets,
            currents: self.currents.load(),
        }
    }

    pub fn set_time(&mut self, unix: i64) {
        self.rtc.set(unix);
        self.cadence = CadenceTimer::new(self.config.cadence_secs as i64, unix);
    }

    pub fn energy_between(&mut self, start: i64, end: i64) -> [u32; SOCKETS] {
        let max_gap = self.config.cadence_secs as i64;
        aggregate::energy_between(&mut self.log_store(), start, end, max_gap)
    }

    /// Switches a relay and saves the new state.
    ///
    /// Gated sockets are only switched on at a mains zero crossing, this spins
    /// until the detector reports one.
    pub fn switch_socket(&mut self, socket: usize, on: bool) {
        let mut step = if self.gated(socket, on) {
            Switching::AwaitZeroCross
        } else {
            Switching::Assert
        };
        loop {
            match step {
                Switching::AwaitZeroCross => {
                    if let Some(edge) = self.zero_cross.poll() {
                        debug!("zero cross {:?}", edge);
                        step = Switching::Assert;
                    }
                }
                Switching::Assert => {
                    self.relays.set(socket, on);
                    break;
                }
            }
        }
        self.save_state();
    }

    fn gated(&self, socket: usize, on: bool) -> bool {
        on && self.settings.zero_cross && self.config.zero_cross_sockets & (1 << socket) != 0
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn set_zero_cross(&mut self, on: bool) {
        self.settings.zero_cross = on;
        self.save_state();
    }

    pub fn set_logging(&mut self, on: bool) {
        self.settings.logging = on;
        self.save_state();
    }

    pub fn set_current_limiter(&mut self, level: u8) {
        self.settings.current_limiter = level % 2;
        self.save_state();
    }

    pub fn behaviors(&self) -> &Behaviors {
        &self.behaviors
    }

    pub fn behaviors_mut(&mut self) -> &mut Behaviors {
        &mut self.behaviors
    }

    pub fn relays(&self) -> &B::Relays {
        &self.relays
    }

    pub fn storage(&mut self) -> &mut B::Storage {
        &mut self.storage
    }

    pub fn serial(&mut self) -> &mut B::Serial {
        self.link.serial()
    }

    fn log_store(&mut self) -> LogStore<'_, B::Storage> {
        LogStore::new(&mut self.storage, self.config.utc_offset_secs)
    }

    fn save_state(&mut self) {
        let mut sockets = [false; SOCKETS];
        for (socket, on) in sockets.iter_mut().enumerate() {
            *on = self.relays.is_on(socket);
        }
        let state = PersistedState {
            sockets,
            settings: self.settings,
        };
        state.save(&mut self.storage);
    }

    fn run_behaviors(&mut self) {
        for behavior in Behavior::ALL {
            if !self.behaviors.is_enabled(behavior) {
                continue;
            }
            match behavior {
                Behavior::AutoLamp => {
                    let dark = self.aux.light_level() <= self.config.light_threshold;
                    self.follow(LAMP_SOCKET, dark);
                }
                Behavior::LightDimmer => self.dim(),
                Behavior::ExternalControl => {
                    for socket in 0..EXT_CONTROLLED {
                        let on = self.aux.ext_pin(socket);
                        self.follow(socket, on);
                    }
                }
            }
        }
    }

    fn follow(&mut self, socket: usize, on: bool) {
        if self.relays.is_on(socket) != on {
            self.switch_socket(socket, on);
        }
    }

    fn dim(&mut self) {
        if self.zero_cross.poll().is_none() {
            return;
        }
        let wait = self.behaviors.dimming_wait_us();
        if wait == 0 {
            self.relays.set(DIMMED_SOCKET, true);
            return;
        }
        self.delay.delay_us(wait);
        self.relays.set(DIMMED_SOCKET, true);
        self.delay.delay_us(DIM_PULSE_US);
        self.relays.set(DIMMED_SOCKET, false);
    }

    fn limit_current(&mut self) {
        let currents = self.currents.load();
        for (socket, current) in currents.iter().enumerate().take(SENSED_SOCKETS) {
            if *current > self.config.current_limit_ma && self.relays.is_on(socket) {
                warn!("socket {} at {} mA, switched off", socket, current);
                self.switch_socket(socket, false);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::Storage;
    use crate::settings::STATE_FILE;
    use crate::sim::{BenchBoard, MemStorage};
    use powerstrip::command::{
        CODE_ENERGY_QUERY, CODE_REQUEST_STATUS, CODE_SET_TIME, CODE_TOGGLE_SOCKET,
    };
    use powerstrip::{Sample, ACK_MARKER, START_MARKER};

    const T: i64 = 1_400_000_000;

    fn device(snapshot: &CurrentSnapshot, storage: MemStorage) -> Device<'_, BenchBoard> {
        Device::new(BenchBoard::parts(T, storage), snapshot, DeviceConfig::default())
    }

    fn request(device: &mut Device<'_, BenchBoard>, payload: &[u8]) -> std::vec::Vec<u8> {
        let serial = device.serial();
        serial.feed(&[START_MARKER, payload.len() as u8]);
        serial.feed(payload);
        device.poll();
        device.serial().take_written()
    }

    #[test]
    fn toggle_is_acked_and_saved() {
        let snapshot = CurrentSnapshot::new();
        let mut device = device(&snapshot, MemStorage::default());
        let reply = request(&mut device, &[CODE_TOGGLE_SOCKET, 1, 1]);
        assert_eq!(reply, [ACK_MARKER, 0]);
        assert!(device.relays().is_on(1));
        assert_eq!(device.storage().file(STATE_FILE).unwrap(), &[0, 1, 0, 0, 1, 1, 0]);
    }

    #[test]
    fn fourth_socket_toggle_is_acked_and_ignored() {
        let snapshot = CurrentSnapshot::new();
        let mut device = device(&snapshot, MemStorage::default());
        let reply = request(&mut device, &[CODE_TOGGLE_SOCKET, 3, 1]);
        assert_eq!(reply, [ACK_MARKER, 0]);
        assert!(!device.relays().is_on(3));
    }

    #[test]
    fn gated_socket_waits_for_zero_cross() {
        let snapshot = CurrentSnapshot::new();
        let mut device = device(&snapshot, MemStorage::default());
        device.switch_socket(0, true);
        assert!(device.relays().is_on(0));
        assert_eq!(device.zero_cross.polls(), 2);
        // switching off and the exempt socket do not wait
        device.switch_socket(0, false);
        device.switch_socket(1, true);
        assert_eq!(device.zero_cross.polls(), 2);
    }

    #[test]
    fn status_reports_relays_and_snapshot() {
        let snapshot = CurrentSnapshot::new();
        snapshot.store(&[100, 0, 2500, 0]);
        let mut device = device(&snapshot, MemStorage::default());
        device.switch_socket(2, true);
        let reply = request(&mut device, &[CODE_REQUEST_STATUS]);
        assert_eq!(reply[..2], [ACK_MARKER, 9]);
        let status = StatusReply::decode(&reply[2..]).unwrap();
        assert_eq!(status.sockets, 0b0100);
        assert_eq!(status.currents, [100, 0, 2500, 0]);
    }

    #[test]
    fn unknown_and_short_requests_get_no_reply() {
        let snapshot = CurrentSnapshot::new();
        let mut device = device(&snapshot, MemStorage::default());
        assert!(request(&mut device, &[99]).is_empty());
        assert!(request(&mut device, &[CODE_TOGGLE_SOCKET, 1]).is_empty());
        assert!(request(&mut device, &[CODE_TOGGLE_SOCKET]).is_empty());
        assert!(request(&mut device, &[CODE_SET_TIME, 1, 2]).is_empty());
        assert!(request(&mut device, &[CODE_ENERGY_QUERY, 0, 0, 0, 0, 1]).is_empty());
        assert!(!device.relays().is_on(1));
        // the stream is still in step
        assert_eq!(request(&mut device, &[CODE_TOGGLE_SOCKET, 1, 1]), [ACK_MARKER, 0]);
    }

    #[test]
    fn state_is_restored_at_boot() {
        let mut storage = MemStorage::default();
        storage.overwrite(STATE_FILE, &[1, 0, 1, 0, 0, 0, 1]).unwrap();
        let snapshot = CurrentSnapshot::new();
        let device = device(&snapshot, storage);
        assert!(device.relays().is_on(0));
        assert!(!device.relays().is_on(1));
        assert!(device.relays().is_on(2));
        assert!(!device.settings().zero_cross);
        assert!(!device.settings().logging);
        assert!(device.settings().limiter_on());
    }

    #[test]
    fn samples_are_logged_on_cadence() {
        let snapshot = CurrentSnapshot::new();
        snapshot.store(&[100, 200, 300, 0]);
        let mut device = device(&snapshot, MemStorage::default());
        for _ in 0..25 {
            device.poll();
        }
        // the bench clock ticks a second per read, starting at T
        let day = device.log_store().day_of(T).unwrap();
        let samples: std::vec::Vec<Sample> =
            device.log_store().scan(day).unwrap().unwrap().collect();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].timestamp as i64 % 10, 0);
        assert_eq!(samples[0].currents, [100, 200, 300, 0]);
    }

    #[test]
    fn nothing_is_logged_while_disabled() {
        let snapshot = CurrentSnapshot::new();
        let mut device = device(&snapshot, MemStorage::default());
        device.set_logging(false);
        for _ in 0..25 {
            device.poll();
        }
        assert_eq!(device.storage().len(), 1);
    }

    #[test]
    fn limiter_cuts_overloaded_sockets() {
        let snapshot = CurrentSnapshot::new();
        let mut device = device(&snapshot, MemStorage::default());
        device.switch_socket(1, true);
        device.switch_socket(2, true);
        snapshot.store(&[0, 5001, 5000, 0]);
        device.poll();
        assert!(device.relays().is_on(1));
        device.set_current_limiter(1);
        device.poll();
        assert!(!device.relays().is_on(1));
        assert!(device.relays().is_on(2));
    }

    #[test]
    fn auto_lamp_follows_light_level() {
        let snapshot = CurrentSnapshot::new();
        let mut device = device(&snapshot, MemStorage::default());
        device.behaviors_mut().set_enabled(Behavior::AutoLamp, true);
        device.aux.light = 200;
        device.poll();
        assert!(device.relays().is_on(LAMP_SOCKET));
        device.aux.light = 1001;
        device.poll();
        assert!(!device.relays().is_on(LAMP_SOCKET));
    }

    #[test]
    fn external_pins_drive_sockets() {
        let snapshot = CurrentSnapshot::new();
        let mut device = device(&snapshot, MemStorage::default());
        device.behaviors_mut().set_enabled(Behavior::ExternalControl, true);
        device.aux.pins = [true, false, true];
        device.poll();
        assert!(device.relays().is_on(0));
        assert!(!device.relays().is_on(1));
        assert!(device.relays().is_on(2));
    }

    #[test]
    fn dimmer_pulses_after_delay() {
        let snapshot = CurrentSnapshot::new();
        let mut device = device(&snapshot, MemStorage::default());
        device.behaviors_mut().set_enabled(Behavior::LightDimmer, true);
        device.behaviors_mut().set_dimming_delay(10);
        // the bench detector reports a crossing every second poll
        device.poll();
        device.poll();
        assert_eq!(device.delay.waited(), [800, DIM_PULSE_US as u32]);
        assert!(!device.relays().is_on(DIMMED_SOCKET));
        assert_eq!(device.relays().switches(DIMMED_SOCKET), 2);
    }
}

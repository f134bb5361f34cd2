//! Relay states and user settings that survive a power cycle.

use log::{error, info, warn};
use powerstrip::record::STATE_RECORD_LEN;
use powerstrip::{StateRecord, SOCKETS};

use crate::hal::{FileRead, Storage};

pub const STATE_FILE: &str = "STATE";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    /// Switch gated sockets on at a mains zero crossing.
    pub zero_cross: bool,
    /// Log a sample every cadence period.
    pub logging: bool,
    /// 0 off, 1 on.
    pub current_limiter: u8,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            zero_cross: true,
            logging: true,
            current_limiter: 0,
        }
    }
}

impl Settings {
    pub fn limiter_on(&self) -> bool {
        self.current_limiter == 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PersistedState {
    pub sockets: [bool; SOCKETS],
    pub settings: Settings,
}

impl From<&StateRecord> for PersistedState {
    fn from(record: &StateRecord) -> Self {
        let mut sockets = [false; SOCKETS];
        for (i, on) in sockets.iter_mut().enumerate() {
            *on = record.socket_on(i);
        }
        Self {
            sockets,
            settings: Settings {
                zero_cross: record.zero_cross_enabled(),
                logging: record.logging_enabled(),
                current_limiter: record.limiter_level(),
            },
        }
    }
}

impl From<&PersistedState> for StateRecord {
    fn from(state: &PersistedState) -> Self {
        StateRecord {
            sockets: state.sockets.map(u8::from),
            zero_cross: state.settings.zero_cross.into(),
            logging: state.settings.logging.into(),
            current_limiter: state.settings.current_limiter,
        }
    }
}

impl PersistedState {
    /// Reads the state record, defaults if it is missing or unreadable.
    pub fn load<S: Storage>(storage: &mut S) -> Self {
        if !storage.exists(STATE_FILE) {
            info!("no saved state, using defaults");
            return Self::default();
        }
        let mut buf = [0u8; STATE_RECORD_LEN];
        let read = storage
            .open_read(STATE_FILE)
            .and_then(|mut file| file.read_full(&mut buf));
        match read {
            Ok(true) => {}
            Ok(false) => {
                warn!("saved state is short, using defaults");
                return Self::default();
            }
            Err(err) => {
                error!("saved state unreadable: {:?}", err);
                return Self::default();
            }
        }
        match StateRecord::decode(&buf) {
            Ok(record) => {
                let state = Self::from(&record);
                info!("restored {:?}", state);
                state
            }
            Err(err) => {
                error!("saved state: {}", err);
                Self::default()
            }
        }
    }

    pub fn save<S: Storage>(&self, storage: &mut S) -> bool {
        let bytes = match StateRecord::from(self).encode() {
            Ok(bytes) => bytes,
            Err(err) => {
                error!("state not saved: {}", err);
                return false;
            }
        };
        match storage.overwrite(STATE_FILE, &bytes) {
            Ok(()) => true,
            Err(err) => {
                error!("state not saved: {:?}", err);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::MemStorage;

    #[test]
    fn missing_state_is_default() {
        let mut storage = MemStorage::default();
        let state = PersistedState::load(&mut storage);
        assert_eq!(state.sockets, [false; SOCKETS]);
        assert!(state.settings.zero_cross);
        assert!(state.settings.logging);
        assert!(!state.settings.limiter_on());
    }

    #[test]
    fn saved_state_is_restored() {
        let mut storage = MemStorage::default();
        let state = PersistedState {
            sockets: [true, false, true, false],
            settings: Settings {
                zero_cross: false,
                logging: true,
                current_limiter: 1,
            },
        };
        assert!(state.save(&mut storage));
        assert_eq!(storage.file(STATE_FILE).unwrap(), &[1, 0, 1, 0, 0, 1, 1]);
        assert_eq!(PersistedState::load(&mut storage), state);
    }

    #[test]
    fn short_record_is_ignored() {
        let mut storage = MemStorage::default();
        storage.overwrite(STATE_FILE, &[1, 1, 1]).unwrap();
        assert_eq!(PersistedState::load(&mut storage), PersistedState::default());
    }

    #[test]
    fn loose_bytes_are_read_like_the_firmware_writes_them() {
        let mut storage = MemStorage::default();
        storage.overwrite(STATE_FILE, &[2, 0, 0, 9, 2, 3, 3]).unwrap();
        let state = PersistedState::load(&mut storage);
        assert_eq!(state.sockets, [true, false, false, true]);
        assert!(!state.settings.zero_cross);
        assert!(state.settings.logging);
        assert_eq!(state.settings.current_limiter, 1);
    }
}

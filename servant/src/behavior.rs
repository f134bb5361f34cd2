//! Optional automatic behaviors, run by the device loop while enabled.

/// Extra delay per dimming step.
pub const DIM_STEP_US: u16 = 80;
/// Length of the trigger pulse of a dimmed socket.
pub const DIM_PULSE_US: u16 = 200;
pub const DEFAULT_DIMMING_DELAY: u8 = 50;

/// Socket switched by [`Behavior::AutoLamp`].
pub const LAMP_SOCKET: usize = 0;
/// Socket cut by [`Behavior::LightDimmer`].
pub const DIMMED_SOCKET: usize = 2;
/// Sockets following the external pins, pin `i` drives socket `i`.
pub const EXT_CONTROLLED: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// Lamp on [`LAMP_SOCKET`] lit while the room is dark.
    AutoLamp,
    /// Phase cut dimming of [`DIMMED_SOCKET`].
    LightDimmer,
    /// The first [`EXT_CONTROLLED`] sockets follow the external pins.
    ExternalControl,
}

impl Behavior {
    pub const ALL: [Behavior; 3] = [
        Behavior::AutoLamp,
        Behavior::LightDimmer,
        Behavior::ExternalControl,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Behavior::AutoLamp => "auto_lamp",
            Behavior::LightDimmer => "light_dimmer",
            Behavior::ExternalControl => "ext_control",
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

/// Enabled flags of the behavior table, all off at boot.
#[derive(Debug, Clone)]
pub struct Behaviors {
    enabled: [bool; Behavior::ALL.len()],
    dimming_delay: u8,
}

impl Default for Behaviors {
    fn default() -> Self {
        Self {
            enabled: [false; Behavior::ALL.len()],
            dimming_delay: DEFAULT_DIMMING_DELAY,
        }
    }
}

impl Behaviors {
    pub fn is_enabled(&self, behavior: Behavior) -> bool {
        self.enabled[behavior.index()]
    }

    pub fn set_enabled(&mut self, behavior: Behavior, on: bool) {
        self.enabled[behavior.index()] = on;
    }

    /// Flips `behavior`, returns the new flag.
    pub fn toggle(&mut self, behavior: Behavior) -> bool {
        let on = !self.is_enabled(behavior);
        self.set_enabled(behavior, on);
        on
    }

    pub fn enabled(&self) -> impl Iterator<Item = Behavior> + '_ {
        Behavior::ALL.into_iter().filter(|b| self.is_enabled(*b))
    }

    /// 0 is full on.
    pub fn dimming_delay(&self) -> u8 {
        self.dimming_delay
    }

    pub fn set_dimming_delay(&mut self, delay: u8) {
        self.dimming_delay = delay;
    }

    /// Wait after a zero crossing before the trigger pulse.
    pub fn dimming_wait_us(&self) -> u16 {
        self.dimming_delay as u16 * DIM_STEP_US
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_starts_disabled() {
        let behaviors = Behaviors::default();
        assert_eq!(behaviors.enabled().count(), 0);
        assert_eq!(behaviors.dimming_wait_us(), 4000);
    }

    #[test]
    fn toggling_enables_in_table_order() {
        let mut behaviors = Behaviors::default();
        assert!(behaviors.toggle(Behavior::ExternalControl));
        assert!(behaviors.toggle(Behavior::AutoLamp));
        let names: std::vec::Vec<&str> = behaviors.enabled().map(|b| b.name()).collect();
        assert_eq!(names, ["auto_lamp", "ext_control"]);
        assert!(!behaviors.toggle(Behavior::AutoLamp));
        assert!(!behaviors.is_enabled(Behavior::AutoLamp));
    }

    #[test]
    fn longest_dimming_wait_fits() {
        let mut behaviors = Behaviors::default();
        behaviors.set_dimming_delay(u8::MAX);
        assert_eq!(behaviors.dimming_wait_us(), 20_400);
    }
}

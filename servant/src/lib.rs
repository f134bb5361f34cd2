#![cfg_attr(not(feature = "std"), no_std)]

//! Firmware of the power strip micro-controller.
//!
//! The [`Device`] owns the board peripherals and runs the main loop: it
//! answers host requests, switches relays, runs the optional behaviors and
//! logs current samples to day files. Current sensing runs in its own context
//! ([`sampling::SamplingEngine`]) and publishes into a shared
//! [`sampling::CurrentSnapshot`].
//!
//! With the `std` feature the [`sim`] module provides boards to run all of
//! this on a PC.

pub mod aggregate;
pub mod behavior;
pub mod device;
pub mod hal;
pub mod link;
pub mod logstore;
pub mod sampling;
pub mod settings;

#[cfg(feature = "std")]
pub mod sim;

pub use device::{Device, DeviceConfig};
pub use hal::{Board, Parts};
pub use sampling::CurrentSnapshot;

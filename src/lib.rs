//!
//! A platform-agnostic driver for the INA231 current/power monitor. Built using embedded-hal.
//!
//! Besides raw register access and fixed-point decoding, the crate provides a
//! sampling session that captures a zero-offset baseline after a warm-up
//! period and streams amplified current deltas as labeled text lines for a
//! live plotting consumer.
//!

#![cfg_attr(not(any(test, feature = "std")), no_std)]

pub mod driver;
pub mod register;
pub mod session;

pub use driver::*;
pub use register::Register;
pub use session::{Baseline, Clock, MonitorSession};

//! # RTM Tester
//!
//! Validation of the digital I/O and timing paths of an AMC carrier rear transition module (RTM).
//! The FPGA registers are reached over SRPv3, the opposite side of the digital I/O through the
//! tester box, and the [`testers`] drive both to produce pass/fail reports.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]

pub mod bus;
pub mod core;
pub mod prelude;
pub mod render;
pub mod rtm;
pub mod testers;
pub mod transport;

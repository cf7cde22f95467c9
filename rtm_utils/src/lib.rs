//! # RTM Utilities
//!
//! This small library contains the register description format used to locate the RTM test
//! registers inside an AMC carrier FPGA.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]

pub mod description;

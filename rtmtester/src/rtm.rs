//! The RTM device: timing mode switching and verified digital I/O on top of the register bus

use crate::{
    bus::{
        self,
        RegisterBus,
    },
    transport::Transport,
};
use std::fmt;
use thiserror::Error;
use tracing::debug;

/// Number of digital output channels
pub const NUM_OUTPUTS: usize = 8;
/// Number of digital input channels
pub const NUM_INPUTS: usize = 32;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Bus(#[from] bus::Error),
    #[error("Invalid {kind} {value} (must be below {limit})")]
    OutOfRange {
        kind: &'static str,
        value: u64,
        limit: u64,
    },
    #[error("Outputs were not set correctly. Set = {written:#04x}, read-back = {readback:#04x}")]
    VerificationFailed { written: u32, readback: u64 },
    #[error("Input word {0:#x} doesn't fit in 32 bits")]
    RangeViolation(u64),
}

fn check_range(kind: &'static str, value: u64, limit: u64) -> Result<(), Error> {
    if value < limit {
        Ok(())
    } else {
        Err(Error::OutOfRange { kind, value, limit })
    }
}

/// The sources the timing crossbar can route into the timing receiver
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TimingSource {
    RtmTimingIn0 = 0,
    FpgaTimingOut = 1,
    BpTimingIn = 2,
    RtmTimingIn1 = 3,
}

/// The timing systems an RTM can receive
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TimingMode {
    Lcls1,
    Lcls2,
}

impl TimingMode {
    /// Every mode, in the order they are tested
    pub const ALL: [TimingMode; 2] = [TimingMode::Lcls1, TimingMode::Lcls2];

    #[must_use]
    pub fn source(self) -> TimingSource {
        match self {
            TimingMode::Lcls1 => TimingSource::RtmTimingIn0,
            TimingMode::Lcls2 => TimingSource::RtmTimingIn1,
        }
    }

    #[must_use]
    pub fn clock_select(self) -> u64 {
        match self {
            TimingMode::Lcls1 => 0,
            TimingMode::Lcls2 => 1,
        }
    }
}

impl fmt::Display for TimingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimingMode::Lcls1 => write!(f, "LCLS1"),
            TimingMode::Lcls2 => write!(f, "LCLS2"),
        }
    }
}

/// Devices with a switchable timing receiver
pub trait TimingLink {
    /// Route the timing source of `mode` into the receiver, then select its clock
    /// # Errors
    /// Returns an error on bus faults
    fn set_timing_mode(&mut self, mode: TimingMode) -> Result<(), Error>;

    /// Whether the timing receiver is currently locked
    /// # Errors
    /// Returns an error on bus faults
    fn check_timing_link(&mut self) -> Result<bool, Error>;
}

/// The 32 input levels, most significant (channel 31) first
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct InputBits([bool; NUM_INPUTS]);

impl InputBits {
    #[must_use]
    pub fn from_word(word: u32) -> Self {
        Self(std::array::from_fn(|i| {
            word & (1 << (NUM_INPUTS - 1 - i)) != 0
        }))
    }

    /// Reassemble the input word
    #[must_use]
    pub fn to_word(&self) -> u32 {
        self.0
            .iter()
            .fold(0, |word, &bit| (word << 1) | u32::from(bit))
    }

    /// The level of input `channel`, or `None` past the last channel
    #[must_use]
    pub fn channel(&self, channel: usize) -> Option<bool> {
        (channel < NUM_INPUTS).then(|| self.0[NUM_INPUTS - 1 - channel])
    }

    /// Input levels in channel order, channel 0 first
    pub fn channels(&self) -> impl Iterator<Item = bool> + '_ {
        self.0.iter().rev().copied()
    }

    /// The levels, most significant first
    #[must_use]
    pub fn as_msb_first(&self) -> &[bool; NUM_INPUTS] {
        &self.0
    }
}

/// Devices with 8 verified digital outputs and 32 digital inputs
pub trait DigitalIo {
    /// The output word currently driven
    /// # Errors
    /// Returns an error on bus faults
    fn output_word(&mut self) -> Result<u64, Error>;

    /// Drive the outputs to `word` and confirm it on the independent read-back
    /// # Errors
    /// Returns [`Error::OutOfRange`] if `word` is wider than the outputs and
    /// [`Error::VerificationFailed`] if the read-back differs, besides bus faults
    fn set_output_word(&mut self, word: u32) -> Result<(), Error>;

    /// The word observed on the inputs
    /// # Errors
    /// Returns [`Error::RangeViolation`] if the register holds more than 32 bits, besides bus
    /// faults
    fn input_word(&mut self) -> Result<u32, Error>;

    /// Set or clear a single output, leaving the others as they are
    /// # Errors
    /// Returns [`Error::OutOfRange`] for channels past the last output, besides the errors of
    /// [`DigitalIo::set_output_word`]
    fn set_output_channel(&mut self, channel: usize, value: bool) -> Result<(), Error> {
        check_range("output channel", channel as u64, NUM_OUTPUTS as u64)?;
        let current = self.output_word()?;
        let mask = 1u64 << channel;
        let next = if value {
            current | mask
        } else {
            current & !mask
        };
        let word = u32::try_from(next).map_err(|_| Error::OutOfRange {
            kind: "output word",
            value: next,
            limit: 1 << NUM_OUTPUTS,
        })?;
        self.set_output_word(word)
    }

    /// The level of a single input
    /// # Errors
    /// Returns [`Error::OutOfRange`] for channels past the last input, besides the errors of
    /// [`DigitalIo::input_word`]
    fn input_channel(&mut self, channel: usize) -> Result<bool, Error> {
        check_range("input channel", channel as u64, NUM_INPUTS as u64)?;
        Ok(self.input_word()? & (1 << channel) != 0)
    }

    /// Every input level, most significant first
    /// # Errors
    /// Returns the errors of [`DigitalIo::input_word`]
    fn input_bits(&mut self) -> Result<InputBits, Error> {
        Ok(InputBits::from_word(self.input_word()?))
    }
}

/// An RTM reachable through transport `T`
#[derive(Debug)]
pub struct Rtm<T> {
    bus: RegisterBus<T>,
}

impl<T> Rtm<T>
where
    T: Transport,
{
    /// Resolve the RTM registers through `transport`
    /// # Errors
    /// Returns an error if any register fails to resolve
    pub fn new(transport: T) -> Result<Self, Error> {
        Ok(Self {
            bus: RegisterBus::new(transport)?,
        })
    }

    #[must_use]
    pub fn bus(&self) -> &RegisterBus<T> {
        &self.bus
    }
}

impl<T> TimingLink for Rtm<T>
where
    T: Transport,
{
    fn set_timing_mode(&mut self, mode: TimingMode) -> Result<(), Error> {
        debug!(%mode, source = ?mode.source(), "Switching timing mode");
        // The crossbar has to be routed before the receiver switches clocks
        self.bus.output_config.write(mode.source() as u64)?;
        self.bus.clock_select.write(mode.clock_select())?;
        Ok(())
    }

    fn check_timing_link(&mut self) -> Result<bool, Error> {
        Ok(self.bus.link_up.read()? != 0)
    }
}

impl<T> DigitalIo for Rtm<T>
where
    T: Transport,
{
    fn output_word(&mut self) -> Result<u64, Error> {
        Ok(self.bus.output_bits.read()?)
    }

    fn set_output_word(&mut self, word: u32) -> Result<(), Error> {
        check_range("output word", word.into(), 1 << NUM_OUTPUTS)?;
        self.bus.output_bits.write(word.into())?;
        let readback = self.bus.output_readback.read()?;
        debug!(word, readback, "Set output word");
        if readback == u64::from(word) {
            Ok(())
        } else {
            Err(Error::VerificationFailed {
                written: word,
                readback,
            })
        }
    }

    fn input_word(&mut self) -> Result<u32, Error> {
        let word = self.bus.inputs.read()?;
        u32::try_from(word).map_err(|_| Error::RangeViolation(word))
    }
}

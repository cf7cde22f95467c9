//! The interactive manual I/O test
//!
//! The operator toggles outputs from the keyboard and wiggles inputs by hand while the tester
//! tracks which channels have been seen to change. Rendering and key handling live behind
//! [`Console`] so the loop runs the same against a terminal or a script.

use super::Error;
use crate::rtm::{
    DigitalIo,
    InputBits,
    NUM_INPUTS,
    NUM_OUTPUTS,
};
use std::{
    io,
    time::Duration,
};
use tracing::debug;

/// How long to wait for a key before sampling the inputs again
pub const DEFAULT_POLL: Duration = Duration::from_secs(1);

/// What the operator did while the console was waiting
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Event {
    /// Flip an output channel
    Toggle(usize),
    /// Nothing, or nothing that matters
    Tick,
    /// Leave the test
    Quit,
}

/// The last known level of a channel and whether it has been exercised yet
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct ChannelState {
    pub level: bool,
    pub tested: bool,
}

/// Everything the console shows, indexed by channel number
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Snapshot {
    pub outputs: [ChannelState; NUM_OUTPUTS],
    pub inputs: [ChannelState; NUM_INPUTS],
}

impl Snapshot {
    /// Record the input levels, marking every channel that changed as tested
    fn sample(&mut self, bits: &InputBits) {
        for (channel, (state, level)) in self.inputs.iter_mut().zip(bits.channels()).enumerate() {
            if state.level != level {
                debug!(channel, level, "Input changed");
                state.level = level;
                state.tested = true;
            }
        }
    }
}

/// The interactive surface of the manual test
pub trait Console {
    /// Show `snapshot`
    /// # Errors
    /// Returns an error if the console can't be written
    fn render(&mut self, snapshot: &Snapshot) -> io::Result<()>;

    /// Wait up to `timeout` for the operator, returning [`Event::Tick`] if nothing happened
    /// # Errors
    /// Returns an error if the console can't be read
    fn next_event(&mut self, timeout: Duration) -> io::Result<Event>;
}

/// Which channels were exercised during a manual test
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManualReport {
    pub outputs: [bool; NUM_OUTPUTS],
    pub inputs: [bool; NUM_INPUTS],
}

impl ManualReport {
    /// Channels that were never exercised, in both directions
    #[must_use]
    pub fn untested(&self) -> usize {
        self.outputs
            .iter()
            .chain(self.inputs.iter())
            .filter(|&&tested| !tested)
            .count()
    }
}

impl From<&Snapshot> for ManualReport {
    fn from(snapshot: &Snapshot) -> Self {
        Self {
            outputs: snapshot.outputs.map(|s| s.tested),
            inputs: snapshot.inputs.map(|s| s.tested),
        }
    }
}

#[derive(Debug)]
pub struct ManualIoTester<'a, R, C> {
    rtm: &'a mut R,
    console: C,
    poll: Duration,
    state: Snapshot,
}

impl<'a, R, C> ManualIoTester<'a, R, C>
where
    R: DigitalIo,
    C: Console,
{
    pub fn new(rtm: &'a mut R, console: C) -> Self {
        Self {
            rtm,
            console,
            poll: DEFAULT_POLL,
            state: Snapshot::default(),
        }
    }

    #[must_use]
    pub fn with_poll(mut self, poll: Duration) -> Self {
        self.poll = poll;
        self
    }

    /// Run the interactive loop until the operator quits. The outputs are cleared before the loop
    /// and again after it, however it ended. Nothing is logged above debug level while the console
    /// is in use.
    /// # Errors
    /// Returns an error on bus faults, failed output verification or console failures
    pub fn run(mut self) -> Result<ManualReport, Error> {
        self.rtm.set_output_word(0)?;
        // The first sample is the baseline, not a transition
        let bits = self.rtm.input_bits()?;
        for (state, level) in self.state.inputs.iter_mut().zip(bits.channels()) {
            state.level = level;
        }
        let outcome = self.interact();
        let cleared = self.rtm.set_output_word(0);
        outcome?;
        cleared?;
        Ok(ManualReport::from(&self.state))
    }

    fn interact(&mut self) -> Result<(), Error> {
        loop {
            self.console.render(&self.state)?;
            match self.console.next_event(self.poll)? {
                Event::Quit => return Ok(()),
                Event::Toggle(channel) if channel < NUM_OUTPUTS => self.toggle(channel)?,
                Event::Toggle(_) | Event::Tick => {}
            }
            let bits = self.rtm.input_bits()?;
            self.state.sample(&bits);
        }
    }

    fn toggle(&mut self, channel: usize) -> Result<(), Error> {
        let level = !self.state.outputs[channel].level;
        debug!(channel, level, "Toggling output");
        self.rtm.set_output_channel(channel, level)?;
        self.state.outputs[channel] = ChannelState {
            level,
            tested: true,
        };
        Ok(())
    }
}

//! The test orchestrators, along with the verdicts and reports they produce

pub mod automatic;
pub mod manual;
pub mod timing;

use crate::rtm;
use std::{
    fmt,
    io::{
        Read,
        Write,
    },
};
use testerbox::Tester;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Rtm(#[from] rtm::Error),
    #[error("Tester box error")]
    Tester(#[from] testerbox::Error),
    #[error("Console IO error")]
    Console(#[from] std::io::Error),
}

/// The outcome of a single check
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Verdict {
    Passed,
    Failed,
    #[default]
    NotRun,
}

impl Verdict {
    #[must_use]
    pub fn from_check(passed: bool) -> Self {
        if passed {
            Verdict::Passed
        } else {
            Verdict::Failed
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Passed => write!(f, "PASSED"),
            Verdict::Failed => write!(f, "FAILED"),
            Verdict::NotRun => write!(f, "NOT RUN"),
        }
    }
}

/// Verdicts for `N` channels, indexed by channel number, with a log line for every failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelResults<const N: usize> {
    verdicts: [Verdict; N],
    log: Vec<String>,
}

impl<const N: usize> Default for ChannelResults<N> {
    fn default() -> Self {
        Self {
            verdicts: [Verdict::NotRun; N],
            log: vec![],
        }
    }
}

impl<const N: usize> ChannelResults<N> {
    pub fn pass(&mut self, channel: usize) {
        self.verdicts[channel] = Verdict::Passed;
    }

    pub fn fail(&mut self, channel: usize, message: String) {
        self.verdicts[channel] = Verdict::Failed;
        self.log.push(message);
    }

    #[must_use]
    pub fn verdicts(&self) -> &[Verdict; N] {
        &self.verdicts
    }

    #[must_use]
    pub fn failures(&self) -> usize {
        self.verdicts
            .iter()
            .filter(|&&v| v == Verdict::Failed)
            .count()
    }

    #[must_use]
    pub fn log(&self) -> &[String] {
        &self.log
    }
}

/// The tester box operations the automatic test needs
pub trait TesterIo {
    /// Drive the tester box outputs (and so the RTM inputs) to `value`
    /// # Errors
    /// Returns an error on a failed exchange
    fn write_outputs(&mut self, value: u32) -> Result<(), testerbox::Error>;

    /// Read the word the tester box observes on the RTM outputs
    /// # Errors
    /// Returns an error on a failed exchange
    fn read_inputs(&mut self) -> Result<u32, testerbox::Error>;

    /// Read the tester box firmware information
    /// # Errors
    /// Returns an error on a failed exchange
    fn read_info(&mut self) -> Result<String, testerbox::Error>;
}

impl<S> TesterIo for Tester<S>
where
    S: Read + Write,
{
    fn write_outputs(&mut self, value: u32) -> Result<(), testerbox::Error> {
        Tester::write_outputs(self, value)
    }

    fn read_inputs(&mut self) -> Result<u32, testerbox::Error> {
        Tester::read_inputs(self)
    }

    fn read_info(&mut self) -> Result<String, testerbox::Error> {
        Tester::read_info(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_results() {
        let mut results = ChannelResults::<4>::default();
        results.pass(0);
        results.fail(2, "Channel 2 is stuck".into());
        assert_eq!(
            results.verdicts(),
            &[
                Verdict::Passed,
                Verdict::NotRun,
                Verdict::Failed,
                Verdict::NotRun
            ]
        );
        assert_eq!(results.failures(), 1);
        assert_eq!(results.log(), ["Channel 2 is stuck"]);
    }

    #[test]
    fn test_verdict_display() {
        assert_eq!(Verdict::from_check(true).to_string(), "PASSED");
        assert_eq!(Verdict::from_check(false).to_string(), "FAILED");
        assert_eq!(Verdict::default().to_string(), "NOT RUN");
    }
}

//! Closed-loop one-hot sweeps of the digital I/O against the tester box
//!
//! Each direction is swept independently: the tester box drives the RTM inputs one channel at a
//! time, then the RTM drives its outputs one channel at a time while the tester box observes them.
//! A fault in one iteration fails that channel and the sweep moves on to the next.

use super::{
    ChannelResults,
    Error,
    TesterIo,
};
use crate::rtm::DigitalIo;
use tracing::{
    error,
    info,
    warn,
};

/// Number of channels swept in each direction
pub const SWEEP_CHANNELS: usize = 8;

/// Everything an automatic run found out
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AutomaticReport {
    /// Firmware information of the tester box, if it could be read
    pub info: Option<String>,
    /// RTM input path, driven by the tester box
    pub inputs: ChannelResults<SWEEP_CHANNELS>,
    /// RTM output path, observed by the tester box
    pub outputs: ChannelResults<SWEEP_CHANNELS>,
}

impl AutomaticReport {
    /// Failures across both directions
    #[must_use]
    pub fn failures(&self) -> usize {
        self.inputs.failures() + self.outputs.failures()
    }
}

#[derive(Debug)]
pub struct AutomaticIoTester<'a, R, B> {
    rtm: &'a mut R,
    tester: B,
}

impl<'a, R, B> AutomaticIoTester<'a, R, B>
where
    R: DigitalIo,
    B: TesterIo,
{
    pub fn new(rtm: &'a mut R, tester: B) -> Self {
        Self { rtm, tester }
    }

    /// Give back the tester box connection
    pub fn into_tester(self) -> B {
        self.tester
    }

    /// Sweep both directions. Individual failures end up in the report rather than as errors.
    pub fn run(&mut self) -> AutomaticReport {
        let info = match self.tester.read_info() {
            Ok(info) => {
                info!(info = info.as_str(), "Tester box firmware");
                Some(info)
            }
            Err(e) => {
                warn!(error = %e, "Couldn't read the tester box information");
                None
            }
        };
        let inputs = self.sweep_inputs();
        let outputs = self.sweep_outputs();
        self.clear();
        AutomaticReport {
            info,
            inputs,
            outputs,
        }
    }

    fn sweep_inputs(&mut self) -> ChannelResults<SWEEP_CHANNELS> {
        info!("Sweeping RTM inputs");
        let mut results = ChannelResults::default();
        for channel in 0..SWEEP_CHANNELS {
            let set_val = 1u32 << channel;
            match self.check_input(set_val) {
                Ok(get_val) if get_val == set_val => results.pass(channel),
                Ok(get_val) => {
                    error!(channel, set_val, get_val, "Input channel mismatch");
                    results.fail(
                        channel,
                        format!(
                            "Error in input channel {channel}. Set value was: {set_val}, but read \
                             back value was {get_val}."
                        ),
                    );
                }
                Err(e) => {
                    error!(channel, error = %e, "Input channel check failed");
                    results.fail(
                        channel,
                        format!("Error in input channel {channel}. Set value was: {set_val}: {e}"),
                    );
                }
            }
        }
        results
    }

    fn sweep_outputs(&mut self) -> ChannelResults<SWEEP_CHANNELS> {
        info!("Sweeping RTM outputs");
        let mut results = ChannelResults::default();
        for channel in 0..SWEEP_CHANNELS {
            let set_val = 1u32 << channel;
            match self.check_output(set_val) {
                Ok(get_val) if get_val == set_val => results.pass(channel),
                Ok(get_val) => {
                    error!(channel, set_val, get_val, "Output channel mismatch");
                    results.fail(
                        channel,
                        format!(
                            "Error in output channel {channel}. Set value was: {set_val}, but \
                             read back value was {get_val}."
                        ),
                    );
                }
                Err(e) => {
                    error!(channel, error = %e, "Output channel check failed");
                    results.fail(
                        channel,
                        format!(
                            "Error in output channel {channel}. Set value was: {set_val}: {e}"
                        ),
                    );
                }
            }
        }
        results
    }

    fn check_input(&mut self, set_val: u32) -> Result<u32, Error> {
        self.tester.write_outputs(set_val)?;
        Ok(self.rtm.input_word()?)
    }

    fn check_output(&mut self, set_val: u32) -> Result<u32, Error> {
        self.rtm.set_output_word(set_val)?;
        Ok(self.tester.read_inputs()?)
    }

    /// Leave both sides driving zero
    fn clear(&mut self) {
        if let Err(e) = self.tester.write_outputs(0) {
            warn!(error = %e, "Couldn't clear the tester box outputs");
        }
        if let Err(e) = self.rtm.set_output_word(0) {
            warn!(error = %e, "Couldn't clear the RTM outputs");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        rtm,
        testers::Verdict,
    };
    use std::{
        cell::RefCell,
        rc::Rc,
    };

    /// The wiring between the RTM and the tester box
    #[derive(Debug, Default)]
    struct Wires {
        /// Driven by the tester box
        to_rtm: u32,
        /// Driven by the RTM
        to_tester: u32,
    }

    /// An RTM that loses input channel `broken_input` and fails to verify `failing_output`
    #[derive(Debug)]
    struct FakeRtm {
        wires: Rc<RefCell<Wires>>,
        broken_input: Option<usize>,
        failing_output: Option<u32>,
    }

    impl DigitalIo for FakeRtm {
        fn output_word(&mut self) -> Result<u64, rtm::Error> {
            Ok(self.wires.borrow().to_tester.into())
        }

        fn set_output_word(&mut self, word: u32) -> Result<(), rtm::Error> {
            if self.failing_output == Some(word) {
                return Err(rtm::Error::VerificationFailed {
                    written: word,
                    readback: 0,
                });
            }
            self.wires.borrow_mut().to_tester = word;
            Ok(())
        }

        fn input_word(&mut self) -> Result<u32, rtm::Error> {
            let word = self.wires.borrow().to_rtm;
            Ok(match self.broken_input {
                Some(channel) => word & !(1 << channel),
                None => word,
            })
        }
    }

    #[derive(Debug)]
    struct FakeTester {
        wires: Rc<RefCell<Wires>>,
        info: Option<String>,
        /// Write values that fail the exchange
        failing_writes: Vec<u32>,
        /// Input channel of the tester box that never sees a level
        broken_input: Option<usize>,
    }

    impl TesterIo for FakeTester {
        fn write_outputs(&mut self, value: u32) -> Result<(), testerbox::Error> {
            if self.failing_writes.contains(&value) {
                return Err(testerbox::Error::CommandFailed {
                    command: format!("={value}"),
                    status: Some('1'),
                });
            }
            self.wires.borrow_mut().to_rtm = value;
            Ok(())
        }

        fn read_inputs(&mut self) -> Result<u32, testerbox::Error> {
            let word = self.wires.borrow().to_tester;
            Ok(match self.broken_input {
                Some(channel) => word & !(1 << channel),
                None => word,
            })
        }

        fn read_info(&mut self) -> Result<String, testerbox::Error> {
            self.info
                .clone()
                .ok_or(testerbox::Error::ConnectionBroken)
        }
    }

    fn rig(broken_input: Option<usize>, failing_writes: Vec<u32>) -> (FakeRtm, FakeTester) {
        let wires = Rc::new(RefCell::new(Wires::default()));
        (
            FakeRtm {
                wires: wires.clone(),
                broken_input,
                failing_output: None,
            },
            FakeTester {
                wires,
                info: Some("tester v1".into()),
                failing_writes,
                broken_input: None,
            },
        )
    }

    #[test]
    fn test_all_pass() {
        let (mut rtm, tester) = rig(None, vec![]);
        let report = AutomaticIoTester::new(&mut rtm, tester).run();
        assert_eq!(report.info.as_deref(), Some("tester v1"));
        assert_eq!(report.failures(), 0);
        assert!(report.inputs.verdicts().iter().all(|&v| v == Verdict::Passed));
        assert!(report.outputs.verdicts().iter().all(|&v| v == Verdict::Passed));
        // Both sides are left cleared
        let wires = rtm.wires.borrow();
        assert_eq!((wires.to_rtm, wires.to_tester), (0, 0));
    }

    #[test]
    fn test_broken_input_channel() {
        let (mut rtm, tester) = rig(Some(3), vec![]);
        let report = AutomaticIoTester::new(&mut rtm, tester).run();
        assert_eq!(report.inputs.failures(), 1);
        for (channel, verdict) in report.inputs.verdicts().iter().enumerate() {
            let expected = if channel == 3 {
                Verdict::Failed
            } else {
                Verdict::Passed
            };
            assert_eq!(*verdict, expected);
        }
        assert_eq!(
            report.inputs.log(),
            ["Error in input channel 3. Set value was: 8, but read back value was 0."]
        );
        assert_eq!(report.outputs.failures(), 0);
    }

    #[test]
    fn test_faults_dont_stop_the_sweep() {
        let (mut rtm, tester) = rig(None, vec![1 << 5]);
        let report = AutomaticIoTester::new(&mut rtm, tester).run();
        assert_eq!(report.inputs.verdicts()[5], Verdict::Failed);
        assert_eq!(report.inputs.verdicts()[6], Verdict::Passed);
        assert_eq!(report.inputs.verdicts()[7], Verdict::Passed);
        assert_eq!(report.failures(), 1);
        assert!(report.inputs.log()[0].starts_with("Error in input channel 5"));
    }

    #[test]
    fn test_output_failures_dont_stop_the_sweep() {
        let (mut rtm, mut tester) = rig(None, vec![]);
        rtm.failing_output = Some(1 << 2);
        tester.broken_input = Some(5);
        let report = AutomaticIoTester::new(&mut rtm, tester).run();
        assert_eq!(
            report.outputs.verdicts(),
            &[
                Verdict::Passed,
                Verdict::Passed,
                Verdict::Failed,
                Verdict::Passed,
                Verdict::Passed,
                Verdict::Failed,
                Verdict::Passed,
                Verdict::Passed,
            ]
        );
        assert_eq!(report.outputs.failures(), 2);
        assert_eq!(report.inputs.failures(), 0);
        assert_eq!(report.failures(), 2);
        let log = report.outputs.log();
        assert_eq!(log.len(), 2);
        assert!(log[0].starts_with("Error in output channel 2. Set value was: 4: "));
        assert_eq!(
            log[1],
            "Error in output channel 5. Set value was: 32, but read back value was 0."
        );
    }

    #[test]
    fn test_missing_info() {
        let (mut rtm, mut tester) = rig(None, vec![]);
        tester.info = None;
        let mut automatic = AutomaticIoTester::new(&mut rtm, tester);
        let report = automatic.run();
        assert_eq!(report.info, None);
        assert_eq!(report.failures(), 0);
        assert!(automatic.into_tester().info.is_none());
    }
}

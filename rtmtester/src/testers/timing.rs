//! Checks that the timing receiver locks in every timing mode

use super::{
    Error,
    Verdict,
};
use crate::rtm::{
    TimingLink,
    TimingMode,
};
use std::time::Duration;
use tracing::info;

/// How long the link gets to lock after switching modes
pub const DEFAULT_SETTLE: Duration = Duration::from_secs(1);

/// The verdict of each timing mode
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct TimingReport {
    pub lcls1: Verdict,
    pub lcls2: Verdict,
}

impl TimingReport {
    #[must_use]
    pub fn verdict(&self, mode: TimingMode) -> Verdict {
        match mode {
            TimingMode::Lcls1 => self.lcls1,
            TimingMode::Lcls2 => self.lcls2,
        }
    }

    fn record(&mut self, mode: TimingMode, verdict: Verdict) {
        match mode {
            TimingMode::Lcls1 => self.lcls1 = verdict,
            TimingMode::Lcls2 => self.lcls2 = verdict,
        }
    }
}

/// Switches through [`TimingMode::ALL`] once, checking the link after each switch
#[derive(Debug)]
pub struct TimingTester<'a, R> {
    rtm: &'a mut R,
    settle: Duration,
}

impl<'a, R> TimingTester<'a, R>
where
    R: TimingLink,
{
    pub fn new(rtm: &'a mut R) -> Self {
        Self {
            rtm,
            settle: DEFAULT_SETTLE,
        }
    }

    #[must_use]
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Run both mode checks. A link that doesn't come up is a failed verdict, not an error.
    /// # Errors
    /// Returns an error on bus faults
    pub fn run(self) -> Result<TimingReport, Error> {
        let mut report = TimingReport::default();
        for mode in TimingMode::ALL {
            info!(%mode, "Testing timing mode");
            self.rtm.set_timing_mode(mode)?;
            std::thread::sleep(self.settle);
            let verdict = Verdict::from_check(self.rtm.check_timing_link()?);
            info!(%mode, %verdict, "Timing link checked");
            report.record(mode, verdict);
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtm;

    /// Only ever locks to LCLS-II timing
    #[derive(Debug, Default)]
    struct Lcls2Only {
        mode: Option<TimingMode>,
        switches: Vec<TimingMode>,
    }

    impl TimingLink for Lcls2Only {
        fn set_timing_mode(&mut self, mode: TimingMode) -> Result<(), rtm::Error> {
            self.mode = Some(mode);
            self.switches.push(mode);
            Ok(())
        }

        fn check_timing_link(&mut self) -> Result<bool, rtm::Error> {
            Ok(self.mode == Some(TimingMode::Lcls2))
        }
    }

    #[test]
    fn test_lcls2_only() {
        let mut rtm = Lcls2Only::default();
        let report = TimingTester::new(&mut rtm)
            .with_settle(Duration::ZERO)
            .run()
            .unwrap();
        assert_eq!(report.verdict(TimingMode::Lcls1), Verdict::Failed);
        assert_eq!(report.verdict(TimingMode::Lcls2), Verdict::Passed);
        assert_eq!(rtm.switches, [TimingMode::Lcls1, TimingMode::Lcls2]);
    }

    #[test]
    fn test_bus_fault_propagates() {
        struct Broken;
        impl TimingLink for Broken {
            fn set_timing_mode(&mut self, _mode: TimingMode) -> Result<(), rtm::Error> {
                Err(rtm::Error::Bus(crate::bus::Error::Disconnected))
            }

            fn check_timing_link(&mut self) -> Result<bool, rtm::Error> {
                Ok(true)
            }
        }
        let res = TimingTester::new(&mut Broken)
            .with_settle(Duration::ZERO)
            .run();
        assert!(matches!(res, Err(Error::Rtm(rtm::Error::Bus(_)))));
    }
}

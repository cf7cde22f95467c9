//! Prelude (helpful reexports) for this package

pub use crate::{
    rtm::{
        DigitalIo,
        Rtm,
        TimingLink,
        TimingMode,
    },
    testers::{
        automatic::AutomaticIoTester,
        manual::ManualIoTester,
        timing::TimingTester,
        TesterIo,
    },
    transport::{
        srp::{
            self,
            Srp,
        },
        Transport,
    },
};
pub use rtm_utils::description::{
    load_description,
    IpAddrFixup,
};

//! `rtm-tester` - timing and digital I/O tests of an AMC carrier RTM
//!
//! ```text
//! rtm-tester --yaml <desc> --addr <fpga-ip> --tester-addr <ip> --tester-port <port>
//! rtm-tester --yaml <desc> --addr <fpga-ip> --manual
//! ```

use anyhow::{
    Context,
    Result,
};
use clap::Parser;
use rtm_utils::description::Fixup;
use rtmtester::{
    prelude::*,
    render::{
        self,
        Terminal,
    },
};
use std::{
    net::Ipv4Addr,
    path::PathBuf,
    time::Duration,
};
use testerbox::Tester;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "rtm-tester",
    about = "Timing and digital I/O tests of an AMC carrier RTM",
    version
)]
struct Cli {
    /// Register description file of the FPGA design
    #[arg(short, long)]
    yaml: PathBuf,
    /// FPGA IP address
    #[arg(short, long)]
    addr: Ipv4Addr,
    /// Root device name
    #[arg(short, long, default_value = "NetIODev")]
    root: String,
    /// Tester box IP address
    #[arg(long, required_unless_present = "manual")]
    tester_addr: Option<Ipv4Addr>,
    /// Tester box TCP port
    #[arg(long, required_unless_present = "manual")]
    tester_port: Option<u16>,
    /// Run the interactive manual I/O test instead of the automatic one
    #[arg(short, long)]
    manual: bool,
    /// Time the timing link gets to lock after a mode switch, in milliseconds
    #[arg(long, default_value_t = 1000)]
    settle_ms: u64,
    /// How often the manual test samples the inputs, in milliseconds
    #[arg(long, default_value_t = 1000)]
    poll_ms: u64,
    /// How many times a register request is resent before the bus is declared dead
    #[arg(long, default_value_t = srp::DEFAULT_RETRIES)]
    srp_retries: usize,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut out = std::io::stdout();

    let fixup: &dyn Fixup = &IpAddrFixup::new(cli.addr);
    let desc = load_description(&cli.yaml, &cli.root, Some(fixup))
        .with_context(|| format!("Failed to load {}", cli.yaml.display()))?;
    info!(addr = %cli.addr, root = cli.root.as_str(), "Connecting to the FPGA");
    let mut transport = Srp::from_description(&desc)?;
    transport.set_retries(cli.srp_retries);
    let mut rtm = Rtm::new(transport)?;

    render::print_banner(&mut out, "Start of Timing Tests")?;
    let timing = TimingTester::new(&mut rtm)
        .with_settle(Duration::from_millis(cli.settle_ms))
        .run()?;
    render::print_timing_report(&mut out, &timing)?;

    if cli.manual {
        render::print_banner(&mut out, "Start of Manual I/O Tests")?;
        info!("Starting manual I/O test");
        // The terminal is restored once the tester, which owns it, is done
        let report = ManualIoTester::new(&mut rtm, Terminal::new()?)
            .with_poll(Duration::from_millis(cli.poll_ms))
            .run()?;
        info!("Manual I/O test finished");
        render::print_manual_report(&mut out, &report)?;
    } else {
        let (Some(ip), Some(port)) = (cli.tester_addr, cli.tester_port) else {
            anyhow::bail!("The automatic test needs --tester-addr and --tester-port");
        };
        render::print_banner(&mut out, "Start of Automatic I/O Tests")?;
        let tester = Tester::connect((ip, port))
            .with_context(|| format!("Failed to connect to the tester box at {ip}:{port}"))?;
        let report = AutomaticIoTester::new(&mut rtm, tester).run();
        render::print_automatic_report(&mut out, &report)?;
    }

    info!("Done!");
    Ok(())
}

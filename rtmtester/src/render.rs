//! Terminal output: the interactive console of the manual test and the colored test reports

use crate::{
    rtm::TimingMode,
    testers::{
        automatic::AutomaticReport,
        manual::{
            ChannelState,
            Console,
            Event,
            ManualReport,
            Snapshot,
        },
        timing::TimingReport,
        ChannelResults,
        Verdict,
    },
};
use crossterm::{
    cursor::{
        Hide,
        MoveTo,
        MoveToNextLine,
        Show,
    },
    event::{
        self,
        Event as TermEvent,
        KeyCode,
        KeyEvent,
        KeyEventKind,
        KeyModifiers,
    },
    execute,
    queue,
    style::{
        Print,
        PrintStyledContent,
        StyledContent,
        Stylize,
    },
    terminal::{
        self,
        Clear,
        ClearType,
        EnterAlternateScreen,
        LeaveAlternateScreen,
    },
};
use std::{
    io::{
        self,
        Stdout,
        Write,
    },
    time::Duration,
};

const BANNER: &str = "##############################################";
const RULE: &str = "---------------------";
/// Input channels shown per row of the console
const INPUTS_PER_ROW: usize = 16;

fn styled_verdict(verdict: Verdict) -> StyledContent<String> {
    let text = verdict.to_string();
    match verdict {
        Verdict::Passed => text.green(),
        Verdict::Failed => text.red(),
        Verdict::NotRun => text.yellow(),
    }
}

fn styled_tested(tested: bool) -> StyledContent<&'static str> {
    if tested {
        "TESTED".green()
    } else {
        "NOT TESTED".red()
    }
}

/// Print a section header
/// # Errors
/// Returns an error if `out` can't be written
pub fn print_banner<W>(out: &mut W, title: &str) -> io::Result<()>
where
    W: Write,
{
    writeln!(out, "{BANNER}")?;
    writeln!(out, "{title}")?;
    writeln!(out, "{BANNER}")
}

/// # Errors
/// Returns an error if `out` can't be written
pub fn print_timing_report<W>(out: &mut W, report: &TimingReport) -> io::Result<()>
where
    W: Write,
{
    for mode in TimingMode::ALL {
        writeln!(
            out,
            "{mode} timing link: {}",
            styled_verdict(report.verdict(mode))
        )?;
    }
    Ok(())
}

fn print_channel_results<W, const N: usize>(
    out: &mut W,
    direction: &str,
    fails_label: &str,
    results: &ChannelResults<N>,
) -> io::Result<()>
where
    W: Write,
{
    writeln!(out, "RTM {direction} test results:")?;
    writeln!(out, "{RULE}")?;
    writeln!(out, "Channel | Test result")?;
    writeln!(out, "{RULE}")?;
    for (channel, verdict) in results.verdicts().iter().enumerate() {
        writeln!(out, "  {channel:>2}    | {}", styled_verdict(*verdict))?;
    }
    writeln!(out, "{RULE}")?;
    for line in results.log() {
        writeln!(out, "{}", line.as_str().red())?;
    }
    writeln!(out, "Number of {fails_label} Fails: {}", results.failures())?;
    writeln!(out)
}

/// # Errors
/// Returns an error if `out` can't be written
pub fn print_automatic_report<W>(out: &mut W, report: &AutomaticReport) -> io::Result<()>
where
    W: Write,
{
    match &report.info {
        Some(info) => writeln!(out, "Tester box: {info}")?,
        None => writeln!(out, "Tester box: {}", "unknown".yellow())?,
    }
    writeln!(out)?;
    print_channel_results(out, "input", "Input Channel", &report.inputs)?;
    print_channel_results(out, "output", "Output Channels", &report.outputs)?;
    let total = report.failures();
    if total == 0 {
        writeln!(out, "{}", "All channels PASSED".green())
    } else {
        writeln!(out, "{}", format!("Total number of Fails = {total}").red())
    }
}

/// # Errors
/// Returns an error if `out` can't be written
pub fn print_manual_report<W>(out: &mut W, report: &ManualReport) -> io::Result<()>
where
    W: Write,
{
    for (direction, tested) in [
        ("output", &report.outputs[..]),
        ("input", &report.inputs[..]),
    ] {
        writeln!(out, "RTM {direction} channels:")?;
        writeln!(out, "{RULE}")?;
        writeln!(out, "Channel | Status")?;
        writeln!(out, "{RULE}")?;
        for (channel, &tested) in tested.iter().enumerate() {
            writeln!(out, "  {channel:>2}    | {}", styled_tested(tested))?;
        }
        writeln!(out, "{RULE}")?;
        writeln!(out)?;
    }
    writeln!(out, "Untested channels = {}", report.untested())
}

fn key_event(code: KeyCode, modifiers: KeyModifiers) -> Event {
    match code {
        KeyCode::Char(c @ '0'..='7') => c
            .to_digit(10)
            .map_or(Event::Tick, |d| Event::Toggle(d as usize)),
        KeyCode::Esc => Event::Quit,
        KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => Event::Quit,
        _ => Event::Tick,
    }
}

/// The manual test console on the controlling terminal. The terminal is put in raw mode on an
/// alternate screen for as long as this lives.
#[derive(Debug)]
pub struct Terminal {
    out: Stdout,
}

impl Terminal {
    /// # Errors
    /// Returns an error if the terminal can't be switched to raw mode
    pub fn new() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        // From here on dropping restores the terminal
        let mut term = Self { out: io::stdout() };
        execute!(term.out, EnterAlternateScreen, Hide)?;
        Ok(term)
    }

    fn channel_row(
        &mut self,
        label: &str,
        first: usize,
        states: &[ChannelState],
    ) -> io::Result<()> {
        queue!(self.out, Print(format!("{label:<10}")))?;
        for channel in first..first + states.len() {
            queue!(self.out, Print(format!("{channel:>3}")))?;
        }
        queue!(self.out, MoveToNextLine(1), Print(format!("{:<10}", "")))?;
        for state in states {
            let level = format!("{:>3}", u8::from(state.level));
            let cell = if state.tested {
                level.green()
            } else {
                level.red()
            };
            queue!(self.out, PrintStyledContent(cell))?;
        }
        queue!(self.out, MoveToNextLine(2))
    }
}

impl Drop for Terminal {
    fn drop(&mut self) {
        // Nothing more can be done if the terminal refuses to be restored
        let _ = execute!(self.out, Show, LeaveAlternateScreen);
        let _ = terminal::disable_raw_mode();
    }
}

impl Console for Terminal {
    fn render(&mut self, snapshot: &Snapshot) -> io::Result<()> {
        queue!(
            self.out,
            Clear(ClearType::All),
            MoveTo(0, 0),
            Print("RTM manual I/O test. Press 0-7 to toggle an output, ESC to exit."),
            MoveToNextLine(2)
        )?;
        self.channel_row("Outputs", 0, &snapshot.outputs)?;
        for (row, states) in snapshot.inputs.chunks(INPUTS_PER_ROW).enumerate() {
            self.channel_row("Inputs", row * INPUTS_PER_ROW, states)?;
        }
        queue!(
            self.out,
            PrintStyledContent("tested".green()),
            Print(" / "),
            PrintStyledContent("untested".red())
        )?;
        self.out.flush()
    }

    fn next_event(&mut self, timeout: Duration) -> io::Result<Event> {
        if !event::poll(timeout)? {
            return Ok(Event::Tick);
        }
        Ok(match event::read()? {
            TermEvent::Key(KeyEvent {
                code,
                modifiers,
                kind: KeyEventKind::Press,
                ..
            }) => key_event(code, modifiers),
            _ => Event::Tick,
        })
    }
}

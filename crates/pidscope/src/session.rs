//! Driving loop and the collaborators it connects to a controller.
//!
//! A [`Session`] pulls one measurement per tick from a [`MeasurementSource`],
//! records it, and hands a read-only [`Frame`] to a [`PresentationSink`]. The
//! controller itself never sees either collaborator.

use std::collections::VecDeque;
use std::io::{self, BufRead, Write};

use log::{info, warn};
use thiserror::Error;

use crate::controller::{ParameterDump, PidController, TermBreakdown};
use crate::error::ControllerError;

/// Errors raised while driving a session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Controller(#[from] ControllerError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("presentation sink failed: {0}")]
    Sink(String),
}

/// Supplies the next process value each tick.
pub trait MeasurementSource {
    /// The next measurement, or `None` once the source is exhausted.
    ///
    /// The controller is passed read-only so feedback sources can derive the
    /// next value from its state.
    fn next_measurement(&mut self, controller: &PidController)
        -> Result<Option<f64>, SessionError>;
}

/// Consumes controller state for display. Must not mutate anything.
pub trait PresentationSink {
    fn present(&mut self, frame: &Frame<'_>) -> Result<(), SessionError>;
}

/// Bench-test source that treats the controller's own output as the change
/// in the process value: `next = last_value + output()`.
///
/// This does not model any physical plant. Use it to watch the control math
/// converge, never to validate tuning for real hardware.
#[derive(Debug, Default, Clone, Copy)]
pub struct SelfFeedback;

impl MeasurementSource for SelfFeedback {
    fn next_measurement(
        &mut self,
        controller: &PidController,
    ) -> Result<Option<f64>, SessionError> {
        let last = controller
            .last_value()
            .ok_or(ControllerError::EmptyWindow)?;
        Ok(Some(last + controller.output()?))
    }
}

/// Replays a fixed sequence of measurements.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSource {
    values: VecDeque<f64>,
}

impl ScriptedSource {
    pub fn new(values: impl IntoIterator<Item = f64>) -> Self {
        ScriptedSource {
            values: values.into_iter().collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.values.len()
    }
}

impl MeasurementSource for ScriptedSource {
    fn next_measurement(&mut self, _: &PidController) -> Result<Option<f64>, SessionError> {
        Ok(self.values.pop_front())
    }
}

/// Reads one numeric measurement per line, e.g. from stdin or a serial
/// device opened as a file.
///
/// Blank lines are skipped. Lines that don't parse, including ones that are
/// not valid UTF-8, are logged and skipped.
pub struct ReaderSource<R> {
    reader: R,
    line: Vec<u8>,
    skipped: usize,
}

impl<R: BufRead> ReaderSource<R> {
    pub fn new(reader: R) -> Self {
        ReaderSource {
            reader,
            line: Vec::new(),
            skipped: 0,
        }
    }

    /// Number of malformed lines skipped so far.
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

impl<R: BufRead> MeasurementSource for ReaderSource<R> {
    fn next_measurement(&mut self, _: &PidController) -> Result<Option<f64>, SessionError> {
        loop {
            self.line.clear();
            if self.reader.read_until(b'\n', &mut self.line)? == 0 {
                return Ok(None);
            }

            let text = match std::str::from_utf8(&self.line) {
                Ok(text) => text.trim(),
                Err(_) => {
                    self.skipped += 1;
                    warn!(
                        "ignoring measurement line that is not UTF-8: {:?}",
                        String::from_utf8_lossy(&self.line).trim()
                    );
                    continue;
                }
            };
            if text.is_empty() {
                continue;
            }

            match text.parse::<f64>() {
                Ok(value) if value.is_finite() => return Ok(Some(value)),
                _ => {
                    self.skipped += 1;
                    warn!("ignoring malformed measurement {:?}", text);
                }
            }
        }
    }
}

/// Read-only view of the controller handed to a sink once per tick.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    pub history: &'a [f64],
    pub window_len: usize,
    pub gains: [f64; 3],
    pub setpoint: f64,
    pub elapsed: f64,
    pub last_value: Option<f64>,
    pub terms: Option<TermBreakdown>,
}

impl<'a> Frame<'a> {
    pub fn capture(controller: &'a PidController) -> Self {
        Frame {
            history: controller.history(),
            window_len: controller.window().len(),
            gains: controller.gains(),
            setpoint: controller.setpoint(),
            elapsed: controller.elapsed_time(),
            last_value: controller.last_value(),
            terms: controller.terms().ok(),
        }
    }

    /// The last `n` history entries (all of them if there are fewer).
    pub fn recent(&self, n: usize) -> &'a [f64] {
        let start = self.history.len().saturating_sub(n);
        &self.history[start..]
    }
}

/// Writes a one-line summary per tick, preceded by the parameter dump
/// whenever the parameters changed.
pub struct ConsoleSink<W> {
    out: W,
    shown: Option<([f64; 3], f64)>,
}

impl ConsoleSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> ConsoleSink<W> {
    pub fn new(out: W) -> Self {
        ConsoleSink { out, shown: None }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> PresentationSink for ConsoleSink<W> {
    fn present(&mut self, frame: &Frame<'_>) -> Result<(), SessionError> {
        let params = (frame.gains, frame.setpoint);
        if self.shown != Some(params) {
            let [kp, ki, kd] = frame.gains;
            let dump = ParameterDump {
                kp,
                ki,
                kd,
                setpoint: frame.setpoint,
            };
            write!(self.out, "{}", dump).map_err(|e| SessionError::Sink(e.to_string()))?;
            self.shown = Some(params);
        }

        let last = frame.last_value.unwrap_or(f64::NAN);
        let line = match frame.terms {
            Some(terms) => writeln!(
                self.out,
                "#{:<5} t={:>7.2}s  value={:>10.3}  error={:>10.3}  output={:>10.3}",
                frame.history.len(),
                frame.elapsed,
                last,
                terms.error,
                terms.output
            ),
            None => writeln!(self.out, "#{:<5} no measurements", frame.history.len()),
        };
        line.map_err(|e| SessionError::Sink(e.to_string()))
    }
}

/// Discards every frame.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl PresentationSink for NullSink {
    fn present(&mut self, _: &Frame<'_>) -> Result<(), SessionError> {
        Ok(())
    }
}

/// Parse a textual setpoint command such as `"600"` or `"sp 600"`.
pub fn parse_setpoint(input: &str) -> Option<f64> {
    let text = input.trim();
    let text = ["setpoint", "sp"]
        .iter()
        .find_map(|prefix| text.strip_prefix(prefix))
        .unwrap_or(text)
        .trim_start_matches([' ', '=', ':'])
        .trim();

    text.parse::<f64>().ok().filter(|value| value.is_finite())
}

/// Connects a controller to one source and one sink.
pub struct Session<S, P> {
    controller: PidController,
    source: S,
    sink: P,
    ticks: usize,
}

impl<S: MeasurementSource, P: PresentationSink> Session<S, P> {
    pub fn new(controller: PidController, source: S, sink: P) -> Self {
        Session {
            controller,
            source,
            sink,
            ticks: 0,
        }
    }

    /// Pull one measurement, record it and present the new state.
    ///
    /// Returns the recorded measurement, or `None` once the source is
    /// exhausted (nothing is recorded or presented then).
    ///
    /// The sink runs after the measurement is recorded. If it fails, the
    /// measurement stays recorded and counted, so retrying the tick records
    /// a new measurement rather than repeating the presentation.
    pub fn tick(&mut self) -> Result<Option<f64>, SessionError> {
        let Some(value) = self.source.next_measurement(&self.controller)? else {
            return Ok(None);
        };

        self.controller.add_data_point(value)?;
        self.ticks += 1;
        self.sink.present(&Frame::capture(&self.controller))?;
        Ok(Some(value))
    }

    /// Tick until the source is exhausted or `max_ticks` ticks have run.
    /// Returns the number of ticks performed by this call.
    pub fn run(&mut self, max_ticks: Option<usize>) -> Result<usize, SessionError> {
        let mut count = 0;
        while max_ticks.map_or(true, |max| count < max) {
            if self.tick()?.is_none() {
                break;
            }
            count += 1;
        }
        Ok(count)
    }

    /// Apply a setpoint command typed by an operator.
    ///
    /// Malformed input is logged and ignored; the previous setpoint stays in
    /// effect. Returns whether the setpoint changed.
    pub fn apply_setpoint_input(&mut self, input: &str) -> bool {
        match parse_setpoint(input) {
            Some(setpoint) => match self.controller.update_setpoint(setpoint) {
                Ok(()) => {
                    info!("setpoint changed to {}", setpoint);
                    true
                }
                Err(e) => {
                    warn!("setpoint rejected: {}", e);
                    false
                }
            },
            None => {
                warn!(
                    "ignoring malformed setpoint {:?}, keeping {}",
                    input.trim(),
                    self.controller.setpoint()
                );
                false
            }
        }
    }

    /// Total measurements recorded through this session.
    pub fn ticks(&self) -> usize {
        self.ticks
    }

    pub fn controller(&self) -> &PidController {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut PidController {
        &mut self.controller
    }

    pub fn sink(&self) -> &P {
        &self.sink
    }

    pub fn into_parts(self) -> (PidController, S, P) {
        (self.controller, self.source, self.sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ControllerConfig;
    use std::io::Cursor;

    fn reference_controller() -> PidController {
        let config = ControllerConfig::new()
            .with_kp(0.5)
            .with_ki(0.2)
            .with_kd(0.3)
            .with_setpoint(500.0)
            .with_initial_value(800.0);
        PidController::new(config).unwrap()
    }

    /// Keeps a copy of every frame's history length and output.
    #[derive(Default)]
    struct RecordingSink {
        frames: Vec<(usize, Option<f64>)>,
    }

    impl PresentationSink for RecordingSink {
        fn present(&mut self, frame: &Frame<'_>) -> Result<(), SessionError> {
            self.frames
                .push((frame.history.len(), frame.terms.map(|t| t.output)));
            Ok(())
        }
    }

    #[test]
    fn test_self_feedback_follows_reference_scenario() {
        let mut session = Session::new(reference_controller(), SelfFeedback, NullSink);

        assert_eq!(session.tick().unwrap().map(f64::round), Some(590.0));
        let output = session.controller().output().unwrap();
        assert!((output - -60.0).abs() < 1e-9);
        assert_eq!(session.ticks(), 1);
    }

    #[test]
    fn test_self_feedback_without_measurement_fails() {
        let controller = PidController::new(ControllerConfig::new()).unwrap();
        let mut session = Session::new(controller, SelfFeedback, NullSink);

        assert!(matches!(
            session.tick(),
            Err(SessionError::Controller(ControllerError::EmptyWindow))
        ));
        assert!(session.controller().history().is_empty());
    }

    #[test]
    fn test_self_feedback_converges() {
        let config = ControllerConfig::new()
            .with_kp(0.5)
            .with_ki(0.0)
            .with_kd(0.0)
            .with_setpoint(100.0)
            .with_initial_value(0.0);
        let controller = PidController::new(config).unwrap();
        let mut session = Session::new(controller, SelfFeedback, NullSink);

        assert_eq!(session.run(Some(40)).unwrap(), 40);
        let last = session.controller().last_value().unwrap();
        assert!((last - 100.0).abs() < 1e-6);
    }

    #[test]
    fn test_scripted_run_stops_when_exhausted() {
        let controller = PidController::new(ControllerConfig::new()).unwrap();
        let source = ScriptedSource::new([1.0, 2.0, 3.0]);
        let mut session = Session::new(controller, source, RecordingSink::default());

        assert_eq!(session.run(None).unwrap(), 3);
        assert_eq!(session.tick().unwrap(), None);
        assert_eq!(session.controller().history(), &[1.0, 2.0, 3.0]);

        let frames = &session.sink().frames;
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].0, 1);
        assert!(frames.iter().all(|(_, output)| output.is_some()));
    }

    #[test]
    fn test_run_respects_tick_limit() {
        let controller = PidController::new(ControllerConfig::new()).unwrap();
        let source = ScriptedSource::new((0..10).map(f64::from));
        let mut session = Session::new(controller, source, NullSink);

        assert_eq!(session.run(Some(4)).unwrap(), 4);
        let (controller, source, _) = session.into_parts();
        assert_eq!(controller.history().len(), 4);
        assert_eq!(source.remaining(), 6);
    }

    #[test]
    fn test_reader_source_skips_bad_lines() {
        let input = Cursor::new("800\n\nabc\n590.5\nNaN\n  12 \n");
        let mut source = ReaderSource::new(input);
        let controller = PidController::new(ControllerConfig::new()).unwrap();

        let mut values = Vec::new();
        while let Some(value) = source.next_measurement(&controller).unwrap() {
            values.push(value);
        }

        assert_eq!(values, vec![800.0, 590.5, 12.0]);
        assert_eq!(source.skipped(), 2);
    }

    #[test]
    fn test_reader_source_skips_invalid_utf8() {
        let input = Cursor::new(&b"800\n\xff\xfe\n590\n"[..]);
        let controller = PidController::new(ControllerConfig::new()).unwrap();
        let mut session = Session::new(controller, ReaderSource::new(input), NullSink);

        assert_eq!(session.run(None).unwrap(), 2);
        assert_eq!(session.controller().history(), &[800.0, 590.0]);

        let (_, source, _) = session.into_parts();
        assert_eq!(source.skipped(), 1);
    }

    /// Yields one line, then fails on every later read.
    struct BrokenReader {
        served: bool,
    }

    impl io::Read for BrokenReader {
        fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"))
        }
    }

    impl BufRead for BrokenReader {
        fn fill_buf(&mut self) -> io::Result<&[u8]> {
            if self.served {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"))
            } else {
                Ok(b"42\n")
            }
        }

        fn consume(&mut self, amt: usize) {
            if amt > 0 {
                self.served = true;
            }
        }
    }

    #[test]
    fn test_reader_failure_ends_tick_with_io_error() {
        let controller = PidController::new(ControllerConfig::new()).unwrap();
        let source = ReaderSource::new(BrokenReader { served: false });
        let mut session = Session::new(controller, source, NullSink);

        assert_eq!(session.tick().unwrap(), Some(42.0));
        let err = session.tick().unwrap_err();
        assert!(matches!(&err, SessionError::Io(e) if e.kind() == io::ErrorKind::BrokenPipe));
        assert_eq!(err.to_string(), "I/O error: device unplugged");
        assert_eq!(session.controller().history(), &[42.0]);
    }

    struct FailingSink;

    impl PresentationSink for FailingSink {
        fn present(&mut self, _: &Frame<'_>) -> Result<(), SessionError> {
            Err(SessionError::Sink("display closed".to_string()))
        }
    }

    #[test]
    fn test_sink_failure_keeps_recorded_measurement() {
        let controller = PidController::new(ControllerConfig::new()).unwrap();
        let source = ScriptedSource::new([1.0, 2.0]);
        let mut session = Session::new(controller, source, FailingSink);

        let err = session.tick().unwrap_err();
        assert!(matches!(&err, SessionError::Sink(msg) if msg == "display closed"));
        assert_eq!(err.to_string(), "presentation sink failed: display closed");

        // Recorded and counted once; the next tick moves on to the next value
        assert_eq!(session.controller().history(), &[1.0]);
        assert_eq!(session.ticks(), 1);
        assert!(session.tick().is_err());
        assert_eq!(session.controller().history(), &[1.0, 2.0]);
        assert_eq!(session.ticks(), 2);
    }

    #[test]
    fn test_setpoint_input() {
        let source = ScriptedSource::new([590.0]);
        let mut session = Session::new(reference_controller(), source, NullSink);
        session.tick().unwrap();

        assert!(!session.apply_setpoint_input("six hundred"));
        assert!(!session.apply_setpoint_input(""));
        assert_eq!(session.controller().setpoint(), 500.0);
        assert_eq!(session.controller().window(), &[800.0, 590.0]);

        assert!(session.apply_setpoint_input("sp=600"));
        assert_eq!(session.controller().setpoint(), 600.0);
        assert_eq!(session.controller().window(), &[590.0]);
    }

    #[test]
    fn test_parse_setpoint() {
        assert_eq!(parse_setpoint("600"), Some(600.0));
        assert_eq!(parse_setpoint("  -12.5\n"), Some(-12.5));
        assert_eq!(parse_setpoint("setpoint: 42"), Some(42.0));
        assert_eq!(parse_setpoint("sp 7"), Some(7.0));
        assert_eq!(parse_setpoint("inf"), None);
        assert_eq!(parse_setpoint("sp"), None);
        assert_eq!(parse_setpoint("hello"), None);
    }

    #[test]
    fn test_frame_recent() {
        let mut controller = PidController::new(ControllerConfig::new()).unwrap();
        for value in [1.0, 2.0, 3.0, 4.0] {
            controller.add_data_point(value).unwrap();
        }
        controller.update_setpoint(2.0).unwrap();

        let frame = Frame::capture(&controller);
        assert_eq!(frame.recent(2), &[3.0, 4.0]);
        assert_eq!(frame.recent(10), &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(frame.window_len, 1);
        assert_eq!(frame.setpoint, 2.0);
    }

    #[test]
    fn test_console_sink_output() {
        let controller = PidController::new(ControllerConfig::new().with_setpoint(10.0)).unwrap();
        let source = ScriptedSource::new([4.0, 6.0]);
        let mut session = Session::new(controller, source, ConsoleSink::new(Vec::new()));
        session.run(None).unwrap();

        let (_, _, sink) = session.into_parts();
        let text = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        // Parameter dump once, then one line per tick
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[0], "Proportional Term: 1");
        assert!(lines[4].starts_with("#1"));
        assert!(lines[5].contains("error="));
    }
}

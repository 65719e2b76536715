use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use pidscope::{
    ControllerConfig, MeasurementSource, PidController, PresentationSink, Session, SessionError,
};
use rand::{rngs::ThreadRng, thread_rng, Rng};
use ratatui::{
    layout::{Constraint, Layout},
    style::{Color, Style},
    symbols::Marker,
    text::Line,
    widgets::{Axis, Block, Chart, Dataset, GraphType, Paragraph},
    DefaultTerminal,
};
use std::time::Duration;

// Simulation constants - easy to adjust
const TICK_INTERVAL: Duration = Duration::from_millis(100);
const INITIAL_SETPOINT: f64 = 500.0;
const SETPOINT_STEP: f64 = 50.0;
const NOISE_AMPLITUDE: f64 = 5.0; // Peak measurement noise

// Visualization constants
const PLOT_WIDTH: usize = 200; // History entries shown

/// # Live History Chart
///
/// Runs the self-feedback bench loop with a little measurement noise and
/// draws the controller's history in the terminal.
///
/// Keys: `Up`/`Down` move the setpoint, `q` quits.
fn main() -> Result<(), SessionError> {
    let config = ControllerConfig::new()
        .with_kp(0.4)
        .with_ki(0.05)
        .with_kd(0.1)
        .with_setpoint(INITIAL_SETPOINT)
        .with_initial_value(800.0);

    let controller = PidController::new(config)?;
    let source = NoisyFeedback { rng: thread_rng() };
    let sink = ChartSink {
        terminal: ratatui::init(),
    };

    let mut session = Session::new(controller, source, sink);
    let result = run(&mut session);
    ratatui::restore();

    let (controller, _, _) = session.into_parts();
    println!("Recorded {} measurements", controller.history().len());
    result
}

fn run(session: &mut Session<NoisyFeedback, ChartSink>) -> Result<(), SessionError> {
    loop {
        session.tick()?;

        if event::poll(TICK_INTERVAL)? {
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                let setpoint = session.controller().setpoint();
                match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                    KeyCode::Up => {
                        session.apply_setpoint_input(&(setpoint + SETPOINT_STEP).to_string());
                    }
                    KeyCode::Down => {
                        session.apply_setpoint_input(&(setpoint - SETPOINT_STEP).to_string());
                    }
                    _ => {}
                }
            }
        }
    }
}

/// Self-feedback with uniform noise added to every reading.
struct NoisyFeedback {
    rng: ThreadRng,
}

impl MeasurementSource for NoisyFeedback {
    fn next_measurement(
        &mut self,
        controller: &PidController,
    ) -> Result<Option<f64>, SessionError> {
        let last = controller.last_value().unwrap_or(INITIAL_SETPOINT);
        let noise = self.rng.gen_range(-NOISE_AMPLITUDE..NOISE_AMPLITUDE);
        Ok(Some(last + controller.output()? + noise))
    }
}

struct ChartSink {
    terminal: DefaultTerminal,
}

impl PresentationSink for ChartSink {
    fn present(&mut self, frame: &pidscope::Frame<'_>) -> Result<(), SessionError> {
        let recent = frame.recent(PLOT_WIDTH);
        let first_index = frame.history.len() - recent.len();
        let points: Vec<(f64, f64)> = recent
            .iter()
            .enumerate()
            .map(|(i, value)| ((first_index + i) as f64, *value))
            .collect();

        let x_min = first_index as f64;
        let x_max = (first_index + PLOT_WIDTH) as f64;
        let target = [(x_min, frame.setpoint), (x_max, frame.setpoint)];

        let (y_min, y_max) = recent
            .iter()
            .chain(std::iter::once(&frame.setpoint))
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(*v), hi.max(*v))
            });
        let margin = ((y_max - y_min) * 0.1).max(1.0);
        let y_bounds = [y_min - margin, y_max + margin];

        let [kp, ki, kd] = frame.gains;
        let summary = match frame.terms {
            Some(terms) => format!(
                "P={:.2} I={:.2} D={:.2} | error {:.2} | output {:.2}",
                terms.proportional, terms.integral, terms.derivative, terms.error, terms.output
            ),
            None => "no measurements".to_string(),
        };
        let header = vec![
            Line::from(format!(
                "Kp={} Ki={} Kd={} | setpoint {:.1} | epoch {:.1}s, {} samples",
                kp, ki, kd, frame.setpoint, frame.elapsed, frame.window_len
            )),
            Line::from(summary),
            Line::from("Up/Down: setpoint  q: quit"),
        ];

        self.terminal.draw(|f| {
            let [header_area, chart_area] =
                Layout::vertical([Constraint::Length(5), Constraint::Min(0)]).areas(f.area());

            f.render_widget(
                Paragraph::new(header).block(Block::bordered().title("pidscope")),
                header_area,
            );

            let datasets = vec![
                Dataset::default()
                    .name("measurement")
                    .marker(Marker::Braille)
                    .graph_type(GraphType::Line)
                    .style(Style::default().fg(Color::Yellow))
                    .data(&points),
                Dataset::default()
                    .name("setpoint")
                    .marker(Marker::Dot)
                    .graph_type(GraphType::Line)
                    .style(Style::default().fg(Color::Green))
                    .data(&target),
            ];

            let chart = Chart::new(datasets)
                .block(Block::bordered().title("History"))
                .x_axis(
                    Axis::default()
                        .title("tick")
                        .bounds([x_min, x_max])
                        .labels(vec![format!("{}", x_min), format!("{}", x_max)]),
                )
                .y_axis(
                    Axis::default()
                        .title("value")
                        .bounds(y_bounds)
                        .labels(vec![
                            format!("{:.0}", y_bounds[0]),
                            format!("{:.0}", y_bounds[1]),
                        ]),
                );
            f.render_widget(chart, chart_area);
        })?;
        Ok(())
    }
}

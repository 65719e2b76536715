use pidscope::{ConsoleSink, ControllerConfig, PidController, SelfFeedback, Session};
use std::error::Error;

const TICKS_PER_EPOCH: usize = 15;
const SETPOINTS: [f64; 3] = [500.0, 600.0, 450.0];

/// Closed-loop bench test: the controller's output is fed straight back as
/// the change in the process value.
///
/// This is not a model of any real plant. It shows the window/history
/// mechanics and how the terms evolve across setpoint changes.
fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    println!("PID Controller Bench Simulation");
    println!("===============================");

    let config = ControllerConfig::new()
        .with_kp(0.5)
        .with_ki(0.2)
        .with_kd(0.3)
        .with_setpoint(SETPOINTS[0])
        .with_initial_value(800.0);

    let controller = PidController::new(config)?;
    controller.print_parameters();
    println!("First output: {:.3}", controller.output()?);
    println!();

    let mut session = Session::new(controller, SelfFeedback, ConsoleSink::stdout());

    for (epoch, setpoint) in SETPOINTS.iter().enumerate() {
        if epoch > 0 {
            session.controller_mut().update_setpoint(*setpoint)?;
            println!(">>> Setpoint changed to {:.1}", setpoint);
        }
        session.run(Some(TICKS_PER_EPOCH))?;

        let stats = session.controller().statistics()?;
        println!(
            "Epoch {}: {} samples, mean |error| {:.3}, max |error| {:.3}",
            epoch + 1,
            stats.samples,
            stats.average_error,
            stats.max_error
        );
        println!();
    }

    let history = session.controller().history();
    println!("Recorded {} measurements in total", history.len());
    Ok(())
}

use pidscope::{ControllerConfig, DebugConfig, IggySink, PidController, SelfFeedback, Session};
use std::error::Error;
use std::thread;
use std::time::Duration;

/// This example runs the self-feedback bench loop and streams every tick to
/// an iggy server for visualization.
fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    println!("Debugging Bench Simulation");
    println!("==========================");
    println!("This example requires an iggy server running at 127.0.0.1:8090");
    println!();

    let config = ControllerConfig::new()
        .with_kp(0.5)
        .with_ki(0.2)
        .with_kd(0.3)
        .with_setpoint(500.0)
        .with_initial_value(800.0);

    let debug_config = DebugConfig {
        controller_id: "bench_controller".to_string(),
        sample_rate_hz: Some(10.0), // 10 Hz sampling rate
        ..Default::default()
    };

    let controller = PidController::new(config)?;
    let sink = IggySink::new(debug_config)?;
    let mut session = Session::new(controller, SelfFeedback, sink);

    for tick in 0..600 {
        session.tick()?;

        // Step the setpoint every 20 seconds
        if tick > 0 && tick % 200 == 0 {
            let setpoint = session.controller().setpoint() + 100.0;
            session.controller_mut().update_setpoint(setpoint)?;
            println!(">>> Setpoint changed to {:.1}", setpoint);
        }

        if tick % 10 == 0 {
            let controller = session.controller();
            println!(
                "{:6.1}s | value {:10.3} | output {:10.3}",
                controller.elapsed_time(),
                controller.last_value().unwrap_or_default(),
                controller.output()?
            );
        }

        thread::sleep(Duration::from_millis(100));
    }

    println!("\nSimulation complete.");
    Ok(())
}

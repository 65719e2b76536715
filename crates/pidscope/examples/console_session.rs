use pidscope::session::parse_setpoint;
use pidscope::{ControllerConfig, PidController};
use std::error::Error;
use std::io::{self, BufRead, Write};

/// Interactive session: type measurements as they are read from the process,
/// `sp <value>` to change the setpoint, `p`/`i`/`d <value>` to retune, or
/// `q` to quit.
///
/// Any line-oriented device (a serial port opened as a file, a log) can be
/// driven the same way with `ReaderSource`.
fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let mut controller = PidController::new(
        ControllerConfig::new()
            .with_kp(0.5)
            .with_ki(0.2)
            .with_kd(0.3)
            .with_setpoint(500.0),
    )?;

    println!("PID Controller");
    controller.print_parameters();

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        print!("> ");
        io::stdout().flush()?;

        let Some(line) = lines.next().transpose()? else {
            break;
        };
        let line = line.trim();

        match line.split_once(' ') {
            _ if line == "q" => break,
            Some(("sp", _)) => match parse_setpoint(line) {
                Some(setpoint) => {
                    controller.update_setpoint(setpoint)?;
                    println!("setpoint -> {}", setpoint);
                }
                None => println!("invalid setpoint, keeping {}", controller.setpoint()),
            },
            Some((gain @ ("p" | "i" | "d"), value)) => {
                let Ok(value) = value.trim().parse::<f64>() else {
                    println!("invalid gain {:?}", value);
                    continue;
                };
                let result = match gain {
                    "p" => controller.set_kp(value),
                    "i" => controller.set_ki(value),
                    _ => controller.set_kd(value),
                };
                match result {
                    Ok(()) => controller.print_parameters(),
                    Err(e) => println!("{}", e),
                }
            }
            _ => match line.parse::<f64>() {
                Ok(value) => match controller.add_data_point(value) {
                    Ok(()) => {
                        let terms = controller.terms()?;
                        println!(
                            "P={:.3} I={:.3} D={:.3} -> output {:.3} ({:.1}s into epoch)",
                            terms.proportional,
                            terms.integral,
                            terms.derivative,
                            terms.output,
                            controller.elapsed_time()
                        );
                    }
                    Err(e) => println!("{}", e),
                },
                Err(_) => println!("expected a measurement, `sp <value>`, `p|i|d <value>` or `q`"),
            },
        }
    }

    println!("History: {:?}", controller.history());
    Ok(())
}

use std::fmt;
use std::time::Duration;

#[cfg(not(feature = "wasm"))]
use std::time::Instant;
#[cfg(feature = "wasm")]
use web_time::Instant;

use log::{debug, trace};

use crate::config::ControllerConfig;
use crate::error::{ensure_finite, ControllerError, Quantity};

/// The three PID terms and their sum, computed from one window snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TermBreakdown {
    pub error: f64,        // Error of the latest measurement
    pub proportional: f64, // P term
    pub integral: f64,     // I term
    pub derivative: f64,   // D term
    pub output: f64,       // P + I + D
}

/// Error statistics over the current epoch window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochStatistics {
    pub samples: usize,     // Measurements in the window
    pub average_error: f64, // Mean absolute error
    pub max_error: f64,     // Largest absolute error
    pub elapsed: f64,       // Seconds since the epoch began
}

/// Human readable dump of the tunable parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterDump {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    pub setpoint: f64,
}

impl fmt::Display for ParameterDump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<19}{}", "Proportional Term:", self.kp)?;
        writeln!(f, "{:<19}{}", "Integral Term:", self.ki)?;
        writeln!(f, "{:<19}{}", "Differential Term:", self.kd)?;
        writeln!(f, "{:<19}{}", "Setpoint:", self.setpoint)
    }
}

/// A discrete-time PID controller.
///
/// The controller keeps every measurement it is given. Two views of that data
/// exist:
/// - the *window*: measurements since the last setpoint change, which is the
///   only data the control math reads
/// - the *history*: every measurement ever recorded, for display
///
/// The terms are deliberately sample based rather than time based:
///
/// ```text
/// P = Kp * e(last)
/// I = Ki * sum(e(w) for w in window)
/// D = Kd * (e(last) - e(previous))
/// ```
///
/// where `e(x) = setpoint - x` and `previous` is the second-to-last window
/// entry (or the last one again if the window holds a single value, which
/// makes D zero).
#[derive(Debug, Clone)]
pub struct PidController {
    kp: f64,
    ki: f64,
    kd: f64,
    setpoint: f64,
    window: Vec<f64>,
    history: Vec<f64>,
    last_value: Option<f64>,
    start_time: Instant,
}

impl PidController {
    /// Create a new PID controller with the given configuration.
    ///
    /// If the configuration carries an initial value it is recorded as the
    /// first measurement.
    pub fn new(config: ControllerConfig) -> Result<Self, ControllerError> {
        let mut controller = PidController {
            kp: ensure_finite(Quantity::ProportionalGain, config.kp)?,
            ki: ensure_finite(Quantity::IntegralGain, config.ki)?,
            kd: ensure_finite(Quantity::DerivativeGain, config.kd)?,
            setpoint: ensure_finite(Quantity::Setpoint, config.setpoint)?,
            window: Vec::new(),
            history: Vec::new(),
            last_value: None,
            start_time: Instant::now(),
        };

        if let Some(value) = config.initial_value {
            controller.add_data_point(value)?;
        }

        Ok(controller)
    }

    /// The error of `value` against the current setpoint.
    pub fn error(&self, value: f64) -> f64 {
        self.setpoint - value
    }

    /// Record a new measurement in both the window and the history.
    pub fn add_data_point(&mut self, value: f64) -> Result<(), ControllerError> {
        let value = ensure_finite(Quantity::Measurement, value)?;
        self.window.push(value);
        self.history.push(value);
        self.last_value = Some(value);
        trace!(
            "recorded measurement {} (window {}, history {})",
            value,
            self.window.len(),
            self.history.len()
        );
        Ok(())
    }

    /// Proportional term, from the latest measurement only.
    pub fn proportional_term(&self) -> Result<f64, ControllerError> {
        let (last, _) = self.last_two()?;
        Ok(self.kp * self.error(last))
    }

    /// Integral term: the unweighted sum of the window's errors.
    pub fn integral_term(&self) -> Result<f64, ControllerError> {
        if self.window.is_empty() {
            return Err(ControllerError::EmptyWindow);
        }
        let sum: f64 = self.window.iter().map(|&w| self.error(w)).sum();
        Ok(self.ki * sum)
    }

    /// Derivative term: backward difference of the last two errors, not
    /// divided by any time step.
    pub fn derivative_term(&self) -> Result<f64, ControllerError> {
        let (last, previous) = self.last_two()?;
        Ok(self.kd * (self.error(last) - self.error(previous)))
    }

    /// The control signal for the current window.
    ///
    /// Calling this repeatedly without recording data or changing parameters
    /// always gives the same result.
    pub fn output(&self) -> Result<f64, ControllerError> {
        Ok(self.terms()?.output)
    }

    /// All three terms plus their sum.
    pub fn terms(&self) -> Result<TermBreakdown, ControllerError> {
        let (last, _) = self.last_two()?;
        let proportional = self.proportional_term()?;
        let integral = self.integral_term()?;
        let derivative = self.derivative_term()?;

        Ok(TermBreakdown {
            error: self.error(last),
            proportional,
            integral,
            derivative,
            output: proportional + integral + derivative,
        })
    }

    /// Change the target and start a new epoch.
    ///
    /// The window is reset to hold only the last recorded measurement, so the
    /// integral and derivative never mix errors measured against different
    /// setpoints. The history is not touched.
    ///
    /// If nothing has been recorded yet there is no measurement to carry
    /// over and the window stays empty; `output()` keeps returning
    /// [`ControllerError::EmptyWindow`] until the first `add_data_point`.
    pub fn update_setpoint(&mut self, setpoint: f64) -> Result<(), ControllerError> {
        let setpoint = ensure_finite(Quantity::Setpoint, setpoint)?;
        debug!(
            "setpoint {} -> {}, closing epoch of {} samples",
            self.setpoint,
            setpoint,
            self.window.len()
        );

        self.setpoint = setpoint;
        self.window.clear();
        if let Some(current) = self.last_value {
            self.window.push(current);
        }
        self.start_time = Instant::now();
        Ok(())
    }

    /// Set the proportional gain (Kp).
    pub fn set_kp(&mut self, kp: f64) -> Result<(), ControllerError> {
        self.kp = ensure_finite(Quantity::ProportionalGain, kp)?;
        debug!("kp set to {}", kp);
        Ok(())
    }

    /// Set the integral gain (Ki).
    pub fn set_ki(&mut self, ki: f64) -> Result<(), ControllerError> {
        self.ki = ensure_finite(Quantity::IntegralGain, ki)?;
        debug!("ki set to {}", ki);
        Ok(())
    }

    /// Set the derivative gain (Kd).
    pub fn set_kd(&mut self, kd: f64) -> Result<(), ControllerError> {
        self.kd = ensure_finite(Quantity::DerivativeGain, kd)?;
        debug!("kd set to {}", kd);
        Ok(())
    }

    pub fn kp(&self) -> f64 {
        self.kp
    }

    pub fn ki(&self) -> f64 {
        self.ki
    }

    pub fn kd(&self) -> f64 {
        self.kd
    }

    /// Gains as `[kp, ki, kd]`.
    pub fn gains(&self) -> [f64; 3] {
        [self.kp, self.ki, self.kd]
    }

    /// Get the setpoint (target value).
    pub fn setpoint(&self) -> f64 {
        self.setpoint
    }

    /// The most recent measurement, across setpoint changes.
    pub fn last_value(&self) -> Option<f64> {
        self.last_value
    }

    /// Measurements of the current epoch, oldest first.
    pub fn window(&self) -> &[f64] {
        &self.window
    }

    /// Every measurement ever recorded, oldest first.
    pub fn history(&self) -> &[f64] {
        &self.history
    }

    /// Time since the current epoch began.
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Seconds since the current epoch began.
    pub fn elapsed_time(&self) -> f64 {
        self.elapsed().as_secs_f64()
    }

    /// Get error statistics for the current epoch.
    pub fn statistics(&self) -> Result<EpochStatistics, ControllerError> {
        if self.window.is_empty() {
            return Err(ControllerError::EmptyWindow);
        }

        let (sum, max) = self
            .window
            .iter()
            .map(|&w| self.error(w).abs())
            .fold((0.0, 0.0_f64), |(sum, max), e| (sum + e, max.max(e)));

        Ok(EpochStatistics {
            samples: self.window.len(),
            average_error: sum / self.window.len() as f64,
            max_error: max,
            elapsed: self.elapsed_time(),
        })
    }

    pub fn parameters(&self) -> ParameterDump {
        ParameterDump {
            kp: self.kp,
            ki: self.ki,
            kd: self.kd,
            setpoint: self.setpoint,
        }
    }

    /// Render gains and setpoint as `label: value` lines.
    pub fn format_parameters(&self) -> String {
        self.parameters().to_string()
    }

    /// Print [`format_parameters`](Self::format_parameters) to stdout.
    pub fn print_parameters(&self) {
        print!("{}", self.parameters());
    }

    // Latest measurement and the one before it, falling back to the latest.
    fn last_two(&self) -> Result<(f64, f64), ControllerError> {
        match self.window.as_slice() {
            [] => Err(ControllerError::EmptyWindow),
            [only] => Ok((*only, *only)),
            [.., previous, last] => Ok((*last, *previous)),
        }
    }
}

use std::sync::{Mutex, MutexGuard};

use crate::config::ControllerConfig;
use crate::controller::{PidController, TermBreakdown};
use crate::error::ControllerError;

/// Thread-safe version of the PID controller.
///
/// Every call takes the lock for its whole duration, so operations from
/// different threads are applied one at a time. Use this when a sensor
/// thread records measurements while another thread reads the output.
pub struct SharedController {
    controller: Mutex<PidController>,
}

impl SharedController {
    /// Create a new thread-safe PID controller.
    pub fn new(config: ControllerConfig) -> Result<Self, ControllerError> {
        Ok(Self::from_controller(PidController::new(config)?))
    }

    pub fn from_controller(controller: PidController) -> Self {
        SharedController {
            controller: Mutex::new(controller),
        }
    }

    /// Record a measurement and return the resulting output in one step.
    pub fn record(&self, value: f64) -> Result<f64, ControllerError> {
        let mut controller = self.lock();
        controller.add_data_point(value)?;
        controller.output()
    }

    pub fn add_data_point(&self, value: f64) -> Result<(), ControllerError> {
        self.lock().add_data_point(value)
    }

    pub fn output(&self) -> Result<f64, ControllerError> {
        self.lock().output()
    }

    pub fn terms(&self) -> Result<TermBreakdown, ControllerError> {
        self.lock().terms()
    }

    pub fn update_setpoint(&self, setpoint: f64) -> Result<(), ControllerError> {
        self.lock().update_setpoint(setpoint)
    }

    /// Set the proportional gain (Kp).
    pub fn set_kp(&self, kp: f64) -> Result<(), ControllerError> {
        self.lock().set_kp(kp)
    }

    /// Set the integral gain (Ki).
    pub fn set_ki(&self, ki: f64) -> Result<(), ControllerError> {
        self.lock().set_ki(ki)
    }

    /// Set the derivative gain (Kd).
    pub fn set_kd(&self, kd: f64) -> Result<(), ControllerError> {
        self.lock().set_kd(kd)
    }

    /// Copy of the full measurement history.
    pub fn history(&self) -> Vec<f64> {
        self.lock().history().to_vec()
    }

    /// Run `f` with exclusive access to the controller.
    pub fn with<R>(&self, f: impl FnOnce(&mut PidController) -> R) -> R {
        f(&mut *self.lock())
    }

    pub fn into_inner(self) -> PidController {
        self.controller
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // Controller operations never leave partial state behind, so a lock
    // poisoned by a panicking caller still guards a consistent controller.
    fn lock(&self) -> MutexGuard<'_, PidController> {
        self.controller
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

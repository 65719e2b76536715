use std::fmt;

use thiserror::Error;

/// The quantity a rejected value was supplied for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Quantity {
    Measurement,
    ProportionalGain,
    IntegralGain,
    DerivativeGain,
    Setpoint,
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Quantity::Measurement => "measurement",
            Quantity::ProportionalGain => "proportional gain",
            Quantity::IntegralGain => "integral gain",
            Quantity::DerivativeGain => "derivative gain",
            Quantity::Setpoint => "setpoint",
        };
        f.write_str(name)
    }
}

/// Errors raised by [`PidController`](crate::PidController) operations.
///
/// Every operation that returns one of these leaves the controller untouched.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum ControllerError {
    /// A term or the output was requested before any measurement was recorded.
    #[error("no measurement recorded in the current window")]
    EmptyWindow,

    /// NaN or an infinity was supplied where a finite real is required.
    #[error("{quantity} must be finite, got {value}")]
    NonFiniteValue { quantity: Quantity, value: f64 },
}

/// Returns `value` if it is finite, otherwise the matching rejection.
pub(crate) fn ensure_finite(quantity: Quantity, value: f64) -> Result<f64, ControllerError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ControllerError::NonFiniteValue { quantity, value })
    }
}

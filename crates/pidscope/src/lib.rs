// pidscope: a windowed discrete-time PID controller written in Rust
// Copyright 2024

//! A discrete-time PID controller that keeps its measurements.
//!
//! [`PidController`] records every measurement in two places: a *window*
//! scoped to the current setpoint, which drives the control math, and a
//! never-truncated *history* for display. Changing the setpoint starts a new
//! window seeded with the last measurement.
//!
//! ```
//! use pidscope::{ControllerConfig, PidController};
//!
//! let config = ControllerConfig::new()
//!     .with_kp(0.5)
//!     .with_ki(0.2)
//!     .with_kd(0.3)
//!     .with_setpoint(500.0)
//!     .with_initial_value(800.0);
//!
//! let mut controller = PidController::new(config)?;
//! let output = controller.output()?;
//! assert!((output - -210.0).abs() < 1e-9);
//!
//! controller.add_data_point(800.0 + output)?;
//! assert!((controller.output()? - -60.0).abs() < 1e-9);
//! # Ok::<(), pidscope::ControllerError>(())
//! ```
//!
//! The [`session`] module drives a controller from a [`MeasurementSource`]
//! and reports to a [`PresentationSink`].

mod config;
mod controller;
mod error;
mod shared;
pub mod session;

#[cfg(feature = "debugging")]
mod debug;

pub use config::ControllerConfig;
pub use controller::{EpochStatistics, ParameterDump, PidController, TermBreakdown};
pub use error::{ControllerError, Quantity};
pub use session::{
    ConsoleSink, Frame, MeasurementSource, NullSink, PresentationSink, ReaderSource,
    ScriptedSource, SelfFeedback, Session, SessionError,
};
pub use shared::SharedController;

#[cfg(feature = "debugging")]
pub use debug::{ControllerDebugData, DebugConfig, IggySink};

/// Configuration for a PID controller.
///
/// Uses a builder pattern to configure the controller parameters. Values are
/// validated when the controller is built, not here.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ControllerConfig {
    pub(crate) kp: f64,                    // Proportional gain
    pub(crate) ki: f64,                    // Integral gain
    pub(crate) kd: f64,                    // Derivative gain
    pub(crate) setpoint: f64,              // Target value
    pub(crate) initial_value: Option<f64>, // First measurement, if already known
}

impl Default for ControllerConfig {
    fn default() -> Self {
        ControllerConfig {
            kp: 1.0,
            ki: 1.0,
            kd: 1.0,
            setpoint: 0.0,
            initial_value: None,
        }
    }
}

impl ControllerConfig {
    /// Create a new PID controller configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the proportional gain (Kp).
    pub fn with_kp(mut self, kp: f64) -> Self {
        self.kp = kp;
        self
    }

    /// Set the integral gain (Ki).
    pub fn with_ki(mut self, ki: f64) -> Self {
        self.ki = ki;
        self
    }

    /// Set the derivative gain (Kd).
    pub fn with_kd(mut self, kd: f64) -> Self {
        self.kd = kd;
        self
    }

    /// Set the initial setpoint (target value).
    pub fn with_setpoint(mut self, setpoint: f64) -> Self {
        self.setpoint = setpoint;
        self
    }

    /// Record `value` as the first measurement when the controller is built.
    pub fn with_initial_value(mut self, value: f64) -> Self {
        self.initial_value = Some(value);
        self
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

    pub fn setpoint(&self) -> f64 {
        self.setpoint
    }

    pub fn initial_value(&self) -> Option<f64> {
        self.initial_value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ControllerConfig::new();
        assert_eq!(config.kp(), 1.0);
        assert_eq!(config.ki(), 1.0);
        assert_eq!(config.kd(), 1.0);
        assert_eq!(config.setpoint(), 0.0);
        assert_eq!(config.initial_value(), None);
    }

    #[test]
    fn test_builder_chain() {
        let config = ControllerConfig::new()
            .with_kp(0.5)
            .with_ki(0.2)
            .with_kd(0.3)
            .with_setpoint(500.0)
            .with_initial_value(800.0);

        assert_eq!(config.kp(), 0.5);
        assert_eq!(config.ki(), 0.2);
        assert_eq!(config.kd(), 0.3);
        assert_eq!(config.setpoint(), 500.0);
        assert_eq!(config.initial_value(), Some(800.0));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_partial_config_fills_defaults() {
        let config: ControllerConfig =
            serde_json::from_str(r#"{ "kp": 0.5, "setpoint": 500.0 }"#).unwrap();
        assert_eq!(config, ControllerConfig::new().with_kp(0.5).with_setpoint(500.0));
    }
}

//! Scalar step parameters, loadable from a JSON parameter file.

use serde::{Deserialize, Serialize};

use crate::transport_error::TransportError;

/// Knobs for one transport step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StepParams {
    /// Photons transported between servicing the message layer.
    pub batch_size: u32,
    /// Preferred number of photons per point-to-point message.
    pub particle_message_size: u32,
    /// Kill a history once its energy drops below this fraction of its
    /// birth energy.
    pub cutoff_fraction: f64,
    /// Current time-step length (shakes); sets the flight distance of
    /// freshly sourced photons.
    pub dt: f64,
    /// Next time-step length; census photons are given `c * next_dt` of
    /// flight for the following step.
    pub next_dt: f64,
}

impl Default for StepParams {
    fn default() -> Self {
        Self {
            batch_size: 100,
            particle_message_size: 100,
            cutoff_fraction: 0.01,
            dt: 1.0,
            next_dt: 1.0,
        }
    }
}

impl StepParams {
    /// Load parameters from a JSON file.
    pub fn from_file(path: &str) -> Result<Self, TransportError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| TransportError::ParameterIo(e.to_string()))?;
        serde_json::from_str(&contents).map_err(|e| TransportError::ParameterParse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let p = StepParams::default();
        assert!(p.batch_size > 0);
        assert!(p.cutoff_fraction > 0.0 && p.cutoff_fraction < 1.0);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let p: StepParams = serde_json::from_str(r#"{"batch_size": 7}"#).unwrap();
        assert_eq!(p.batch_size, 7);
        assert_eq!(p.cutoff_fraction, StepParams::default().cutoff_fraction);
    }
}

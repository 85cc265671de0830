use filament_core::constants::{
    CACHE_TTL_SECS, DEFAULT_MAX_DELAY, DEFAULT_MIN_DELAY, DEFAULT_PAYMENT_RATE,
    MESSAGE_MAX_AGE_TICKS,
};
use filament_core::error::FilamentError;
use filament_net::RouterConfig;
use filament_validator::NetworkParams;
use serde::{Deserialize, Serialize};

/// Everything a simulation run is parameterized by. Loadable from a JSON
/// document; every field has a default so partial configs are fine.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SimParams {
    pub node_count: u32,
    /// Target connections per node (the topology builder approximates it).
    pub connection_count: u32,
    /// Probability that any scheduled delivery is lost.
    pub failure_rate: f64,
    /// Wall-clock pacing between ticks; observational only.
    pub tick_interval_ms: u64,
    pub min_delay: u64,
    pub max_delay: u64,
    /// Fraction of eligible users initiating a transfer each tick.
    pub payment_rate: f64,
    pub cache_ttl_secs: u64,
    pub message_max_age: u64,
    pub user_count: u32,
    /// Master RNG seed; a fixed seed replays a run exactly.
    pub seed: u64,
}

impl Default for SimParams {
    fn default() -> Self {
        Self {
            node_count: 8,
            connection_count: 2,
            failure_rate: 0.0,
            tick_interval_ms: 100,
            min_delay: DEFAULT_MIN_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            payment_rate: DEFAULT_PAYMENT_RATE,
            cache_ttl_secs: CACHE_TTL_SECS,
            message_max_age: MESSAGE_MAX_AGE_TICKS,
            user_count: 5,
            seed: 42,
        }
    }
}

impl SimParams {
    pub fn validate(&self) -> Result<(), FilamentError> {
        if self.node_count == 0 {
            return Err(FilamentError::MalformedDefinition(
                "node_count must be positive".into(),
            ));
        }
        if self.user_count == 0 {
            return Err(FilamentError::MalformedDefinition(
                "user_count must be positive".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.failure_rate) {
            return Err(FilamentError::MalformedDefinition(
                "failure_rate must lie in [0, 1]".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.payment_rate) {
            return Err(FilamentError::MalformedDefinition(
                "payment_rate must lie in [0, 1]".into(),
            ));
        }
        if self.min_delay == 0 || self.min_delay > self.max_delay {
            return Err(FilamentError::MalformedDefinition(
                "delays must satisfy 1 <= min_delay <= max_delay".into(),
            ));
        }
        Ok(())
    }

    pub fn network_params(&self) -> NetworkParams {
        NetworkParams::new(
            self.node_count as u64,
            self.connection_count as u64,
            self.min_delay,
            self.max_delay,
        )
    }

    pub fn router_config(&self) -> RouterConfig {
        RouterConfig {
            min_delay: self.min_delay,
            max_delay: self.max_delay,
            max_age: self.message_max_age,
            failure_rate: self.failure_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        SimParams::default().validate().unwrap();
    }

    #[test]
    fn partial_json_config_fills_defaults() {
        let params: SimParams = serde_json::from_str(r#"{"node_count": 12}"#).unwrap();
        assert_eq!(params.node_count, 12);
        assert_eq!(params.max_delay, DEFAULT_MAX_DELAY);
        params.validate().unwrap();
    }

    #[test]
    fn bad_rates_are_rejected() {
        let params = SimParams {
            failure_rate: 1.5,
            ..SimParams::default()
        };
        assert!(params.validate().is_err());

        let params = SimParams {
            min_delay: 5,
            max_delay: 2,
            ..SimParams::default()
        };
        assert!(params.validate().is_err());
    }
}

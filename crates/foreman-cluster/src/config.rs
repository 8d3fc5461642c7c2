//! Cluster configuration.

use crate::error::{ClusterError, ClusterResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the leader duties and the scale controller.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ClusterConfig {
    /// Leader configuration.
    #[serde(default)]
    pub leader: LeaderConfig,

    /// Scale controller configuration.
    #[serde(default)]
    pub scale: ScaleConfig,

    /// Duty runner configuration.
    #[serde(default)]
    pub runner: RunnerConfig,
}

impl ClusterConfig {
    /// Validates the full configuration.
    ///
    /// Invalid configuration is fatal at startup; the process must refuse to
    /// run rather than start an oscillating controller.
    pub fn validate(&self) -> ClusterResult<()> {
        self.leader.validate()?;
        self.scale.validate()
    }
}

/// Leader configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderConfig {
    /// Minimum number of active nodes expected in the group.
    #[serde(default = "default_min_active_nodes")]
    pub min_active_nodes: u32,

    /// Maximum total job weight a single node may carry.
    #[serde(default = "default_max_weight_per_node")]
    pub max_weight_per_node: u32,

    /// Minimum age of the oldest node before any node may lead.
    #[serde(default = "default_youngest_leader_age")]
    pub youngest_leader_age_secs: u64,

    /// Whether the leader node also accepts job assignments.
    #[serde(default = "default_leader_also_worker")]
    pub leader_also_worker: bool,
}

impl Default for LeaderConfig {
    fn default() -> Self {
        Self {
            min_active_nodes: default_min_active_nodes(),
            max_weight_per_node: default_max_weight_per_node(),
            youngest_leader_age_secs: default_youngest_leader_age(),
            leader_also_worker: default_leader_also_worker(),
        }
    }
}

impl LeaderConfig {
    /// Returns the youngest-leader age as a Duration.
    pub fn youngest_leader_age(&self) -> Duration {
        Duration::from_secs(self.youngest_leader_age_secs)
    }

    /// Validates the leader configuration.
    pub fn validate(&self) -> ClusterResult<()> {
        if self.max_weight_per_node == 0 {
            return Err(ClusterError::Configuration(
                "max_weight_per_node must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_min_active_nodes() -> u32 {
    1
}

fn default_max_weight_per_node() -> u32 {
    100
}

fn default_youngest_leader_age() -> u64 {
    60
}

fn default_leader_also_worker() -> bool {
    true
}

/// Scale controller configuration.
///
/// Thresholds are integer percentages of cluster utilisation; the dead band
/// between them must be non-empty or the controller will oscillate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScaleConfig {
    /// Minimum number of nodes the controller may drain down to.
    #[serde(default = "default_min_nodes")]
    pub min_nodes: u32,

    /// Maximum number of nodes the controller may grow to.
    #[serde(default = "default_max_nodes")]
    pub max_nodes: u32,

    /// Minimum gap between two scale events.
    #[serde(default = "default_cool_down")]
    pub cool_down_secs: u64,

    /// Utilisation percentage below which scale-down is considered.
    #[serde(default = "default_scale_down_threshold")]
    pub scale_down_threshold: u32,

    /// Utilisation percentage above which scale-up is considered.
    #[serde(default = "default_scale_up_threshold")]
    pub scale_up_threshold: u32,

    /// Duration a threshold breach must persist before acting.
    #[serde(default = "default_evaluation_period")]
    pub evaluation_period_secs: u64,

    /// Number of nodes requested per scale-up event.
    #[serde(default = "default_scale_up_step")]
    pub scale_up_step: u32,

    /// Number of nodes drained per scale-down event.
    #[serde(default = "default_scale_down_step")]
    pub scale_down_step: u32,
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self {
            min_nodes: default_min_nodes(),
            max_nodes: default_max_nodes(),
            cool_down_secs: default_cool_down(),
            scale_down_threshold: default_scale_down_threshold(),
            scale_up_threshold: default_scale_up_threshold(),
            evaluation_period_secs: default_evaluation_period(),
            scale_up_step: default_scale_up_step(),
            scale_down_step: default_scale_down_step(),
        }
    }
}

impl ScaleConfig {
    /// Returns the cool-down period as a Duration.
    pub fn cool_down(&self) -> Duration {
        Duration::from_secs(self.cool_down_secs)
    }

    /// Returns the evaluation period as a Duration.
    pub fn evaluation_period(&self) -> Duration {
        Duration::from_secs(self.evaluation_period_secs)
    }

    /// Validates the scale configuration.
    pub fn validate(&self) -> ClusterResult<()> {
        if self.scale_down_threshold >= self.scale_up_threshold {
            return Err(ClusterError::Configuration(format!(
                "scale_down_threshold ({}) must be below scale_up_threshold ({})",
                self.scale_down_threshold, self.scale_up_threshold
            )));
        }
        if self.max_nodes < self.min_nodes {
            return Err(ClusterError::Configuration(format!(
                "max_nodes ({}) must be at least min_nodes ({})",
                self.max_nodes, self.min_nodes
            )));
        }
        if self.scale_up_step == 0 || self.scale_down_step == 0 {
            return Err(ClusterError::Configuration(
                "scale steps must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_min_nodes() -> u32 {
    1
}

fn default_max_nodes() -> u32 {
    10
}

fn default_cool_down() -> u64 {
    300
}

fn default_scale_down_threshold() -> u32 {
    40
}

fn default_scale_up_threshold() -> u32 {
    80
}

fn default_evaluation_period() -> u64 {
    60
}

fn default_scale_up_step() -> u32 {
    1
}

fn default_scale_down_step() -> u32 {
    1
}

/// Duty runner configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Leader election period in seconds.
    #[serde(default = "default_election_period")]
    pub election_period_secs: u64,

    /// Schedule refresh period in seconds.
    #[serde(default = "default_refresh_period")]
    pub refresh_period_secs: u64,

    /// Job queueing period in seconds.
    #[serde(default = "default_queue_period")]
    pub queue_period_secs: u64,

    /// Job assignment period in seconds.
    #[serde(default = "default_assign_period")]
    pub assign_period_secs: u64,

    /// Dead-node recovery period in seconds.
    #[serde(default = "default_recover_period")]
    pub recover_period_secs: u64,

    /// Scale evaluation period in seconds.
    #[serde(default = "default_scale_period")]
    pub scale_period_secs: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            election_period_secs: default_election_period(),
            refresh_period_secs: default_refresh_period(),
            queue_period_secs: default_queue_period(),
            assign_period_secs: default_assign_period(),
            recover_period_secs: default_recover_period(),
            scale_period_secs: default_scale_period(),
        }
    }
}

impl RunnerConfig {
    /// Returns the election period as a Duration.
    pub fn election_period(&self) -> Duration {
        Duration::from_secs(self.election_period_secs)
    }

    /// Returns the refresh period as a Duration.
    pub fn refresh_period(&self) -> Duration {
        Duration::from_secs(self.refresh_period_secs)
    }

    /// Returns the queue period as a Duration.
    pub fn queue_period(&self) -> Duration {
        Duration::from_secs(self.queue_period_secs)
    }

    /// Returns the assign period as a Duration.
    pub fn assign_period(&self) -> Duration {
        Duration::from_secs(self.assign_period_secs)
    }

    /// Returns the recovery period as a Duration.
    pub fn recover_period(&self) -> Duration {
        Duration::from_secs(self.recover_period_secs)
    }

    /// Returns the scale period as a Duration.
    pub fn scale_period(&self) -> Duration {
        Duration::from_secs(self.scale_period_secs)
    }
}

fn default_election_period() -> u64 {
    15
}

fn default_refresh_period() -> u64 {
    60
}

fn default_queue_period() -> u64 {
    10
}

fn default_assign_period() -> u64 {
    10
}

fn default_recover_period() -> u64 {
    30
}

fn default_scale_period() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ClusterConfig::default().validate().is_ok());
    }

    #[test]
    fn test_empty_dead_band_rejected() {
        let config = ScaleConfig {
            scale_down_threshold: 80,
            scale_up_threshold: 80,
            ..ScaleConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ClusterError::Configuration(_))
        ));
    }

    #[test]
    fn test_inverted_node_bounds_rejected() {
        let config = ScaleConfig {
            min_nodes: 10,
            max_nodes: 3,
            ..ScaleConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ClusterError::Configuration(_))
        ));
    }

    #[test]
    fn test_zero_step_rejected() {
        let config = ScaleConfig {
            scale_up_step: 0,
            ..ScaleConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_weight_rejected() {
        let config = LeaderConfig {
            max_weight_per_node: 0,
            ..LeaderConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duration_accessors() {
        let config = ScaleConfig {
            cool_down_secs: 60,
            evaluation_period_secs: 30,
            ..ScaleConfig::default()
        };
        assert_eq!(config.cool_down(), Duration::from_secs(60));
        assert_eq!(config.evaluation_period(), Duration::from_secs(30));
    }
}

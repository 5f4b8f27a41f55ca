use std::time::Duration;

use crate::error::GossipError;

/// Tuning knobs for the periodic gossip loop.
#[derive(Debug, Clone)]
pub struct GossipConfig {
    /// How long to wait between gossip rounds.
    gossip_interval: Duration,
    /// How long a single peer exchange may take before its delta is
    /// considered undelivered (and therefore not committed).
    gossip_request_timeout: Duration,
    /// How many peers to contact per round.
    gossip_fanout: usize,
    /// Maximum number of members whose state a single delta may carry.
    gossip_max_send: usize,
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            gossip_interval: Duration::from_millis(300),
            gossip_request_timeout: Duration::from_millis(500),
            gossip_fanout: 3,
            gossip_max_send: 50,
        }
    }
}

impl GossipConfig {
    /// Set the gossip interval (validated) and return the updated config.
    pub fn with_interval(mut self, gossip_interval: Duration) -> Result<Self, GossipError> {
        if gossip_interval.is_zero() {
            return Err(GossipError::InvalidConfiguration(
                "gossip interval must be positive".to_string(),
            ));
        }
        self.gossip_interval = gossip_interval;
        Ok(self)
    }

    /// Set the per-exchange request timeout (validated) and return the updated config.
    pub fn with_request_timeout(
        mut self,
        gossip_request_timeout: Duration,
    ) -> Result<Self, GossipError> {
        if gossip_request_timeout.is_zero() {
            return Err(GossipError::InvalidConfiguration(
                "gossip request timeout must be positive".to_string(),
            ));
        }
        self.gossip_request_timeout = gossip_request_timeout;
        Ok(self)
    }

    /// Set the fanout (validated) and return the updated config.
    pub fn with_fanout(mut self, gossip_fanout: usize) -> Result<Self, GossipError> {
        if gossip_fanout == 0 {
            return Err(GossipError::InvalidConfiguration(
                "gossip fanout must be at least 1".to_string(),
            ));
        }
        self.gossip_fanout = gossip_fanout;
        Ok(self)
    }

    /// Set the per-delta member cap (validated) and return the updated config.
    pub fn with_max_send(mut self, gossip_max_send: usize) -> Result<Self, GossipError> {
        if gossip_max_send == 0 {
            return Err(GossipError::InvalidConfiguration(
                "gossip max send must be at least 1".to_string(),
            ));
        }
        self.gossip_max_send = gossip_max_send;
        Ok(self)
    }

    pub fn gossip_interval(&self) -> Duration {
        self.gossip_interval
    }

    pub fn gossip_request_timeout(&self) -> Duration {
        self.gossip_request_timeout
    }

    pub fn gossip_fanout(&self) -> usize {
        self.gossip_fanout
    }

    pub fn gossip_max_send(&self) -> usize {
        self.gossip_max_send
    }
}

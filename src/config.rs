//! Object manager configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::protocol::ChecksumPolicy;

/// Default interval between retransmissions of an unanswered request.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(1000);

/// Tunables for an [`ObjectManager`](crate::ObjectManager).
///
/// Deserializes from a host application's config file; missing keys take
/// their defaults:
///
/// ```rust
/// use uavtalk::{ChecksumPolicy, ManagerConfig};
///
/// let config: ManagerConfig = serde_json::from_str(r#"{"retry_interval_ms": 250}"#).unwrap();
/// assert_eq!(config.retry_interval.as_millis(), 250);
/// assert_eq!(config.checksum_policy, ChecksumPolicy::Strict);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Interval between retransmissions of an unanswered request
    #[serde(rename = "retry_interval_ms", with = "millis")]
    pub retry_interval: Duration,
    /// Handling of inbound frames with a bad checksum
    pub checksum_policy: ChecksumPolicy,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self { retry_interval: DEFAULT_RETRY_INTERVAL, checksum_policy: ChecksumPolicy::Strict }
    }
}

impl ManagerConfig {
    pub fn with_retry_interval(mut self, retry_interval: Duration) -> Self {
        self.retry_interval = retry_interval;
        self
    }

    pub fn with_checksum_policy(mut self, checksum_policy: ChecksumPolicy) -> Self {
        self.checksum_policy = checksum_policy;
        self
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

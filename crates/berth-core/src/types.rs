//! Domain types shared by every berth crate.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque container identifier, stable for the life of one container.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerId(String);

impl ContainerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContainerId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ContainerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// The host's presence record, asserted by the machine registrar.
///
/// Resolved once at startup and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostRecord {
    pub host_id: String,
    /// Opaque metadata blob stored as the record value.
    pub metadata: serde_json::Value,
}

impl HostRecord {
    pub fn new(host_id: impl Into<String>, metadata: serde_json::Value) -> Self {
        Self {
            host_id: host_id.into(),
            metadata,
        }
    }

    /// A degraded record: known identifier, empty metadata object.
    pub fn bare(host_id: impl Into<String>) -> Self {
        Self::new(host_id, serde_json::Value::Object(serde_json::Map::new()))
    }

    /// Bytes written to the registry for this record.
    pub fn to_value(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&self.metadata)
    }
}

/// Kind of a container lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Start,
    Stop,
    /// Any other action (`die`, `create`, image events, ...). No registry side effect.
    Other(String),
}

impl EventKind {
    pub fn from_action(action: &str) -> Self {
        match action {
            "start" => Self::Start,
            "stop" => Self::Stop,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => f.write_str("start"),
            Self::Stop => f.write_str("stop"),
            Self::Other(action) => f.write_str(action),
        }
    }
}

/// A single start/stop notification from the runtime event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleEvent {
    pub container_id: ContainerId,
    pub kind: EventKind,
}

impl LifecycleEvent {
    pub fn start(id: impl Into<ContainerId>) -> Self {
        Self {
            container_id: id.into(),
            kind: EventKind::Start,
        }
    }

    pub fn stop(id: impl Into<ContainerId>) -> Self {
        Self {
            container_id: id.into(),
            kind: EventKind::Stop,
        }
    }

    pub fn other(id: impl Into<ContainerId>, action: &str) -> Self {
        Self {
            container_id: id.into(),
            kind: EventKind::Other(action.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_id_serializes_as_plain_string() {
        let id = ContainerId::new("abc123");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc123\"");
        assert_eq!(id.to_string(), "abc123");
    }

    #[test]
    fn bare_host_record_has_empty_metadata() {
        let record = HostRecord::bare("ip-10-0-0-1");
        assert_eq!(record.metadata, serde_json::json!({}));
        assert_eq!(record.to_value().unwrap(), b"{}");
    }

    #[test]
    fn event_kind_from_action() {
        assert_eq!(EventKind::from_action("start"), EventKind::Start);
        assert_eq!(EventKind::from_action("stop"), EventKind::Stop);
        assert_eq!(
            EventKind::from_action("die"),
            EventKind::Other("die".to_string())
        );
    }
}

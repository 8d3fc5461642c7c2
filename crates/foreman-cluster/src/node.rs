//! Cluster node records.

use chrono::{DateTime, Duration, Utc};
use foreman_core::{GroupName, NodeId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque, lexically ordered node software version.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeVersion(pub String);

impl NodeVersion {
    /// Creates a version from a string.
    pub fn new(version: impl Into<String>) -> Self {
        Self(version.into())
    }

    /// Returns the version as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeVersion {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Node version requirement declared by a scheduled job.
///
/// The default accepts any node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VersionRule {
    /// Any node version is acceptable.
    #[default]
    Any,
    /// The node version must be at least the given version.
    AtLeast(NodeVersion),
    /// The node version must match exactly.
    Exactly(NodeVersion),
}

impl VersionRule {
    /// Returns true if the given node version satisfies this rule.
    pub fn accepts(&self, version: &NodeVersion) -> bool {
        match self {
            VersionRule::Any => true,
            VersionRule::AtLeast(min) => version >= min,
            VersionRule::Exactly(exact) => version == exact,
        }
    }
}

/// A registered worker node.
///
/// `active = false` means the node is being drained: the assigner stops
/// placing jobs on it and the scale controller removes it once idle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Cloud-assigned node identifier.
    pub id: NodeId,

    /// Group this node belongs to.
    pub group: GroupName,

    /// When this node joined the cluster.
    pub join_time: DateTime<Utc>,

    /// Whether this node accepts new assignments.
    pub active: bool,

    /// Node software version.
    pub version: NodeVersion,
}

impl Node {
    /// Creates a new active node.
    pub fn new(
        id: impl Into<NodeId>,
        group: impl Into<GroupName>,
        join_time: DateTime<Utc>,
        version: impl Into<NodeVersion>,
    ) -> Self {
        Self {
            id: id.into(),
            group: group.into(),
            join_time,
            active: true,
            version: version.into(),
        }
    }

    /// Returns how long this node has been a cluster member.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.join_time
    }
}

impl From<String> for NodeVersion {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Identity of the local process within the cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalNode {
    /// This node's identifier.
    pub id: NodeId,

    /// The group this node belongs to.
    pub group: GroupName,
}

impl LocalNode {
    /// Creates a local node identity.
    pub fn new(id: impl Into<NodeId>, group: impl Into<GroupName>) -> Self {
        Self {
            id: id.into(),
            group: group.into(),
        }
    }
}

//! Record identifiers and links between records.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Weak};

use crate::error::{OrientError, Result};
use crate::record::Document;

/// A record id: the cluster a record lives in and its position there.
///
/// Displayed and parsed in the server's `#cluster:position` notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Rid {
    /// Cluster id.
    pub cluster_id: i16,
    /// Position inside the cluster.
    pub cluster_position: i64,
}

impl Rid {
    /// The id the server uses for "no record".
    pub const NULL: Rid = Rid {
        cluster_id: -1,
        cluster_position: -1,
    };

    /// Creates a record id.
    pub fn new(cluster_id: i16, cluster_position: i64) -> Self {
        Self {
            cluster_id,
            cluster_position,
        }
    }

    /// Returns true for ids that point at a stored record.
    pub fn is_persistent(&self) -> bool {
        self.cluster_id >= 0 && self.cluster_position >= 0
    }
}

impl fmt::Display for Rid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}:{}", self.cluster_id, self.cluster_position)
    }
}

impl FromStr for Rid {
    type Err = OrientError;

    fn from_str(s: &str) -> Result<Self> {
        let body = s.trim().trim_start_matches('#');
        let (cluster, position) = body
            .split_once(':')
            .ok_or_else(|| OrientError::Serialization(format!("invalid record id: {}", s)))?;
        let cluster_id = cluster.parse::<i16>().map_err(|e| {
            OrientError::Serialization(format!("invalid cluster id in {}: {}", s, e))
        })?;
        let cluster_position = position.parse::<i64>().map_err(|e| {
            OrientError::Serialization(format!("invalid cluster position in {}: {}", s, e))
        })?;
        Ok(Self::new(cluster_id, cluster_position))
    }
}

/// A reference to another record.
///
/// A link owns only the record id. It may additionally remember a cached,
/// already loaded copy of the target; that reference is weak, so links never
/// keep records alive. Equality and hashing look at the id alone.
#[derive(Clone)]
pub struct Link {
    rid: Rid,
    record: Option<Weak<Document>>,
}

impl Link {
    /// Creates an unresolved link.
    pub fn new(rid: Rid) -> Self {
        Self { rid, record: None }
    }

    /// Creates a link that remembers an in-memory copy of its target.
    pub fn resolved(rid: Rid, record: &Arc<Document>) -> Self {
        Self {
            rid,
            record: Some(Arc::downgrade(record)),
        }
    }

    /// Returns the target record id.
    pub fn rid(&self) -> Rid {
        self.rid
    }

    /// Returns the cached target, if one was attached and is still alive.
    pub fn record(&self) -> Option<Arc<Document>> {
        self.record.as_ref().and_then(Weak::upgrade)
    }

    /// Attaches a cached copy of the target.
    pub fn resolve(&mut self, record: &Arc<Document>) {
        self.record = Some(Arc::downgrade(record));
    }
}

impl From<Rid> for Link {
    fn from(rid: Rid) -> Self {
        Self::new(rid)
    }
}

impl PartialEq for Link {
    fn eq(&self, other: &Self) -> bool {
        self.rid == other.rid
    }
}

impl Eq for Link {}

impl std::hash::Hash for Link {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.rid.hash(state);
    }
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link")
            .field("rid", &self.rid)
            .field("resolved", &self.record().is_some())
            .finish()
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.rid.fmt(f)
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{MemoryId, SessionId};

/// Kind of fact a memory record captures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    Preference,
    Decision,
    Fact,
    Entity,
    Relationship,
}

impl MemoryType {
    pub const ALL: [MemoryType; 5] = [
        MemoryType::Preference,
        MemoryType::Decision,
        MemoryType::Fact,
        MemoryType::Entity,
        MemoryType::Relationship,
    ];

    pub fn as_db_str(&self) -> &'static str {
        match self {
            Self::Preference => "preference",
            Self::Decision => "decision",
            Self::Fact => "fact",
            Self::Entity => "entity",
            Self::Relationship => "relationship",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        Self::ALL.iter().find(|t| t.as_db_str() == s).copied()
    }

    /// Initial importance before the surprise bonus is added.
    pub fn base_importance(&self) -> f64 {
        match self {
            Self::Preference => 0.7,
            Self::Decision => 0.8,
            Self::Fact => 0.6,
            Self::Entity => 0.4,
            Self::Relationship => 0.5,
        }
    }
}

/// A stored long-term memory.
///
/// Owned by the memory store, which is the sole writer; readers get copies.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: MemoryId,
    pub session_id: Option<SessionId>,
    pub content: String,
    pub memory_type: MemoryType,
    pub category: String,
    /// Clamped to [0, 1].
    pub importance: f64,
    /// Clamped to [0, 1].
    pub surprise_score: f64,
    pub access_count: i64,
    /// Monotone non-increasing with time since last access.
    pub decay_factor: f64,
    pub source_turn_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub metadata: Value,
}

impl MemoryRecord {
    /// Ranking score: importance × decay × (1 + ln(1 + accesses)).
    pub fn effective_score(&self) -> f64 {
        self.importance * self.decay_factor * (1.0 + (1.0 + self.access_count as f64).ln())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_importance_by_type() {
        assert_eq!(MemoryType::Decision.base_importance(), 0.8);
        assert_eq!(MemoryType::Entity.base_importance(), 0.4);
    }

    #[test]
    fn test_db_str_roundtrip() {
        for t in MemoryType::ALL {
            assert_eq!(MemoryType::from_db_str(t.as_db_str()), Some(t));
        }
        assert_eq!(MemoryType::from_db_str("unknown"), None);
    }

    #[test]
    fn test_effective_score_grows_with_access() {
        let mut rec = MemoryRecord {
            id: MemoryId::new(),
            session_id: None,
            content: "x".into(),
            memory_type: MemoryType::Fact,
            category: "general".into(),
            importance: 0.6,
            surprise_score: 0.5,
            access_count: 0,
            decay_factor: 1.0,
            source_turn_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            last_accessed_at: Utc::now(),
            metadata: Value::Null,
        };
        let fresh = rec.effective_score();
        rec.access_count = 10;
        assert!(rec.effective_score() > fresh);
    }
}

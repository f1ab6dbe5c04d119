//! Per-document access control.
//!
//! Levels are ordered `None < Read < ReadWrite`. The creating agent is the
//! owner and always holds `ReadWrite`; agents without an entry hold `None`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{DocError, Result};
use crate::ids::{AgentId, DocumentId};

/// Permission level of one agent on one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    #[default]
    None,
    Read,
    ReadWrite,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::None => "none",
            Permission::Read => "read",
            Permission::ReadWrite => "read_write",
        }
    }

    /// Whether this level satisfies `required`.
    pub fn allows(&self, required: Permission) -> bool {
        *self >= required
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = DocError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(Permission::None),
            "read" => Ok(Permission::Read),
            "read_write" => Ok(Permission::ReadWrite),
            other => Err(DocError::invalid(format!("unknown permission level '{other}'"))),
        }
    }
}

/// Parse a wire-level `agent -> "read" | "read_write"` map.
pub fn parse_grants(raw: &HashMap<String, String>) -> Result<HashMap<AgentId, Permission>> {
    raw.iter()
        .map(|(agent, level)| Ok((AgentId::new(agent.clone()), level.parse()?)))
        .collect()
}

/// Mutable access map of a single document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessControl {
    owner: AgentId,
    grants: HashMap<AgentId, Permission>,
}

impl AccessControl {
    pub fn new(owner: AgentId) -> Self {
        Self::with_grants(owner, HashMap::new())
    }

    /// Build from explicit grants. The owner is forced to `ReadWrite`.
    pub fn with_grants(owner: AgentId, mut grants: HashMap<AgentId, Permission>) -> Self {
        grants.retain(|_, level| *level != Permission::None);
        grants.insert(owner.clone(), Permission::ReadWrite);
        Self { owner, grants }
    }

    pub fn owner(&self) -> &AgentId {
        &self.owner
    }

    pub fn is_owner(&self, agent: &AgentId) -> bool {
        &self.owner == agent
    }

    pub fn level(&self, agent: &AgentId) -> Permission {
        if self.is_owner(agent) {
            return Permission::ReadWrite;
        }
        self.grants.get(agent).copied().unwrap_or_default()
    }

    /// Fail with `PermissionDenied` unless `agent` holds at least `required`.
    pub fn check(&self, document_id: DocumentId, agent: &AgentId, required: Permission) -> Result<()> {
        if self.level(agent).allows(required) {
            Ok(())
        } else {
            Err(DocError::PermissionDenied {
                agent: agent.clone(),
                document_id,
                required,
            })
        }
    }

    /// Fail with `PermissionDenied` unless `agent` owns the document.
    pub fn check_owner(&self, document_id: DocumentId, agent: &AgentId) -> Result<()> {
        if self.is_owner(agent) {
            Ok(())
        } else {
            Err(DocError::PermissionDenied {
                agent: agent.clone(),
                document_id,
                required: Permission::ReadWrite,
            })
        }
    }

    /// Set an agent's level. `None` removes the entry.
    pub fn set(&mut self, agent: AgentId, level: Permission) -> Result<()> {
        if self.is_owner(&agent) && level != Permission::ReadWrite {
            return Err(DocError::invalid("the owner's access cannot be lowered"));
        }
        if level == Permission::None {
            self.grants.remove(&agent);
        } else {
            self.grants.insert(agent, level);
        }
        Ok(())
    }

    /// Entries sorted by agent, owner included.
    pub fn entries(&self) -> Vec<(AgentId, Permission)> {
        let mut entries: Vec<_> = self.grants.iter().map(|(a, p)| (a.clone(), *p)).collect();
        entries.sort();
        entries
    }
}

//! Coarse role model for the operator surface.
//!
//! Three ranked roles: observers read, operators work events, coordinators
//! additionally escalate, override severity, reopen and manage alerts.
//! Fine-grained jurisdiction scoping is out of scope here.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorRole {
    Observer,
    Operator,
    Coordinator,
}

impl fmt::Display for OperatorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Observer => write!(f, "observer"),
            Self::Operator => write!(f, "operator"),
            Self::Coordinator => write!(f, "coordinator"),
        }
    }
}

/// Authenticated caller identity attached to every operator request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorContext {
    pub operator_id: String,
    pub role: OperatorRole,
}

impl OperatorContext {
    pub fn new(operator_id: impl Into<String>, role: OperatorRole) -> Self {
        Self {
            operator_id: operator_id.into(),
            role,
        }
    }
}

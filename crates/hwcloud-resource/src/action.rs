//! Planning the action that brings a resource to its desired configuration

use crate::schema::ResourceSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Type of action to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Create a new resource
    Create,
    /// Update mutable arguments in place
    Update,
    /// Delete and recreate because an immutable argument changed
    Replace,
    /// Delete a resource
    Delete,
    /// No changes needed
    NoOp,
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionType::Create => write!(f, "create"),
            ActionType::Update => write!(f, "update"),
            ActionType::Replace => write!(f, "replace"),
            ActionType::Delete => write!(f, "delete"),
            ActionType::NoOp => write!(f, "no-op"),
        }
    }
}

/// Planned action together with the arguments that caused it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Plan {
    pub action_type: ActionType,

    /// Arguments whose value changes
    pub changed: Vec<&'static str>,

    /// Changed arguments that force replacement
    pub forces_replacement: Vec<&'static str>,
}

impl Plan {
    pub fn has_changes(&self) -> bool {
        self.action_type != ActionType::NoOp
    }
}

impl std::fmt::Display for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.action_type)?;
        if !self.forces_replacement.is_empty() {
            write!(f, " (forced by {})", self.forces_replacement.join(", "))?;
        } else if !self.changed.is_empty() {
            write!(f, " ({})", self.changed.join(", "))?;
        }
        Ok(())
    }
}

/// Compare the prior configuration with the desired one.
/// `None` on either side means the resource is absent there.
pub fn plan(schema: &ResourceSchema, prior: Option<&Value>, desired: Option<&Value>) -> Plan {
    let (action_type, changed, forces_replacement) = match (prior, desired) {
        (None, None) => (ActionType::NoOp, Vec::new(), Vec::new()),
        (None, Some(_)) => (ActionType::Create, Vec::new(), Vec::new()),
        (Some(_), None) => (ActionType::Delete, Vec::new(), Vec::new()),
        (Some(prior), Some(desired)) => {
            let changed = schema.changed_fields(prior, desired);
            let replace = schema.replacement_fields(prior, desired);
            let action = if !replace.is_empty() {
                ActionType::Replace
            } else if !changed.is_empty() {
                ActionType::Update
            } else {
                ActionType::NoOp
            };
            (action, changed, replace)
        }
    };

    Plan {
        action_type,
        changed,
        forces_replacement,
    }
}

pub fn plan_action(
    schema: &ResourceSchema,
    prior: Option<&Value>,
    desired: Option<&Value>,
) -> ActionType {
    plan(schema, prior, desired).action_type
}

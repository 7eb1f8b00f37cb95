//! Resolved user identity
//!
//! Authentication and sessions live in an external layer; the engine only
//! ever sees the resolved `(user id, role)` pair that layer produces.

use serde::{Deserialize, Serialize};

/// Staff roles, matching the backing system's user table.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Counter staff: full read access, edits, confirmations, cancellations
    Cashier,
    /// Warehouse picker: reads plus status transitions for preparation
    Picker,
    /// Wall display: read-only
    Display,
}

impl Role {
    /// May edit order lines and confirm/cancel orders.
    pub fn can_edit_orders(&self) -> bool {
        matches!(self, Role::Cashier)
    }

    /// May move an order through the preparation flow.
    pub fn can_change_status(&self) -> bool {
        matches!(self, Role::Cashier | Role::Picker)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Role::Cashier => "cashier",
            Role::Picker => "picker",
            Role::Display => "display",
        };
        write!(f, "{}", s)
    }
}

/// The resolved user attached to a request by the external auth layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CurrentUser {
    pub user_id: String,
    pub role: Role,
    /// Pickers are bound to one department
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
}

impl CurrentUser {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
            department: None,
        }
    }

    pub fn with_department(mut self, department: impl Into<String>) -> Self {
        self.department = Some(department.into());
        self
    }
}

//! Role permission checks for order mutations.
//!
//! Reads are open to every resolved user; only mutations are gated.

use shared::CurrentUser;

use crate::utils::AppError;

/// Line edits, confirmations and cancellations: cashiers only.
pub fn require_edit(user: &CurrentUser) -> Result<(), AppError> {
    if user.role.can_edit_orders() {
        Ok(())
    } else {
        Err(AppError::forbidden(format!(
            "role {} may not edit orders",
            user.role
        )))
    }
}

/// Preparation-flow status changes: cashiers and pickers.
pub fn require_status_change(user: &CurrentUser) -> Result<(), AppError> {
    if user.role.can_change_status() {
        Ok(())
    } else {
        Err(AppError::forbidden(format!(
            "role {} may not change order status",
            user.role
        )))
    }
}

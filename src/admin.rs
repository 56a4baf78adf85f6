use tracing::{debug, warn};

use crate::auth::AuthUser;
use crate::errors::ServiceError;

/// Privileged operations driven from the administrative surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum AdminAction {
    ListOrders,
    UpdateOrderStatus,
    DeleteOrder,
    OverrideSettlement,
}

/// Re-checks the admin claim immediately before a privileged mutation.
///
/// Callers higher up the stack gate on the same claim; this check runs again
/// at the boundary so a missed outer check can never reach the store.
pub fn authorize(actor: &AuthUser, action: AdminAction) -> Result<(), ServiceError> {
    if actor.is_admin() {
        debug!(user_id = %actor.user_id, action = %action, "admin action authorized");
        Ok(())
    } else {
        warn!(
            user_id = %actor.user_id,
            action = %action,
            "admin action denied: caller lacks admin claim"
        );
        Err(ServiceError::Unauthorized(format!(
            "Administrator access required for {}",
            action
        )))
    }
}

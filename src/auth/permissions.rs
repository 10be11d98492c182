/*!
 * # Permissions Module
 *
 * Permissions are `resource:action` strings derived from the account role
 * and embedded in access tokens.
 */

use crate::entities::user::UserRole;

/// Common permission string constants for compile-time safety
pub mod consts {
    // Catalog
    pub const CATALOG_WRITE: &str = "catalog:write";
    pub const CATALOG_READ_INACTIVE: &str = "catalog:read_inactive";

    // Orders
    pub const ORDERS_READ_OWN: &str = "orders:read_own";
    pub const ORDERS_CANCEL_OWN: &str = "orders:cancel_own";
    pub const ORDERS_READ: &str = "orders:read";
    pub const ORDERS_UPDATE: &str = "orders:update";
    pub const ORDERS_DELETE: &str = "orders:delete";

    // Shipments
    pub const SHIPMENTS_CREATE: &str = "shipments:create";

    // Dashboard
    pub const DASHBOARD_READ: &str = "dashboard:read";

    // Users
    pub const ACCOUNT_MANAGE: &str = "account:manage";
    pub const USERS_MANAGE: &str = "users:manage";
}

const USER_PERMISSIONS: &[&str] = &[
    consts::ACCOUNT_MANAGE,
    consts::ORDERS_READ_OWN,
    consts::ORDERS_CANCEL_OWN,
];

const ADMIN_PERMISSIONS: &[&str] = &[
    consts::ACCOUNT_MANAGE,
    consts::ORDERS_READ_OWN,
    consts::ORDERS_CANCEL_OWN,
    consts::CATALOG_WRITE,
    consts::CATALOG_READ_INACTIVE,
    consts::ORDERS_READ,
    consts::ORDERS_UPDATE,
    consts::ORDERS_DELETE,
    consts::SHIPMENTS_CREATE,
    consts::DASHBOARD_READ,
    consts::USERS_MANAGE,
];

/// Permissions granted to a role
pub fn permissions_for_role(role: UserRole) -> Vec<String> {
    let granted = match role {
        UserRole::Admin => ADMIN_PERMISSIONS,
        UserRole::User => USER_PERMISSIONS,
    };
    granted.iter().map(|p| p.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn users_cannot_manage_catalog() {
        let perms = permissions_for_role(UserRole::User);
        assert!(perms.contains(&consts::ORDERS_READ_OWN.to_string()));
        assert!(!perms.contains(&consts::CATALOG_WRITE.to_string()));
        assert!(!perms.contains(&consts::DASHBOARD_READ.to_string()));
    }

    #[test]
    fn admins_hold_every_user_permission() {
        let admin = permissions_for_role(UserRole::Admin);
        for perm in permissions_for_role(UserRole::User) {
            assert!(admin.contains(&perm), "admin missing {perm}");
        }
    }
}

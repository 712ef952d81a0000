//! Access Control Module
//!
//! Role-based access control for the lending pool.
//!
//! Each role carries an explicit capability set. Privileged operations ask
//! for a `Permission` at their entry point, never for a role directly.

use alloc::{vec, vec::Vec};

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::errors::{LendError, LendResult};
use crate::types::{Address, ZERO_ADDRESS};

// ============================================================================
// Types
// ============================================================================

/// Protocol roles
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord,
    Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub enum Role {
    /// Reserve setup, vault allocation, role management
    PoolAdmin,
    /// Can pause/unpause the pool
    EmergencyAdmin,
    /// Owns collateral risk parameters
    LtvManager,
    /// Publishes oracle prices
    PriceManager,
}

/// Capabilities checked by privileged operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    /// Initialize and configure reserves
    ConfigureReserve,
    /// Rebalance idle liquidity into yield vaults
    ManageVault,
    /// Grant and revoke roles
    GrantRole,
    /// Pause or unpause the pool
    Pause,
    /// Configure NFT collections as collateral
    ConfigureCollateral,
    /// Publish prices
    UpdatePrice,
}

impl Role {
    /// Capability set of this role
    pub fn permissions(&self) -> &'static [Permission] {
        match self {
            Role::PoolAdmin => &[
                Permission::ConfigureReserve,
                Permission::ManageVault,
                Permission::GrantRole,
            ],
            Role::EmergencyAdmin => &[Permission::Pause],
            Role::LtvManager => &[Permission::ConfigureCollateral],
            Role::PriceManager => &[Permission::UpdatePrice],
        }
    }

    /// Whether the role grants a permission
    pub fn grants(&self, permission: Permission) -> bool {
        self.permissions().contains(&permission)
    }
}

impl Permission {
    /// Stable name used in error messages
    pub fn name(&self) -> &'static str {
        match self {
            Permission::ConfigureReserve => "configure_reserve",
            Permission::ManageVault => "manage_vault",
            Permission::GrantRole => "grant_role",
            Permission::Pause => "pause",
            Permission::ConfigureCollateral => "configure_collateral",
            Permission::UpdatePrice => "update_price",
        }
    }
}

/// Role assignment for an address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct RoleAssignment {
    /// Address with the role
    pub address: Address,
    /// Assigned role
    pub role: Role,
    /// Timestamp when the role was granted
    pub granted_at: u64,
    /// Address that granted the role
    pub granted_by: Address,
}

/// Access control state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct AccessControlState {
    /// Deployer; always keeps `PoolAdmin`
    pub super_admin: Address,
    /// Active role assignments
    pub assignments: Vec<RoleAssignment>,
    /// Last change timestamp
    pub last_update: u64,
}

impl AccessControlState {
    /// Create new access control state with the super admin as pool admin
    pub fn new(super_admin: Address, now: u64) -> Self {
        Self {
            super_admin,
            assignments: vec![RoleAssignment {
                address: super_admin,
                role: Role::PoolAdmin,
                granted_at: now,
                granted_by: super_admin,
            }],
            last_update: now,
        }
    }
}

// ============================================================================
// Core Access Control Functions
// ============================================================================

/// Check if address has a specific role
pub fn has_role(state: &AccessControlState, address: &Address, role: Role) -> bool {
    state
        .assignments
        .iter()
        .any(|a| a.address == *address && a.role == role)
}

/// Check if address holds any role granting the permission
pub fn has_permission(state: &AccessControlState, address: &Address, permission: Permission) -> bool {
    state
        .assignments
        .iter()
        .any(|a| a.address == *address && a.role.grants(permission))
}

/// Fail unless the address holds the permission
pub fn require_permission(
    state: &AccessControlState,
    address: &Address,
    permission: Permission,
) -> LendResult<()> {
    if has_permission(state, address, permission) {
        Ok(())
    } else {
        Err(LendError::MissingPermission {
            caller: *address,
            permission: permission.name(),
        })
    }
}

/// Grant a role
pub fn grant_role(
    state: &mut AccessControlState,
    granter: Address,
    address: Address,
    role: Role,
    now: u64,
) -> LendResult<()> {
    require_permission(state, &granter, Permission::GrantRole)?;

    if address == ZERO_ADDRESS {
        return Err(LendError::InvalidInput {
            param: "address",
            reason: "zero address",
        });
    }

    if has_role(state, &address, role) {
        return Err(LendError::InvalidInput {
            param: "role",
            reason: "already granted",
        });
    }

    state.assignments.push(RoleAssignment {
        address,
        role,
        granted_at: now,
        granted_by: granter,
    });
    state.last_update = now;

    Ok(())
}

/// Revoke a role
pub fn revoke_role(
    state: &mut AccessControlState,
    revoker: Address,
    address: Address,
    role: Role,
    now: u64,
) -> LendResult<()> {
    require_permission(state, &revoker, Permission::GrantRole)?;

    // Cannot strip the super admin of pool admin
    if address == state.super_admin && role == Role::PoolAdmin {
        return Err(LendError::Unauthorized {
            caller: revoker,
            reason: "super admin keeps pool admin",
        });
    }

    let before = state.assignments.len();
    state
        .assignments
        .retain(|a| !(a.address == address && a.role == role));

    if state.assignments.len() == before {
        return Err(LendError::InvalidInput {
            param: "role",
            reason: "not granted",
        });
    }

    state.last_update = now;
    Ok(())
}

/// Get all roles for an address
pub fn get_roles(state: &AccessControlState, address: &Address) -> Vec<Role> {
    state
        .assignments
        .iter()
        .filter(|a| a.address == *address)
        .map(|a| a.role)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn super_admin() -> Address {
        [1u8; 32]
    }

    fn guardian() -> Address {
        [2u8; 32]
    }

    fn risk_manager() -> Address {
        [3u8; 32]
    }

    #[test]
    fn test_new_state() {
        let state = AccessControlState::new(super_admin(), 100);
        assert!(has_role(&state, &super_admin(), Role::PoolAdmin));
        assert!(has_permission(&state, &super_admin(), Permission::GrantRole));
        assert!(!has_permission(&state, &super_admin(), Permission::Pause));
    }

    #[test]
    fn test_grant_role() {
        let mut state = AccessControlState::new(super_admin(), 100);

        grant_role(&mut state, super_admin(), guardian(), Role::EmergencyAdmin, 101).unwrap();

        assert!(has_role(&state, &guardian(), Role::EmergencyAdmin));
        assert!(has_permission(&state, &guardian(), Permission::Pause));
        assert!(!has_permission(&state, &guardian(), Permission::ConfigureCollateral));
    }

    #[test]
    fn test_grant_role_unauthorized() {
        let mut state = AccessControlState::new(super_admin(), 100);

        let result = grant_role(&mut state, guardian(), risk_manager(), Role::LtvManager, 101);
        assert!(matches!(result, Err(LendError::MissingPermission { .. })));
    }

    #[test]
    fn test_grant_twice_rejected() {
        let mut state = AccessControlState::new(super_admin(), 100);
        grant_role(&mut state, super_admin(), risk_manager(), Role::LtvManager, 101).unwrap();
        assert!(grant_role(&mut state, super_admin(), risk_manager(), Role::LtvManager, 102).is_err());
    }

    #[test]
    fn test_revoke_role() {
        let mut state = AccessControlState::new(super_admin(), 100);
        grant_role(&mut state, super_admin(), risk_manager(), Role::LtvManager, 101).unwrap();

        revoke_role(&mut state, super_admin(), risk_manager(), Role::LtvManager, 102).unwrap();

        assert!(!has_role(&state, &risk_manager(), Role::LtvManager));
        assert!(require_permission(&state, &risk_manager(), Permission::ConfigureCollateral).is_err());
    }

    #[test]
    fn test_cannot_revoke_super_admin() {
        let mut state = AccessControlState::new(super_admin(), 100);

        let result = revoke_role(&mut state, super_admin(), super_admin(), Role::PoolAdmin, 101);
        assert!(matches!(result, Err(LendError::Unauthorized { .. })));
    }

    #[test]
    fn test_get_roles() {
        let mut state = AccessControlState::new(super_admin(), 100);
        grant_role(&mut state, super_admin(), super_admin(), Role::EmergencyAdmin, 101).unwrap();

        let roles = get_roles(&state, &super_admin());
        assert_eq!(roles, vec![Role::PoolAdmin, Role::EmergencyAdmin]);
    }

    #[test]
    fn test_role_capabilities_disjoint() {
        assert!(Role::LtvManager.grants(Permission::ConfigureCollateral));
        assert!(!Role::PoolAdmin.grants(Permission::ConfigureCollateral));
        assert!(Role::PriceManager.grants(Permission::UpdatePrice));
        assert!(!Role::EmergencyAdmin.grants(Permission::UpdatePrice));
    }
}

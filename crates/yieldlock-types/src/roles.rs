//! Role-keyed permission table
//!
//! Every component owns one [`PermissionTable`]. Gated operations go through
//! [`PermissionTable::require`] (or [`PermissionTable::require_any`]) instead of comparing
//! addresses inline, and role reassignment follows the [`Reassign`] policy declared when the
//! role is granted.

use crate::{Address, ProtocolError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Owner,
    FeeManager,
    PoolManager,
    VoteDelegate,
    RewardManager,
    /// Capability held by the booster over the proxy, factories and ledgers.
    Operator,
    /// Capability held by the locker over the proxy's escrow position.
    Depositor,
    /// The primary ledger a secondary ledger mirrors.
    PrimaryLedger,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Owner => "owner",
            Role::FeeManager => "fee-manager",
            Role::PoolManager => "pool-manager",
            Role::VoteDelegate => "vote-delegate",
            Role::RewardManager => "reward-manager",
            Role::Operator => "operator",
            Role::Depositor => "depositor",
            Role::PrimaryLedger => "primary-ledger",
        };
        f.write_str(name)
    }
}

/// Who may hand a role to someone else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reassign {
    /// Only the current holder.
    Holder,
    /// The current holder or the owner.
    HolderOrOwner,
    /// Only the owner.
    Owner,
}

#[derive(Debug, Clone, Copy)]
struct Grant {
    holder: Address,
    reassign: Reassign,
}

#[derive(Debug, Default)]
pub struct PermissionTable {
    // Guards are synchronous and never held across an await
    grants: RwLock<HashMap<Role, Grant>>,
}

impl PermissionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style grant used while a component is being constructed.
    pub fn with(self, role: Role, holder: Address, reassign: Reassign) -> Self {
        self.grant(role, holder, reassign);
        self
    }

    /// Unconditional grant; not exposed through any gated operation.
    pub fn grant(&self, role: Role, holder: Address, reassign: Reassign) {
        let mut grants = self.grants.write().unwrap_or_else(|e| e.into_inner());
        grants.insert(role, Grant { holder, reassign });
    }

    pub fn holder(&self, role: Role) -> Option<Address> {
        let grants = self.grants.read().unwrap_or_else(|e| e.into_inner());
        grants.get(&role).map(|g| g.holder).filter(|a| !a.is_zero())
    }

    pub fn has(&self, role: Role, caller: Address) -> bool {
        !caller.is_zero() && self.holder(role) == Some(caller)
    }

    /// The single authorization gate.
    pub fn require(&self, role: Role, caller: Address) -> Result<()> {
        if self.has(role, caller) {
            Ok(())
        } else {
            Err(ProtocolError::unauthorized(role.to_string(), caller))
        }
    }

    pub fn require_any(&self, roles: &[Role], caller: Address) -> Result<()> {
        if roles.iter().any(|role| self.has(*role, caller)) {
            Ok(())
        } else {
            let names: Vec<String> = roles.iter().map(|r| r.to_string()).collect();
            Err(ProtocolError::unauthorized(names.join("|"), caller))
        }
    }

    /// Hands `role` to `new_holder` if `caller` is allowed to by the role's policy.
    pub fn reassign(&self, role: Role, caller: Address, new_holder: Address) -> Result<()> {
        let mut grants = self.grants.write().unwrap_or_else(|e| e.into_inner());
        let owner = grants.get(&Role::Owner).map(|g| g.holder);
        let grant = grants
            .get(&role)
            .copied()
            .ok_or_else(|| ProtocolError::unauthorized(role.to_string(), caller))?;

        let is_holder = !caller.is_zero() && grant.holder == caller;
        let is_owner = !caller.is_zero() && owner == Some(caller);
        let allowed = match grant.reassign {
            Reassign::Holder => is_holder,
            Reassign::HolderOrOwner => is_holder || is_owner,
            Reassign::Owner => is_owner,
        };
        if !allowed {
            return Err(ProtocolError::unauthorized(role.to_string(), caller));
        }

        grants.insert(
            role,
            Grant {
                holder: new_holder,
                reassign: grant.reassign,
            },
        );
        info!(role = %role, from = %grant.holder, to = %new_holder, "🔑 Role reassigned");
        Ok(())
    }
}

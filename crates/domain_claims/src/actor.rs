//! Already-authenticated callers and their roles

use serde::{Deserialize, Serialize};

use core_kernel::UserId;

/// Role granted by the identity provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Claimant,
    Agent,
    Admin,
}

/// The user on whose behalf an operation runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub roles: Vec<Role>,
}

impl Actor {
    pub fn new(user_id: UserId, roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            user_id,
            roles: roles.into_iter().collect(),
        }
    }

    pub fn claimant(user_id: UserId) -> Self {
        Self::new(user_id, [Role::Claimant])
    }

    pub fn agent(user_id: UserId) -> Self {
        Self::new(user_id, [Role::Agent])
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    /// Agents and admins may decide claims
    pub fn can_decide(&self) -> bool {
        self.has_role(Role::Agent) || self.has_role(Role::Admin)
    }
}

use rdpstore_auth::Role;
use rdpstore_core::OwnerId;
use rdpstore_infra::Actor;

/// Authenticated caller for a request (subject + roles).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    owner_id: OwnerId,
    roles: Vec<Role>,
}

impl PrincipalContext {
    pub fn new(owner_id: OwnerId, roles: Vec<Role>) -> Self {
        Self { owner_id, roles }
    }

    pub fn owner_id(&self) -> OwnerId {
        self.owner_id
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    /// Customer routes always act as the token's subject, even for admins.
    pub fn customer(&self) -> Actor {
        Actor::Customer(self.owner_id)
    }
}

use std::fmt;

use tracing::{trace, warn};
use uuid::Uuid;

use crate::error::{AuthError, AuthResult};
use crate::roles::Role;
use crate::extractors::{AuthContext, AuthStage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Post,
    Comment,
    User,
    /// Issued access tokens of other users (forced revocation).
    Session,
}

impl Resource {
    pub const ALL: [Resource; 4] = [
        Resource::Post,
        Resource::Comment,
        Resource::User,
        Resource::Session,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::Post => "post",
            Resource::Comment => "comment",
            Resource::User => "user",
            Resource::Session => "session",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
}

impl Action {
    pub const ALL: [Action; 4] = [Action::Create, Action::Read, Action::Update, Action::Delete];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Read => "read",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the static role table, before ownership is considered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    /// Allowed only when the caller owns the target resource.
    AllowIfOwner,
    Deny,
}

pub trait AccessPolicy: Send + Sync {
    fn decide(&self, role: Role, resource: Resource, action: Action) -> Decision;
}

/// Static role → permission table. The match is exhaustive, so every
/// (role, resource, action) triple has an explicit outcome.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoleTable;

impl AccessPolicy for RoleTable {
    fn decide(&self, role: Role, resource: Resource, action: Action) -> Decision {
        use Action::*;
        use Decision::*;
        use Resource::*;

        match (role, resource, action) {
            (Role::Admin, _, _) => Allow,

            (Role::Author, Post | Comment, Create | Read) => Allow,
            (Role::Author, Post | Comment, Update | Delete) => AllowIfOwner,
            (Role::Author, User | Session, _) => Deny,

            (Role::Reader, Post | Comment, Read) => Allow,
            (Role::Reader, Post | Comment, Create | Update | Delete) => Deny,
            (Role::Reader, User | Session, _) => Deny,
        }
    }
}

/// Apply `policy` to the authenticated caller. `owner` is the stored owner of
/// the target resource, when the action targets an existing one.
pub fn authorize<P>(
    policy: &P,
    auth: &AuthContext,
    resource: Resource,
    action: Action,
    owner: Option<Uuid>,
) -> AuthResult<()>
where
    P: AccessPolicy + ?Sized,
{
    let claims = &auth.claims;
    let allowed = match policy.decide(claims.role, resource, action) {
        Decision::Allow => true,
        Decision::AllowIfOwner => owner == Some(claims.subject),
        Decision::Deny => false,
    };

    if allowed {
        trace!(
            stage = AuthStage::Authorized.as_str(),
            subject = %claims.subject,
            %resource,
            %action,
            "access granted"
        );
        return Ok(());
    }

    warn!(
        subject = %claims.subject,
        role = %claims.role,
        %resource,
        %action,
        owner = ?owner,
        "access_check_failed"
    );
    Err(AuthError::Forbidden { resource, action })
}

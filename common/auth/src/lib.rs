pub mod claims;
pub mod config;
pub mod error;
pub mod extractors;
pub mod guards;
pub mod revocation;
pub mod roles;
pub mod verifier;

pub use claims::{Claims, ACCESS_TOKEN_TYPE};
pub use config::{JwtConfig, SigningSecret};
pub use error::{AuthError, AuthRejection, AuthResult};
pub use extractors::{authenticate, AuthContext, AuthStage};
pub use guards::{authorize, AccessPolicy, Action, Decision, Resource, RoleTable};
pub use revocation::{
    FailurePolicy, InMemoryRevocationStore, RedisRevocationStore, RevocationGuard,
    RevocationPolicy, RevocationStore, StoreError, DEFAULT_REDIS_PREFIX,
};
pub use roles::{Role, UnknownRole, ROLE_ADMIN, ROLE_AUTHOR, ROLE_HIERARCHY, ROLE_READER};
pub use verifier::JwtVerifier;

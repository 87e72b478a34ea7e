use std::fmt;
use std::sync::Arc;

use crate::error::{AuthError, AuthResult};

/// Symmetric HS256 signing secret. `Debug` output is redacted so the value
/// never ends up in logs.
#[derive(Clone)]
pub struct SigningSecret(Arc<[u8]>);

impl SigningSecret {
    pub fn new(value: impl AsRef<[u8]>) -> AuthResult<Self> {
        let bytes = value.as_ref();
        if bytes.is_empty() {
            return Err(AuthError::Configuration(
                "signing secret must not be empty".to_string(),
            ));
        }
        Ok(Self(Arc::from(bytes)))
    }

    pub fn expose(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningSecret(<redacted>)")
    }
}

/// Runtime configuration shared by the token issuer and verifier.
#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: SigningSecret,
    /// Issuer claim (iss) written on issue and required on verify.
    pub issuer: String,
    /// Audience claim (aud) written on issue and required on verify.
    pub audience: String,
    /// Allowable clock skew in seconds when validating exp.
    pub leeway_seconds: u32,
}

impl JwtConfig {
    /// Construct config with zero leeway.
    pub fn new(
        secret: SigningSecret,
        issuer: impl Into<String>,
        audience: impl Into<String>,
    ) -> Self {
        Self {
            secret,
            issuer: issuer.into(),
            audience: audience.into(),
            leeway_seconds: 0,
        }
    }

    pub fn with_leeway(mut self, seconds: u32) -> Self {
        self.leeway_seconds = seconds;
        self
    }
}

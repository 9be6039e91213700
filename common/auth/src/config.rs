/// Runtime configuration for HS256 JWT issuance and verification.
#[derive(Clone)]
pub struct JwtConfig {
    /// HMAC signing secret. Must be at least 32 bytes (§6); enforced by the
    /// caller at config-load time, not here, so this type stays infallible.
    pub secret: Vec<u8>,
    /// Expected/emitted issuer claim (iss).
    pub issuer: String,
    /// Allowable clock skew in seconds when validating exp.
    pub leeway_seconds: u32,
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"***redacted***")
            .field("issuer", &self.issuer)
            .field("leeway_seconds", &self.leeway_seconds)
            .finish()
    }
}

impl JwtConfig {
    pub fn new(secret: impl Into<Vec<u8>>, issuer: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            issuer: issuer.into(),
            leeway_seconds: 30,
        }
    }

    pub fn with_leeway(mut self, seconds: u32) -> Self {
        self.leeway_seconds = seconds;
        self
    }
}

//! Bearer token validation against the cached provider metadata.
//!
//! A token is accepted when all of the following hold:
//!
//! 1. it parses as a JWT and its `alg` is one of the allowed algorithms
//! 2. its signature verifies with a provider key, selected by `kid`
//! 3. `iss` equals the trusted issuer exactly
//! 4. `aud` equals or contains one of the expected audiences
//! 5. `exp` (and `nbf` when present) hold at validation time, within the
//!    configured leeway
//!
//! An unknown `kid` triggers one forced metadata refresh and one retry.

use super::metadata::{MetadataError, ProviderMetadata, ProviderMetadataCache};
use super::Claims;
use jsonwebtoken::errors::{Error as JwtError, ErrorKind};
use jsonwebtoken::{decode, decode_header, Algorithm, Validation};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Default clock skew tolerance in seconds.
pub const DEFAULT_LEEWAY_SECS: u64 = 30;

/// Algorithms accepted unless configured otherwise. `none` is never accepted.
pub const DEFAULT_ALGORITHMS: &[Algorithm] = &[
    Algorithm::HS256,
    Algorithm::HS384,
    Algorithm::HS512,
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
    Algorithm::ES256,
    Algorithm::ES384,
];

/// What makes a token trusted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenValidationParameters {
    /// Trusted issuer. `None` trusts the issuer named by the discovery
    /// document.
    pub valid_issuer: Option<String>,
    /// Accepted audiences; a token must carry at least one of them. With
    /// none configured every token is rejected.
    pub valid_audiences: Vec<String>,
    pub leeway_secs: u64,
    pub algorithms: Vec<Algorithm>,
}

impl TokenValidationParameters {
    pub fn new(issuer: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            valid_issuer: Some(issuer.into()),
            valid_audiences: vec![audience.into()],
            leeway_secs: DEFAULT_LEEWAY_SECS,
            algorithms: DEFAULT_ALGORITHMS.to_vec(),
        }
    }

    /// Trust whatever issuer the discovery document names.
    pub fn for_discovered_issuer(audience: impl Into<String>) -> Self {
        Self {
            valid_issuer: None,
            ..Self::new(String::new(), audience)
        }
    }

    pub fn audience(mut self, audience: impl Into<String>) -> Self {
        let audience = audience.into();
        if !self.valid_audiences.contains(&audience) {
            self.valid_audiences.push(audience);
        }
        self
    }

    pub fn leeway(mut self, secs: u64) -> Self {
        self.leeway_secs = secs;
        self
    }

    pub fn algorithms(mut self, algorithms: &[Algorithm]) -> Self {
        self.algorithms = algorithms.to_vec();
        self
    }

    fn validation(&self, alg: Algorithm, issuer: &str) -> Validation {
        let mut validation = Validation::new(alg);
        validation.leeway = self.leeway_secs;
        validation.validate_nbf = true;
        validation.set_issuer(&[issuer]);
        validation.set_audience(self.valid_audiences.as_slice());
        validation.set_required_spec_claims(&["exp", "iss", "aud"]);
        validation
    }
}

/// Why a credential was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    MalformedToken,
    SignatureMismatch,
    UnknownKey,
    IssuerMismatch,
    AudienceMismatch,
    Expired,
    NotYetValid,
    /// Provider metadata could not be obtained; says nothing about the token.
    ProviderUnavailable,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::MalformedToken => "malformed_token",
            RejectReason::SignatureMismatch => "signature_mismatch",
            RejectReason::UnknownKey => "unknown_key",
            RejectReason::IssuerMismatch => "issuer_mismatch",
            RejectReason::AudienceMismatch => "audience_mismatch",
            RejectReason::Expired => "expired",
            RejectReason::NotYetValid => "not_yet_valid",
            RejectReason::ProviderUnavailable => "provider_unavailable",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of validating one credential.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthenticationOutcome {
    Authenticated(Claims),
    Rejected(RejectReason),
}

impl AuthenticationOutcome {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthenticationOutcome::Authenticated(_))
    }
}

/// Detailed rejection, logged and then collapsed into a [`RejectReason`].
#[derive(Debug)]
enum Rejection {
    Malformed { error: String },
    UnsupportedAlgorithm { alg: Algorithm },
    UnknownKey { kid: String },
    KeyAlgorithmMismatch { kid: String, alg: Algorithm },
    NoCompatibleKey { alg: Algorithm },
    InvalidSignature,
    Expired,
    NotYetValid,
    InvalidIssuer { expected: String },
    InvalidAudience { expected: Vec<String> },
    NoAudienceConfigured,
    MissingRequiredClaim { claim: String },
    ProviderUnavailable { error: MetadataError },
}

impl Rejection {
    fn reason(&self) -> RejectReason {
        match self {
            Rejection::Malformed { .. } | Rejection::UnsupportedAlgorithm { .. } => {
                RejectReason::MalformedToken
            }
            Rejection::UnknownKey { .. } => RejectReason::UnknownKey,
            Rejection::KeyAlgorithmMismatch { .. }
            | Rejection::NoCompatibleKey { .. }
            | Rejection::InvalidSignature => RejectReason::SignatureMismatch,
            Rejection::Expired => RejectReason::Expired,
            Rejection::NotYetValid => RejectReason::NotYetValid,
            Rejection::InvalidIssuer { .. } => RejectReason::IssuerMismatch,
            Rejection::InvalidAudience { .. } | Rejection::NoAudienceConfigured => {
                RejectReason::AudienceMismatch
            }
            Rejection::MissingRequiredClaim { claim } => match claim.as_str() {
                "iss" => RejectReason::IssuerMismatch,
                "aud" => RejectReason::AudienceMismatch,
                _ => RejectReason::MalformedToken,
            },
            Rejection::ProviderUnavailable { .. } => RejectReason::ProviderUnavailable,
        }
    }

    fn log(&self) {
        match self {
            Rejection::Malformed { error } => {
                debug!(error = %error, "token rejected: malformed");
            }
            Rejection::UnsupportedAlgorithm { alg } => {
                debug!(?alg, "token rejected: algorithm not allowed");
            }
            Rejection::UnknownKey { kid } => {
                warn!(kid = %kid, "token rejected: key not found after refresh");
            }
            Rejection::KeyAlgorithmMismatch { kid, alg } => {
                debug!(kid = %kid, ?alg, "token rejected: key does not support algorithm");
            }
            Rejection::NoCompatibleKey { alg } => {
                debug!(?alg, "token rejected: no key for algorithm");
            }
            Rejection::InvalidSignature => {
                debug!("token rejected: invalid signature");
            }
            Rejection::Expired => debug!("token rejected: expired"),
            Rejection::NotYetValid => debug!("token rejected: not yet valid"),
            Rejection::InvalidIssuer { expected } => {
                debug!(expected = %expected, "token rejected: issuer mismatch");
            }
            Rejection::InvalidAudience { expected } => {
                debug!(?expected, "token rejected: audience mismatch");
            }
            Rejection::NoAudienceConfigured => {
                warn!("token rejected: no audience configured");
            }
            Rejection::MissingRequiredClaim { claim } => {
                debug!(claim = %claim, "token rejected: missing required claim");
            }
            Rejection::ProviderUnavailable { error } => {
                warn!(error = %error, "token not validated: provider metadata unavailable");
            }
        }
    }

    fn from_jwt(err: &JwtError, params: &TokenValidationParameters, issuer: &str) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => Rejection::Expired,
            ErrorKind::ImmatureSignature => Rejection::NotYetValid,
            ErrorKind::InvalidSignature
            | ErrorKind::InvalidAlgorithm
            | ErrorKind::InvalidRsaKey(_)
            | ErrorKind::InvalidEcdsaKey
            | ErrorKind::InvalidKeyFormat => Rejection::InvalidSignature,
            ErrorKind::InvalidIssuer => Rejection::InvalidIssuer {
                expected: issuer.to_string(),
            },
            ErrorKind::InvalidAudience => Rejection::InvalidAudience {
                expected: params.valid_audiences.clone(),
            },
            ErrorKind::MissingRequiredClaim(claim) => Rejection::MissingRequiredClaim {
                claim: claim.clone(),
            },
            _ => Rejection::Malformed {
                error: err.to_string(),
            },
        }
    }
}

/// Validates bearer tokens using keys from a shared [`ProviderMetadataCache`].
#[derive(Debug, Clone)]
pub struct TokenValidator {
    cache: Arc<ProviderMetadataCache>,
    params: TokenValidationParameters,
}

impl TokenValidator {
    pub fn new(cache: Arc<ProviderMetadataCache>, params: TokenValidationParameters) -> Self {
        Self { cache, params }
    }

    pub fn cache(&self) -> &Arc<ProviderMetadataCache> {
        &self.cache
    }

    pub fn parameters(&self) -> &TokenValidationParameters {
        &self.params
    }

    /// Validate `token`. Never fails as a whole: every problem, including an
    /// unreachable provider, is a [`RejectReason`].
    pub async fn validate(&self, token: &str) -> AuthenticationOutcome {
        match self.validate_internal(token).await {
            Ok(claims) => {
                debug!(sub = ?claims.subject(), "token validated");
                AuthenticationOutcome::Authenticated(claims)
            }
            Err(rejection) => {
                rejection.log();
                AuthenticationOutcome::Rejected(rejection.reason())
            }
        }
    }

    async fn validate_internal(&self, token: &str) -> Result<Claims, Rejection> {
        let header = decode_header(token).map_err(|e| Rejection::Malformed {
            error: e.to_string(),
        })?;
        let alg = header.alg;
        if !self.params.algorithms.contains(&alg) {
            return Err(Rejection::UnsupportedAlgorithm { alg });
        }
        if self.params.valid_audiences.is_empty() {
            return Err(Rejection::NoAudienceConfigured);
        }
        let kid = header.kid.as_deref();

        let metadata = self
            .cache
            .get_metadata()
            .await
            .map_err(|error| Rejection::ProviderUnavailable { error })?;

        match self.verify(token, alg, kid, &metadata) {
            Err(Rejection::UnknownKey { kid }) => {
                debug!(
                    kid = %kid,
                    revision = metadata.revision,
                    "unknown key, refreshing provider metadata"
                );
            }
            verified => return verified,
        }

        let refreshed = self
            .cache
            .refresh_unknown_key(metadata.revision)
            .await
            .map_err(|error| Rejection::ProviderUnavailable { error })?;
        self.verify(token, alg, kid, &refreshed)
    }

    fn verify(
        &self,
        token: &str,
        alg: Algorithm,
        kid: Option<&str>,
        metadata: &ProviderMetadata,
    ) -> Result<Claims, Rejection> {
        let issuer = self
            .params
            .valid_issuer
            .as_deref()
            .unwrap_or_else(|| metadata.issuer());
        let validation = self.params.validation(alg, issuer);
        let reject = |e: JwtError| Rejection::from_jwt(&e, &self.params, issuer);

        if let Some(kid) = kid {
            let key = metadata
                .keys
                .find(kid)
                .ok_or_else(|| Rejection::UnknownKey {
                    kid: kid.to_string(),
                })?;
            if !key.supports(alg) {
                return Err(Rejection::KeyAlgorithmMismatch {
                    kid: kid.to_string(),
                    alg,
                });
            }
            return decode::<Claims>(token, key.decoding_key(), &validation)
                .map(|data| data.claims)
                .map_err(reject);
        }

        // No kid: any key able to verify `alg` may have signed it.
        let mut rejection = Rejection::NoCompatibleKey { alg };
        for key in metadata.keys.candidates(alg) {
            match decode::<Claims>(token, key.decoding_key(), &validation) {
                Ok(data) => return Ok(data.claims),
                Err(e) if matches!(e.kind(), ErrorKind::InvalidSignature) => {
                    rejection = Rejection::InvalidSignature;
                }
                Err(e) => return Err(reject(e)),
            }
        }
        Err(rejection)
    }
}

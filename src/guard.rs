//! # Authorization Decision Service
//!
//! [`RouteGuard`] is the single per-request entry point. For an invoked
//! handler and the request headers it:
//!
//! 1. looks the handler up in the [`PolicyRegistry`]; a handler without an
//!    entry is public and allowed without looking at the request
//! 2. extracts the bearer credential; none means [`DenyReason::Unauthenticated`]
//! 3. validates it; a rejection is [`DenyReason::Rejected`]
//! 4. evaluates the handler's policy against the claims; a miss is
//!    [`DenyReason::Forbidden`]
//! 5. otherwise allows, handing the claims to the host
//!
//! The host turns a deny into a response, typically with
//! [`DenyReason::status_code`] and [`DenyReason::error_body`].

use crate::config::{ConfigError, GuardConfig};
use crate::registry::PolicyRegistry;
use crate::security::{
    extract_bearer, AuthenticationOutcome, Claims, Credential, RejectReason, TokenValidator,
};
use http::{HeaderMap, StatusCode};
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Why a request to a protected handler was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DenyReason {
    /// No bearer credential was presented.
    Unauthenticated,
    /// A credential was presented but not accepted.
    Rejected(RejectReason),
    /// Authenticated, but the claims do not satisfy the handler's policy.
    Forbidden,
}

impl DenyReason {
    /// 401 for authentication failures, 403 for policy failures, 503 when the
    /// identity provider could not be reached.
    pub fn status_code(&self) -> StatusCode {
        match self {
            DenyReason::Unauthenticated => StatusCode::UNAUTHORIZED,
            DenyReason::Rejected(RejectReason::ProviderUnavailable) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            DenyReason::Rejected(_) => StatusCode::UNAUTHORIZED,
            DenyReason::Forbidden => StatusCode::FORBIDDEN,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::Unauthenticated => "unauthenticated",
            DenyReason::Rejected(reason) => reason.as_str(),
            DenyReason::Forbidden => "forbidden",
        }
    }

    /// `WWW-Authenticate` challenge for 401 and 403 responses.
    pub fn challenge(&self) -> Option<&'static str> {
        match self {
            DenyReason::Unauthenticated => Some("Bearer"),
            DenyReason::Rejected(RejectReason::ProviderUnavailable) => None,
            DenyReason::Rejected(_) => Some("Bearer error=\"invalid_token\""),
            DenyReason::Forbidden => Some("Bearer error=\"insufficient_scope\""),
        }
    }

    /// JSON error body for the deny response.
    pub fn error_body(&self) -> serde_json::Value {
        let error = match self {
            DenyReason::Forbidden => "Forbidden",
            DenyReason::Rejected(RejectReason::ProviderUnavailable) => "Service Unavailable",
            _ => "Unauthorized",
        };
        json!({ "error": error, "reason": self.as_str() })
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of [`RouteGuard::authorize`].
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// `principal` is `None` for public handlers.
    Allow { principal: Option<Claims> },
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow { .. })
    }

    pub fn principal(&self) -> Option<&Claims> {
        match self {
            Decision::Allow { principal } => principal.as_ref(),
            Decision::Deny(_) => None,
        }
    }

    pub fn deny_reason(&self) -> Option<DenyReason> {
        match self {
            Decision::Allow { .. } => None,
            Decision::Deny(reason) => Some(*reason),
        }
    }
}

/// Authorization decision service.
///
/// Cheap to clone; clones share the registry and the metadata cache.
#[derive(Debug, Clone)]
pub struct RouteGuard {
    registry: Arc<PolicyRegistry>,
    validator: TokenValidator,
}

impl RouteGuard {
    pub fn new(registry: Arc<PolicyRegistry>, validator: TokenValidator) -> Self {
        Self {
            registry,
            validator,
        }
    }

    /// Guard backed by the HTTP discovery fetcher described by `config`.
    pub fn from_config(
        config: &GuardConfig,
        registry: PolicyRegistry,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let cache = config.metadata_cache()?;
        info!(
            discovery_url = %config.discovery.url,
            issuer = config.validation.valid_issuer.as_deref().unwrap_or("<discovered>"),
            protected = registry.len(),
            "route guard configured"
        );
        Ok(Self::new(
            Arc::new(registry),
            TokenValidator::new(cache, config.validation.clone()),
        ))
    }

    pub fn registry(&self) -> &PolicyRegistry {
        &self.registry
    }

    pub fn validator(&self) -> &TokenValidator {
        &self.validator
    }

    /// Whether requests to `handler` go through authentication at all.
    pub fn should_authorize(&self, handler: &str) -> bool {
        self.registry.requires_authorization(handler)
    }

    /// Decide whether a request with `headers` may invoke `handler`.
    pub async fn authorize(&self, handler: &str, headers: &HeaderMap) -> Decision {
        let Some(policy) = self.registry.policy_for(handler) else {
            debug!(handler, "public handler, skipping authentication");
            return Decision::Allow { principal: None };
        };

        let Credential::Bearer(token) = extract_bearer(headers) else {
            debug!(handler, "no bearer credential");
            return Decision::Deny(DenyReason::Unauthenticated);
        };

        let claims = match self.validator.validate(token).await {
            AuthenticationOutcome::Authenticated(claims) => claims,
            AuthenticationOutcome::Rejected(reason) => {
                debug!(handler, %reason, "credential rejected");
                return Decision::Deny(DenyReason::Rejected(reason));
            }
        };

        if !policy.is_satisfied_by(&claims) {
            debug!(handler, sub = ?claims.subject(), %policy, "policy not satisfied");
            return Decision::Deny(DenyReason::Forbidden);
        }

        debug!(handler, sub = ?claims.subject(), "request authorized");
        Decision::Allow {
            principal: Some(claims),
        }
    }

    /// [`authorize`](Self::authorize) for an `http::Request`.
    pub async fn authorize_request<B>(
        &self,
        handler: &str,
        request: &http::Request<B>,
    ) -> Decision {
        self.authorize(handler, request.headers()).await
    }
}

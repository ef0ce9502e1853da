//! # routeguard
//!
//! Request authorization for serverless HTTP handlers.
//!
//! ## Overview
//!
//! At startup the host describes its handlers (through a
//! [`HandlerEnumerator`](registry::HandlerEnumerator)) and routeguard builds an
//! immutable [`PolicyRegistry`](registry::PolicyRegistry): every public,
//! HTTP-triggered entry point together with the authorization policy it
//! requires. Per request, [`RouteGuard::authorize`] extracts the bearer
//! credential, validates it against the identity provider's OpenID Connect
//! metadata and checks the handler's policy.
//!
//! ## Architecture
//!
//! - **[`registry`]** - handler definitions, the policy decision table, the registry build
//! - **[`security`]** - credential extraction, provider metadata cache, token validation, policies
//! - **[`guard`]** - the authorization decision service
//! - **[`config`]** - bootstrap configuration and `ROUTEGUARD_*` environment loading
//! - **[`logging`]** - `tracing` subscriber setup
//! - **[`cli`]** - the `routeguard` operator tool
//!
//! ### Request Flow
//!
//! ```text
//! handler name ──► PolicyRegistry ──(public)──────────────────────────► Allow
//!                       │
//!                  (protected)
//!                       ▼
//!              extract_bearer ──(none)──────────────────────────────► Deny(Unauthenticated)
//!                       ▼
//!              TokenValidator ◄──► ProviderMetadataCache ◄──► discovery + JWKS
//!                       │──(rejected)───────────────────────────────► Deny(Rejected(reason))
//!                       ▼
//!          AuthorizationPolicy ──(unsatisfied)──────────────────────► Deny(Forbidden)
//!                       ▼
//!                 Allow(claims)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use routeguard::config::GuardConfig;
//! use routeguard::registry::{HandlerDefinition, HandlerGroup, PolicyRegistry};
//! use routeguard::security::AuthorizationPolicy;
//! use routeguard::RouteGuard;
//!
//! # async fn run(headers: http::HeaderMap) -> anyhow::Result<()> {
//! let handlers = vec![HandlerGroup::new("Orders")
//!     .authorize(AuthorizationPolicy::authenticated().with_scopes(["orders.read"]))
//!     .handler(HandlerDefinition::http("ListOrders", Some("orders")))
//!     .handler(HandlerDefinition::http("Health", Some("health")).allow_anonymous())];
//!
//! let registry = PolicyRegistry::build(&handlers)?;
//! let config = GuardConfig::for_issuer("https://login.example.com", "api://orders")?;
//! let guard = RouteGuard::from_config(&config, registry)?;
//!
//! let decision = guard.authorize("ListOrders", &headers).await;
//! if let Some(reason) = decision.deny_reason() {
//!     println!("{} {}", reason.status_code(), reason.error_body());
//! }
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod guard;
pub mod logging;
pub mod registry;
pub mod security;

pub use config::{ConfigError, GuardConfig};
pub use guard::{Decision, DenyReason, RouteGuard};
pub use registry::{build_registry, HandlerEnumerator, PolicyRegistry, RegistryError};
pub use security::{AuthenticationOutcome, Claims, RejectReason};

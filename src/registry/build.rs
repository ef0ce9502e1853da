use super::resolve::resolve_policy;
use super::types::{HandlerDescriptor, HandlerGroup};
use crate::security::{AuthorizationPolicy, PolicyCatalog};
use http::Method;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, trace};

/// Source of candidate handler definitions.
///
/// The registry build calls [`enumerate`](Self::enumerate) exactly once. Hosts
/// supply an adapter that knows how their handlers are declared; tests can
/// pass a `Vec<HandlerGroup>` or a closure.
pub trait HandlerEnumerator: Send + Sync {
    fn enumerate(&self) -> anyhow::Result<Vec<HandlerGroup>>;
}

impl<F> HandlerEnumerator for F
where
    F: Fn() -> anyhow::Result<Vec<HandlerGroup>> + Send + Sync,
{
    fn enumerate(&self) -> anyhow::Result<Vec<HandlerGroup>> {
        self()
    }
}

impl HandlerEnumerator for Vec<HandlerGroup> {
    fn enumerate(&self) -> anyhow::Result<Vec<HandlerGroup>> {
        Ok(self.clone())
    }
}

/// A configuration problem found while building the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryIssue {
    pub location: String,
    pub kind: String,
    pub message: String,
}

impl RegistryIssue {
    pub const DUPLICATE_NAME: &'static str = "DuplicateHandlerName";
    pub const EMPTY_NAME: &'static str = "EmptyHandlerName";
    pub const UNKNOWN_POLICY: &'static str = "UnknownPolicy";
    pub const INVALID_METHOD: &'static str = "InvalidMethod";

    pub fn new(
        location: impl Into<String>,
        kind: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        RegistryIssue {
            location: location.into(),
            kind: kind.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for RegistryIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.kind, self.location, self.message)
    }
}

/// Registry build failure. Either way the process must not serve traffic.
#[derive(Debug)]
pub enum RegistryError {
    /// The enumerator could not produce handler definitions.
    Enumeration(anyhow::Error),
    /// One or more configuration issues; all of them are reported at once.
    Invalid(Vec<RegistryIssue>),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::Enumeration(e) => {
                write!(f, "handler enumeration failed: {e:#}")
            }
            RegistryError::Invalid(issues) => {
                write!(f, "handler registry is invalid: {} issue(s)", issues.len())?;
                for issue in issues {
                    write!(f, "\n  {issue}")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for RegistryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RegistryError::Enumeration(e) => Some(e.as_ref()),
            RegistryError::Invalid(_) => None,
        }
    }
}

pub fn print_issues(issues: &[RegistryIssue]) {
    eprintln!(
        "\n❌ Handler registry validation failed. {} issue(s) found:\n",
        issues.len()
    );
    for issue in issues {
        eprintln!("{issue}");
    }
    eprintln!("\nPlease fix the handler declarations before starting the service.\n");
}

/// Handler name → required authorization policy.
///
/// Only handlers that require authorization have a policy entry; a name
/// without one is public. Built once by [`build_registry`] and never mutated,
/// so it can be shared across request workers without locking.
#[derive(Debug, Clone, Default)]
pub struct PolicyRegistry {
    descriptors: Vec<HandlerDescriptor>,
    index: HashMap<Arc<str>, usize>,
    policies: HashMap<Arc<str>, Arc<AuthorizationPolicy>>,
}

impl PolicyRegistry {
    /// Build with an empty policy catalog.
    pub fn build(enumerator: &dyn HandlerEnumerator) -> Result<Self, RegistryError> {
        build_registry(enumerator, &PolicyCatalog::default())
    }

    pub fn policy_for(&self, handler: &str) -> Option<&AuthorizationPolicy> {
        self.policies.get(handler).map(Arc::as_ref)
    }

    pub fn requires_authorization(&self, handler: &str) -> bool {
        self.policies.contains_key(handler)
    }

    pub fn descriptor(&self, handler: &str) -> Option<&HandlerDescriptor> {
        self.index.get(handler).map(|&i| &self.descriptors[i])
    }

    /// All discovered HTTP entry points, public ones included, in discovery order.
    pub fn descriptors(&self) -> &[HandlerDescriptor] {
        &self.descriptors
    }

    pub fn protected_handlers(&self) -> impl Iterator<Item = &str> {
        self.policies.keys().map(AsRef::as_ref)
    }

    /// Number of protected handlers.
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

/// Build the policy registry from everything `enumerator` yields.
///
/// A definition is an HTTP entry point when it is public, carries an
/// entry-point name and has an HTTP trigger on one of its parameters; all
/// other definitions are skipped. The effective policy follows
/// [`resolve_policy`], named policies are looked up in `catalog`.
///
/// # Errors
///
/// - [`RegistryError::Enumeration`] when the enumerator fails
/// - [`RegistryError::Invalid`] listing every duplicate or empty name,
///   unknown named policy and invalid HTTP method
pub fn build_registry(
    enumerator: &dyn HandlerEnumerator,
    catalog: &PolicyCatalog,
) -> Result<PolicyRegistry, RegistryError> {
    let groups = enumerator.enumerate().map_err(RegistryError::Enumeration)?;

    let mut registry = PolicyRegistry::default();
    let mut issues = Vec::new();
    let mut origin: HashMap<Arc<str>, String> = HashMap::new();

    for group in &groups {
        for def in &group.handlers {
            let location = format!("{}::{}", group.name, def.method);

            let (Some(function_name), Some((route, methods))) =
                (def.function_name.as_deref(), def.http_trigger())
            else {
                trace!(%location, "skipping definition without entry point or HTTP trigger");
                continue;
            };
            if !def.public {
                trace!(%location, "skipping non-public entry point");
                continue;
            }

            let name = function_name.trim();
            if name.is_empty() {
                issues.push(RegistryIssue::new(
                    &location,
                    RegistryIssue::EMPTY_NAME,
                    "entry point name is empty",
                ));
                continue;
            }
            let name: Arc<str> = Arc::from(name);

            if let Some(first) = origin.get(&name) {
                issues.push(RegistryIssue::new(
                    &location,
                    RegistryIssue::DUPLICATE_NAME,
                    format!("handler name '{name}' is already declared by {first}"),
                ));
                continue;
            }
            origin.insert(Arc::clone(&name), location.clone());

            let mut parsed_methods = Vec::with_capacity(methods.len());
            for m in methods {
                match Method::from_bytes(m.trim().to_ascii_uppercase().as_bytes()) {
                    Ok(method) => parsed_methods.push(method),
                    Err(_) => issues.push(RegistryIssue::new(
                        &location,
                        RegistryIssue::INVALID_METHOD,
                        format!("'{m}' is not a valid HTTP method"),
                    )),
                }
            }

            let marker = resolve_policy(
                group.authorize.as_ref(),
                def.authorize.as_ref(),
                def.allow_anonymous,
            );
            let required_policy = match marker.map(|m| catalog.resolve(m)) {
                None => None,
                Some(Ok(policy)) => Some(Arc::new(policy)),
                Some(Err(unknown)) => {
                    issues.push(RegistryIssue::new(
                        &location,
                        RegistryIssue::UNKNOWN_POLICY,
                        format!("authorization policy '{unknown}' is not defined"),
                    ));
                    continue;
                }
            };

            debug!(
                handler = %name,
                %location,
                policy = %required_policy
                    .as_deref()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "public".to_string()),
                "discovered HTTP entry point"
            );

            if let Some(policy) = &required_policy {
                registry
                    .policies
                    .insert(Arc::clone(&name), Arc::clone(policy));
            }
            registry
                .index
                .insert(Arc::clone(&name), registry.descriptors.len());
            registry.descriptors.push(HandlerDescriptor {
                route: route.map(str::to_string).unwrap_or_else(|| name.to_string()),
                name,
                methods: parsed_methods,
                group: group.name.clone(),
                required_policy,
            });
        }
    }

    if !issues.is_empty() {
        return Err(RegistryError::Invalid(issues));
    }

    info!(
        handlers = registry.descriptors.len(),
        protected = registry.policies.len(),
        "policy registry built"
    );
    Ok(registry)
}

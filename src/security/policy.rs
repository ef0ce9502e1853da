//! Authorization policies and their evaluation against token claims.

use super::Claims;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// What a caller must present to invoke a protected handler.
///
/// - `roles`: any one of them must be present in the `roles`/`role` claims
/// - `scopes`: all of them must be present in the `scope`/`scp` claims
/// - neither: any authenticated principal is accepted
///
/// `name` refers to an entry of a [`PolicyCatalog`]; the registry build
/// replaces it by the catalog's requirements (see [`PolicyCatalog::resolve`]).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationPolicy {
    #[serde(default, rename = "policy", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<String>,
}

impl AuthorizationPolicy {
    /// Any authenticated principal.
    pub fn authenticated() -> Self {
        Self::default()
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles.extend(roles.into_iter().map(Into::into));
        self
    }

    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes.extend(scopes.into_iter().map(Into::into));
        self
    }

    pub fn is_authenticated_only(&self) -> bool {
        self.roles.is_empty() && self.scopes.is_empty()
    }

    /// Evaluate the requirements against validated claims.
    pub fn is_satisfied_by(&self, claims: &Claims) -> bool {
        if !self.roles.is_empty() {
            let held = claims.roles();
            if !self.roles.iter().any(|r| held.contains(&r.as_str())) {
                return false;
            }
        }
        if !self.scopes.is_empty() {
            let granted = claims.scopes();
            if !self.scopes.iter().all(|s| granted.contains(&s.as_str())) {
                return false;
            }
        }
        true
    }
}

impl fmt::Display for AuthorizationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.name {
            write!(f, "policy={name} ")?;
        }
        if self.is_authenticated_only() {
            return write!(f, "authenticated");
        }
        let mut parts = Vec::new();
        if !self.roles.is_empty() {
            parts.push(format!("roles(any)={}", self.roles.join("|")));
        }
        if !self.scopes.is_empty() {
            parts.push(format!("scopes(all)={}", self.scopes.join(" ")));
        }
        write!(f, "{}", parts.join(" "))
    }
}

/// Named policies that authorization markers may refer to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicyCatalog(HashMap<String, AuthorizationPolicy>);

impl PolicyCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(mut self, name: impl Into<String>, policy: AuthorizationPolicy) -> Self {
        self.0.insert(name.into(), policy);
        self
    }

    pub fn get(&self, name: &str) -> Option<&AuthorizationPolicy> {
        self.0.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Turn a marker into concrete requirements.
    ///
    /// Markers without a name are returned as-is. For a named marker the
    /// catalog entry's roles and scopes are extended with the marker's inline
    /// ones; the name is kept for diagnostics. Returns the unknown name as the
    /// error.
    pub fn resolve(&self, marker: &AuthorizationPolicy) -> Result<AuthorizationPolicy, String> {
        let Some(name) = &marker.name else {
            return Ok(marker.clone());
        };
        let base = self.get(name).ok_or_else(|| name.clone())?;

        let mut resolved = AuthorizationPolicy {
            name: Some(name.clone()),
            roles: base.roles.clone(),
            scopes: base.scopes.clone(),
        };
        for role in &marker.roles {
            if !resolved.roles.contains(role) {
                resolved.roles.push(role.clone());
            }
        }
        for scope in &marker.scopes {
            if !resolved.scopes.contains(scope) {
                resolved.scopes.push(scope.clone());
            }
        }
        Ok(resolved)
    }
}

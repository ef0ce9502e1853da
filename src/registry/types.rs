use crate::security::AuthorizationPolicy;
use http::Method;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A container of handler definitions, the unit a group-level authorization
/// marker applies to (a module, a type, a controller).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HandlerGroup {
    pub name: String,
    /// Authorization marker on the group; inherited by handlers without their own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorize: Option<AuthorizationPolicy>,
    #[serde(default)]
    pub handlers: Vec<HandlerDefinition>,
}

impl HandlerGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            authorize: None,
            handlers: Vec::new(),
        }
    }

    pub fn authorize(mut self, policy: AuthorizationPolicy) -> Self {
        self.authorize = Some(policy);
        self
    }

    pub fn handler(mut self, handler: HandlerDefinition) -> Self {
        self.handlers.push(handler);
        self
    }
}

/// Introspectable metadata of one candidate handler.
///
/// Produced by a [`HandlerEnumerator`](super::HandlerEnumerator); only definitions
/// carrying an entry-point name and an HTTP trigger on one of their parameters
/// end up in the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerDefinition {
    /// Symbol name inside the group, used in diagnostics only.
    pub method: String,
    /// Entry-point marker. `None` means the definition is not an entry point.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_name: Option<String>,
    /// Non-public definitions are never entry points.
    #[serde(default = "default_public")]
    pub public: bool,
    #[serde(default)]
    pub parameters: Vec<ParameterDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorize: Option<AuthorizationPolicy>,
    #[serde(default)]
    pub allow_anonymous: bool,
}

fn default_public() -> bool {
    true
}

impl HandlerDefinition {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            function_name: None,
            public: true,
            parameters: Vec::new(),
            authorize: None,
            allow_anonymous: false,
        }
    }

    /// Shorthand for a public HTTP entry point named `name` whose trigger
    /// parameter declares `route`.
    pub fn http(name: impl Into<String>, route: Option<&str>) -> Self {
        let name = name.into();
        Self::new(name.clone())
            .function_name(name)
            .parameter(ParameterDefinition::http_trigger("req", route, &[]))
    }

    pub fn function_name(mut self, name: impl Into<String>) -> Self {
        self.function_name = Some(name.into());
        self
    }

    pub fn parameter(mut self, parameter: ParameterDefinition) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn authorize(mut self, policy: AuthorizationPolicy) -> Self {
        self.authorize = Some(policy);
        self
    }

    pub fn allow_anonymous(mut self) -> Self {
        self.allow_anonymous = true;
        self
    }

    pub fn private(mut self) -> Self {
        self.public = false;
        self
    }

    /// First HTTP trigger found on the parameters, in declaration order.
    pub fn http_trigger(&self) -> Option<(Option<&str>, &[String])> {
        self.parameters.iter().find_map(|p| match &p.trigger {
            Some(TriggerMarker::Http { route, methods }) => {
                Some((route.as_deref(), methods.as_slice()))
            }
            _ => None,
        })
    }
}

/// One input of a handler and the trigger marker attached to it, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<TriggerMarker>,
}

impl ParameterDefinition {
    pub fn plain(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            trigger: None,
        }
    }

    pub fn http_trigger(name: impl Into<String>, route: Option<&str>, methods: &[&str]) -> Self {
        Self {
            name: name.into(),
            trigger: Some(TriggerMarker::Http {
                route: route.map(str::to_string),
                methods: methods.iter().map(|m| m.to_string()).collect(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerMarker {
    Http {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        route: Option<String>,
        /// Empty means every method.
        #[serde(default)]
        methods: Vec<String>,
    },
    Timer {
        schedule: String,
    },
    Queue {
        queue: String,
    },
}

/// An HTTP-triggered entry point as discovered by the registry build.
///
/// Immutable once built; `required_policy` is `None` for public handlers.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerDescriptor {
    pub name: Arc<str>,
    /// Informational only; lookups are by `name`.
    pub route: String,
    pub methods: Vec<Method>,
    pub group: String,
    pub required_policy: Option<Arc<AuthorizationPolicy>>,
}

impl HandlerDescriptor {
    pub fn is_public(&self) -> bool {
        self.required_policy.is_none()
    }
}

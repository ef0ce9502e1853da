//! Handler policy registry.
//!
//! Built once at startup from the host's handler definitions: every public,
//! HTTP-triggered entry point is recorded together with the policy it
//! requires. Lookups at request time are plain map reads.

mod build;
mod load;
mod resolve;
mod types;

pub use build::{
    build_registry, print_issues, HandlerEnumerator, PolicyRegistry, RegistryError,
    RegistryIssue,
};
pub use load::{HandlerManifest, ManifestEnumerator};
pub use resolve::resolve_policy;
pub use types::{
    HandlerDefinition, HandlerDescriptor, HandlerGroup, ParameterDefinition, TriggerMarker,
};

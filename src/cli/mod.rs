//! # CLI Module
//!
//! Operator tooling around the authorization layer, available as the
//! `routeguard` binary.
//!
//! ## Commands
//!
//! ### `inspect`
//!
//! Build the policy registry from a handler manifest and list every HTTP
//! entry point with its policy. Exits non-zero and prints every issue when
//! the manifest is invalid.
//!
//! ```bash
//! routeguard inspect --manifest handlers.yaml
//! routeguard inspect --manifest handlers.yaml --json
//! ```
//!
//! ### `discover`
//!
//! ```bash
//! routeguard discover --discovery-url https://login.example.com/.well-known/openid-configuration
//! ```
//!
//! ### `authorize`
//!
//! Run one decision the way a host would. Configuration comes from the flags,
//! falling back to the `ROUTEGUARD_*` environment variables.
//!
//! ```bash
//! routeguard authorize --manifest handlers.yaml --handler DeleteOrder \
//!     --issuer https://login.example.com --audience api://orders --token "$TOKEN"
//! ```

mod commands;


pub use commands::{run_cli, Cli, Commands, EXIT_DENIED};

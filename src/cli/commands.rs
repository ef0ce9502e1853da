use crate::config::{GuardConfig, ENV_AUDIENCE, ENV_DISCOVERY_URL, ENV_ISSUER};
use crate::guard::{Decision, RouteGuard};
use crate::registry::{
    build_registry, print_issues, ManifestEnumerator, PolicyRegistry, RegistryError,
};
use crate::security::{HttpMetadataFetcher, MetadataFetcher};
use anyhow::Context;
use clap::{Parser, Subcommand};
use http::header::AUTHORIZATION;
use http::{HeaderMap, HeaderValue};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

/// Exit code of `authorize` when the request is denied.
pub const EXIT_DENIED: u8 = 2;

/// Command-line interface for routeguard
#[derive(Parser, Debug)]
#[command(name = "routeguard")]
#[command(
    about = "Inspect handler policies and check bearer tokens against them",
    long_about = None
)]
#[command(version)]
pub struct Cli {
    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build the policy registry from a handler manifest and print it
    Inspect {
        /// Handler manifest (YAML or JSON)
        #[arg(short, long)]
        manifest: PathBuf,

        /// Print JSON instead of a table
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Fetch and print identity provider metadata
    Discover {
        /// OpenID Connect discovery document URL
        #[arg(long, env = "ROUTEGUARD_DISCOVERY_URL")]
        discovery_url: String,

        /// Fetch timeout in milliseconds
        #[arg(long, default_value_t = 5000)]
        timeout_ms: u64,
    },
    /// Run one authorization decision for a handler
    ///
    /// Exit code 0 when allowed, 2 when denied.
    Authorize {
        /// Handler manifest (YAML or JSON)
        #[arg(short, long)]
        manifest: PathBuf,

        /// Name of the invoked handler
        #[arg(long)]
        handler: String,

        /// Bearer token to present; none means no Authorization header
        #[arg(long, env = "ROUTEGUARD_TOKEN", hide_env_values = true)]
        token: Option<String>,

        /// Trusted issuer
        #[arg(long)]
        issuer: Option<String>,

        /// Expected audience(s), comma separated
        #[arg(long)]
        audience: Option<String>,

        /// Discovery document URL (default: derived from the issuer)
        #[arg(long)]
        discovery_url: Option<String>,
    },
}

/// Execute a parsed command.
///
/// # Errors
///
/// Returns an error if the manifest cannot be loaded, the configuration is
/// invalid or provider metadata cannot be fetched for `discover`.
pub async fn run_cli(cli: Cli) -> anyhow::Result<ExitCode> {
    match cli.command {
        Commands::Inspect { manifest, json } => inspect(&manifest, json),
        Commands::Discover {
            discovery_url,
            timeout_ms,
        } => discover(&discovery_url, Duration::from_millis(timeout_ms)).await,
        Commands::Authorize {
            manifest,
            handler,
            token,
            issuer,
            audience,
            discovery_url,
        } => {
            let config = GuardConfig::from_lookup(|var| {
                let flag = match var {
                    ENV_ISSUER => issuer.clone(),
                    ENV_AUDIENCE => audience.clone(),
                    ENV_DISCOVERY_URL => discovery_url.clone(),
                    _ => None,
                };
                flag.or_else(|| std::env::var(var).ok())
            })?;
            authorize(&manifest, &handler, token.as_deref(), &config).await
        }
    }
}

/// Load the manifest and build its registry; registry issues are printed and
/// reported as `Ok(None)`.
fn load_registry(manifest: &Path) -> anyhow::Result<Option<PolicyRegistry>> {
    let enumerator = ManifestEnumerator::from_path(manifest)?;
    match build_registry(&enumerator, enumerator.catalog()) {
        Ok(registry) => Ok(Some(registry)),
        Err(RegistryError::Invalid(issues)) => {
            print_issues(&issues);
            Ok(None)
        }
        Err(e @ RegistryError::Enumeration(_)) => Err(e.into()),
    }
}

fn inspect(manifest: &Path, as_json: bool) -> anyhow::Result<ExitCode> {
    let Some(registry) = load_registry(manifest)? else {
        return Ok(ExitCode::FAILURE);
    };

    if as_json {
        let handlers: Vec<_> = registry
            .descriptors()
            .iter()
            .map(|d| {
                json!({
                    "name": d.name.as_ref(),
                    "route": d.route,
                    "methods": d.methods.iter().map(|m| m.as_str()).collect::<Vec<_>>(),
                    "group": d.group,
                    "policy": d.required_policy.as_deref(),
                })
            })
            .collect();
        let out = json!({ "handlers": handlers, "protected": registry.len() });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(ExitCode::SUCCESS);
    }

    println!("{:<28} {:<12} {:<28} POLICY", "HANDLER", "METHODS", "ROUTE");
    for d in registry.descriptors() {
        let methods = if d.methods.is_empty() {
            "*".to_string()
        } else {
            d.methods
                .iter()
                .map(|m| m.as_str())
                .collect::<Vec<_>>()
                .join(",")
        };
        let policy = d
            .required_policy
            .as_deref()
            .map(ToString::to_string)
            .unwrap_or_else(|| "public".to_string());
        println!("{:<28} {:<12} {:<28} {}", d.name, methods, d.route, policy);
    }
    println!(
        "\n{} handler(s), {} protected",
        registry.descriptors().len(),
        registry.len()
    );
    Ok(ExitCode::SUCCESS)
}

async fn discover(discovery_url: &str, timeout: Duration) -> anyhow::Result<ExitCode> {
    let fetcher = HttpMetadataFetcher::new(discovery_url, timeout)?;
    let fetched = fetcher
        .fetch()
        .await
        .with_context(|| format!("cannot fetch provider metadata from {discovery_url}"))?;

    let keys: Vec<_> = fetched
        .keys
        .iter()
        .map(|k| {
            json!({
                "kid": k.kid(),
                "alg": k.algorithm().map(|a| format!("{a:?}")),
                "family": format!("{:?}", k.family()),
            })
        })
        .collect();
    let out = json!({ "document": fetched.document, "keys": keys });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(ExitCode::SUCCESS)
}

async fn authorize(
    manifest: &Path,
    handler: &str,
    token: Option<&str>,
    config: &GuardConfig,
) -> anyhow::Result<ExitCode> {
    let Some(registry) = load_registry(manifest)? else {
        return Ok(ExitCode::FAILURE);
    };
    let guard = RouteGuard::from_config(config, registry)?;

    let mut headers = HeaderMap::new();
    if let Some(token) = token {
        let value = HeaderValue::from_str(&format!("Bearer {token}"))
            .context("token contains characters not allowed in a header")?;
        headers.insert(AUTHORIZATION, value);
    }

    let decision = guard.authorize(handler, &headers).await;
    let (out, code) = match &decision {
        Decision::Allow { principal } => (
            json!({ "handler": handler, "decision": "allow", "principal": principal }),
            ExitCode::SUCCESS,
        ),
        Decision::Deny(reason) => (
            json!({
                "handler": handler,
                "decision": "deny",
                "reason": reason.as_str(),
                "status": reason.status_code().as_u16(),
            }),
            ExitCode::from(EXIT_DENIED),
        ),
    };
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(code)
}

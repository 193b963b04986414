//! Tags command implementation.
//!
//! Lists an image's tags from its registry, filtered and ordered by a
//! version constraint. The last line printed is the newest candidate.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use kairos_core::{ContainerImage, MatchPredicate, SortMode, VersionConstraint};
use kairos_registry::{
    CredentialDescriptor, EndpointRegistry, HttpRegistryClient, RegistryEndpoint,
};

/// Arguments for the tags command.
#[derive(Args)]
pub struct TagsArgs {
    /// Image reference (e.g., `ghcr.io/foo/bar` or `nginx`)
    pub image: String,

    /// Registry configuration file
    #[arg(short, long, env = "KAIROS_REGISTRIES_CONF")]
    pub config: Option<PathBuf>,

    /// Sort mode: semver, name, or latest
    #[arg(short, long, default_value = "semver")]
    pub sort: String,

    /// Tag filter: any, none, or regexp:<pattern>
    #[arg(short, long = "match", default_value = "any")]
    pub match_expr: String,

    /// Semantic version range (e.g., `~1.2` or `>=1.0, <2.0`), semver sort only
    #[arg(long)]
    pub constraint: Option<String>,

    /// Tag to leave out (repeatable)
    #[arg(long = "ignore")]
    pub ignore: Vec<String>,

    /// Credential source overriding the configured one (e.g., `env:REGISTRY_CREDS`)
    #[arg(long, env = "KAIROS_CREDENTIALS", hide_env_values = true)]
    pub credentials: Option<String>,

    /// Request timeout in seconds
    #[arg(long, default_value = "30")]
    pub timeout: u64,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Runs the tags command.
///
/// # Errors
///
/// Returns an error if:
/// - The image reference, constraint or credential descriptor is invalid
/// - The registry configuration cannot be loaded
/// - Credentials cannot be resolved
/// - The registry's tag list cannot be fetched
pub async fn execute(args: TagsArgs) -> Result<()> {
    let image = ContainerImage::from_identifier(&args.image).context("Invalid image reference")?;
    let constraint = build_constraint(&args)?;

    let registry = EndpointRegistry::with_defaults();
    if let Some(path) = &args.config {
        let loaded = registry
            .load_file(path)
            .with_context(|| format!("Failed to load registry configuration {}", path.display()))?;
        info!(path = %path.display(), registries = loaded, "Loaded registry configuration");
    }

    let endpoint = registry.get(image.registry_prefix());
    info!(
        image = %image,
        endpoint = %endpoint.prefix,
        sort = %constraint.sort_mode,
        "Resolving tags"
    );

    let source = args
        .credentials
        .as_deref()
        .map(CredentialDescriptor::parse)
        .transpose()
        .context("Invalid credential descriptor")?;
    refresh_credentials(&endpoint, source).await?;

    let client = HttpRegistryClient::with_options(
        &endpoint.api_url,
        endpoint.insecure,
        Duration::from_secs(args.timeout),
    )
    .context("Failed to create registry client")?
    .with_credentials(endpoint.credentials());

    if endpoint.ping {
        client
            .ping()
            .await
            .with_context(|| format!("Registry {} is not reachable", endpoint.api_url))?;
    }

    let tags = endpoint
        .get_tags(&image, &client, &constraint)
        .await
        .with_context(|| format!("Failed to list tags of {image}"))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&tags)?);
    } else {
        for tag in &tags {
            println!("{}", tag.name);
        }
    }

    Ok(())
}

/// Resolves the endpoint's credentials on the blocking pool, since `ext:`
/// sources wait on an external program.
async fn refresh_credentials(
    endpoint: &Arc<RegistryEndpoint>,
    source: Option<CredentialDescriptor>,
) -> Result<()> {
    let endpoint = Arc::clone(endpoint);
    tokio::task::spawn_blocking(move || endpoint.set_endpoint_credentials(source.as_ref()))
        .await
        .context("Credential refresh task failed")?
        .context("Failed to resolve registry credentials")
}

fn build_constraint(args: &TagsArgs) -> Result<VersionConstraint> {
    let sort = SortMode::parse(&args.sort).context("Invalid sort mode")?;
    let predicate = MatchPredicate::parse(&args.match_expr).context("Invalid match expression")?;

    let mut constraint = VersionConstraint::new(sort)
        .with_match(predicate)
        .with_ignore(args.ignore.iter().cloned());

    if let Some(range) = &args.constraint {
        constraint = constraint
            .with_range(range)
            .context("Invalid version constraint")?;
    }
    Ok(constraint)
}

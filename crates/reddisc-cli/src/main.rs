//! RedDisc admin CLI
//!
//! Command-line interface for editing the tenant file the daemon monitors.
//! Every command rewrites the whole file; the running daemon notices the new
//! modification marker and re-subscribes on its next idle cycle.

use clap::{Parser, Subcommand};
use reddisc_config_file::FileConfigStore;
use reddisc_core::{
    Tenant, TenantId,
    admin::{AdminOutcome, NotFound, TenantAdmin},
};
use reddisc_observability::{LoggingConfig, init_logging};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "reddisc-admin")]
#[command(about = "RedDisc - manage tenant subscriptions", long_about = None)]
struct Cli {
    /// Path to the tenant file (YAML, TOML or JSON)
    #[arg(
        long,
        value_name = "FILE",
        env = "REDDISC_TENANTS",
        default_value = "./tenants.yaml",
        global = true
    )]
    tenants: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage a tenant's subreddit subscriptions
    Subreddit {
        #[command(subcommand)]
        action: NameAction,
    },
    /// Manage a subreddit's flair allow-list
    Flair {
        #[command(subcommand)]
        action: FlairAction,
    },
    /// Manage watched Reddit users
    User {
        #[command(subcommand)]
        action: NameAction,
    },
    /// Set the Discord channel notifications go to
    Channel {
        /// Tenant (Discord guild) ID
        tenant: String,
        /// Channel mention (`<#123>`) or numeric channel ID
        channel: String,
    },
    /// Show one tenant
    Show {
        /// Tenant (Discord guild) ID
        tenant: String,
    },
    /// List all tenants
    List {
        /// Print the tenant map as JSON
        #[arg(long, default_value = "false")]
        json: bool,
    },
    /// Delete a tenant and all its subscriptions
    RemoveTenant {
        /// Tenant (Discord guild) ID
        tenant: String,
    },
}

#[derive(Subcommand)]
enum NameAction {
    /// Add a name to the tenant
    Add { tenant: String, name: String },
    /// Remove a name from the tenant
    Remove { tenant: String, name: String },
}

#[derive(Subcommand)]
enum FlairAction {
    /// Allow a flair on a subscribed subreddit
    Add {
        tenant: String,
        subreddit: String,
        flair: String,
    },
    /// Remove a flair from a subscribed subreddit
    Remove {
        tenant: String,
        subreddit: String,
        flair: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Keep the store's own logging out of command output
    init_logging(&LoggingConfig {
        level: "warn".to_string(),
        json: false,
    })
    .map_err(|e| anyhow::anyhow!("Failed to initialise logging: {}", e))?;

    // Expand tilde in path
    let path = shellexpand::tilde(&cli.tenants.to_string_lossy()).to_string();
    let store = FileConfigStore::open_or_create(PathBuf::from(path)).await?;
    let admin = TenantAdmin::new(Arc::new(store));

    let output = execute(&admin, cli.command).await?;
    println!("{}", output);
    Ok(())
}

async fn execute(admin: &TenantAdmin, command: Commands) -> anyhow::Result<String> {
    let output = match command {
        Commands::Subreddit { action } => match action {
            NameAction::Add { tenant, name } => {
                let outcome = admin.add_channel(&tenant_id(&tenant)?, &name).await?;
                describe(&outcome, &format!("Subscribed {} to r/{}", tenant, name))
            }
            NameAction::Remove { tenant, name } => {
                let outcome = admin.remove_channel(&tenant_id(&tenant)?, &name).await?;
                describe(&outcome, &format!("Unsubscribed {} from r/{}", tenant, name))
            }
        },
        Commands::Flair { action } => match action {
            FlairAction::Add {
                tenant,
                subreddit,
                flair,
            } => {
                let outcome = admin
                    .add_flair(&tenant_id(&tenant)?, &subreddit, &flair)
                    .await?;
                describe(&outcome, &format!("Allowed flair '{}' on r/{}", flair, subreddit))
            }
            FlairAction::Remove {
                tenant,
                subreddit,
                flair,
            } => {
                let outcome = admin
                    .remove_flair(&tenant_id(&tenant)?, &subreddit, &flair)
                    .await?;
                describe(&outcome, &format!("Removed flair '{}' from r/{}", flair, subreddit))
            }
        },
        Commands::User { action } => match action {
            NameAction::Add { tenant, name } => {
                let outcome = admin.add_author(&tenant_id(&tenant)?, &name).await?;
                describe(&outcome, &format!("{} now watches u/{}", tenant, name))
            }
            NameAction::Remove { tenant, name } => {
                let outcome = admin.remove_author(&tenant_id(&tenant)?, &name).await?;
                describe(&outcome, &format!("{} no longer watches u/{}", tenant, name))
            }
        },
        Commands::Channel { tenant, channel } => {
            let outcome = admin.set_destination(&tenant_id(&tenant)?, &channel).await?;
            describe(&outcome, &format!("Notifications for {} go to {}", tenant, channel))
        }
        Commands::Show { tenant } => match admin.tenant(&tenant_id(&tenant)?).await? {
            Some(record) => render_tenant(&record),
            None => format!("Tenant {} not found", tenant),
        },
        Commands::List { json } => {
            let tenants = admin.tenants().await?;
            if json {
                let map: std::collections::BTreeMap<&str, &Tenant> =
                    tenants.iter().map(|t| (t.id.as_str(), t)).collect();
                serde_json::to_string_pretty(&map)?
            } else if tenants.is_empty() {
                "No tenants configured".to_string()
            } else {
                tenants
                    .iter()
                    .map(render_tenant)
                    .collect::<Vec<_>>()
                    .join("\n\n")
            }
        }
        Commands::RemoveTenant { tenant } => {
            let outcome = admin.remove_tenant(&tenant_id(&tenant)?).await?;
            describe(&outcome, &format!("Removed tenant {}", tenant))
        }
    };

    Ok(output)
}

fn tenant_id(raw: &str) -> anyhow::Result<TenantId> {
    Ok(raw.trim().parse::<TenantId>()?)
}

/// One-line summary of a command outcome
fn describe(outcome: &AdminOutcome, updated: &str) -> String {
    match outcome {
        AdminOutcome::Updated => updated.to_string(),
        AdminOutcome::Unchanged => "Nothing to change".to_string(),
        AdminOutcome::NotFound(NotFound::Tenant(id)) => format!("Tenant {} not found", id),
        AdminOutcome::NotFound(NotFound::Channel(channel)) => {
            format!("Channel {} not found", channel)
        }
        AdminOutcome::NotFound(NotFound::Flair { channel, flair }) => {
            format!("Flair '{}' not found on r/{}", flair, channel)
        }
        AdminOutcome::NotFound(NotFound::Author(author)) => format!("u/{} is not watched", author),
    }
}

fn render_tenant(tenant: &Tenant) -> String {
    let mut lines = vec![format!("Tenant {}", tenant.id)];

    lines.push(format!(
        "  Destination: {}",
        tenant
            .destination_channel
            .as_deref()
            .map(|c| format!("<#{}>", c))
            .unwrap_or_else(|| "(not set)".to_string())
    ));

    if tenant.subscribed_channels.is_empty() {
        lines.push("  Subreddits: (none)".to_string());
    } else {
        lines.push("  Subreddits:".to_string());
        for (channel, subscription) in &tenant.subscribed_channels {
            if subscription.flair_allow_list.is_empty() {
                lines.push(format!("    r/{}", channel));
            } else {
                let flairs: Vec<&str> = subscription
                    .flair_allow_list
                    .iter()
                    .map(String::as_str)
                    .collect();
                lines.push(format!("    r/{} [flairs: {}]", channel, flairs.join(", ")));
            }
        }
    }

    if tenant.watched_authors.is_empty() {
        lines.push("  Users: (none)".to_string());
    } else {
        let authors: Vec<String> = tenant
            .watched_authors
            .iter()
            .map(|a| format!("u/{}", a))
            .collect();
        lines.push(format!("  Users: {}", authors.join(", ")));
    }

    lines.join("\n")
}

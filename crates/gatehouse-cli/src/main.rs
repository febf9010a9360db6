//! Gatehouse CLI: operator commands against the PostgreSQL store.
//!
//! Reads `DATABASE_URL` and the other settings from the environment (or a
//! `.env` file). Ctrl-C cancels the running command without committing it.

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use gatehouse_cli::{init_tracing, print_json, scope_from_args};
use gatehouse_core::models::*;
use gatehouse_core::{run_cancellable, AppResult, GatehouseConfig};
use gatehouse_db::PgAuthzStore;
use gatehouse_services::Gatehouse;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "gatehouse", about = "Gatehouse authorization CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply database migrations
    Migrate,
    /// Seed system permissions, system roles and role templates
    Seed,
    /// Check whether a user holds a permission
    Check {
        #[arg(long)]
        user: i64,
        /// Permission name, e.g. teams.create
        permission: String,
        #[arg(long)]
        org: Option<i64>,
        #[arg(long)]
        team: Option<i64>,
    },
    /// Show a user's roles and effective permissions
    Permissions {
        #[arg(long)]
        user: i64,
    },
    /// Bind a role to a user (global unless --org or --team is given)
    Bind {
        #[arg(long)]
        user: i64,
        #[arg(long)]
        role: i64,
        #[arg(long)]
        org: Option<i64>,
        #[arg(long)]
        team: Option<i64>,
    },
    /// Remove a role binding
    Unbind {
        #[arg(long)]
        user: i64,
        #[arg(long)]
        role: i64,
        #[arg(long)]
        org: Option<i64>,
        #[arg(long)]
        team: Option<i64>,
    },
    /// Create an organization with the creator as admin
    CreateOrg {
        name: String,
        #[arg(long)]
        display_name: Option<String>,
        #[arg(long)]
        creator: i64,
    },
    /// Invite an email address to an organization and print the token
    Invite {
        #[arg(long)]
        org: i64,
        email: String,
        #[arg(long)]
        invited_by: i64,
        #[arg(long)]
        team: Option<i64>,
        #[arg(long)]
        role: Option<i64>,
    },
    /// Accept an invitation on behalf of a user
    Accept {
        token: String,
        #[arg(long)]
        user: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = GatehouseConfig::from_env().context("Invalid configuration")?;
    let store = PgAuthzStore::connect(&config)
        .await
        .context("Failed to connect to the database")?;

    let store = Arc::new(store);
    let gatehouse = Gatehouse::new(store.clone(), config);

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                shutdown.cancel();
            }
        }
    });

    let output = run_cancellable(&shutdown, execute(&store, &gatehouse, cli.command)).await?;
    print_json(&output)
}

async fn execute(store: &PgAuthzStore, gatehouse: &Gatehouse, command: Commands) -> AppResult<Value> {
    let output = match command {
        Commands::Migrate => {
            store.migrate().await?;
            json!({ "migrated": true })
        }
        Commands::Seed => {
            gatehouse.registry.initialize_system_catalog().await?;
            json!({ "seeded": true })
        }
        Commands::Check {
            user,
            permission,
            org,
            team,
        } => {
            let request = CheckPermissionRequest {
                user_id: user,
                permission,
                organization_id: org,
                team_id: team,
            };
            serde_json::to_value(gatehouse.resolver.check_permission(&request).await?)?
        }
        Commands::Permissions { user } => {
            serde_json::to_value(gatehouse.resolver.permissions_summary(user).await?)?
        }
        Commands::Bind {
            user,
            role,
            org,
            team,
        } => {
            let binding = gatehouse
                .bindings
                .bind(BindRequest {
                    user_id: user,
                    role_id: role,
                    scope: scope_from_args(org, team),
                    assigned_by: None,
                    expires_at: None,
                })
                .await?;
            serde_json::to_value(binding)?
        }
        Commands::Unbind {
            user,
            role,
            org,
            team,
        } => {
            let removed = gatehouse
                .bindings
                .unbind(user, role, scope_from_args(org, team))
                .await?;
            json!({ "removed": removed })
        }
        Commands::CreateOrg {
            name,
            display_name,
            creator,
        } => {
            let (organization, membership) = gatehouse
                .memberships
                .create_organization(
                    NewOrganization {
                        display_name: display_name.unwrap_or_else(|| name.clone()),
                        name,
                        description: None,
                        settings: None,
                    },
                    creator,
                )
                .await?;
            json!({
                "organization": organization,
                "membership": membership,
            })
        }
        Commands::Invite {
            org,
            email,
            invited_by,
            team,
            role,
        } => {
            let invitation = gatehouse
                .invitations
                .invite_member(InviteRequest {
                    email,
                    organization_id: org,
                    team_id: team,
                    role_id: role,
                    invited_by,
                })
                .await?;
            serde_json::to_value(invitation)?
        }
        Commands::Accept { token, user } => {
            serde_json::to_value(gatehouse.invitations.process_invitation(&token, user).await?)?
        }
    };
    Ok(output)
}

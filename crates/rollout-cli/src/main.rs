//! Command-line client for the deployment orchestrator's HTTP facade.

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "rollout")]
#[command(about = "Deployment orchestrator CLI", long_about = None)]
struct Cli {
    /// Orchestrator API base URL
    #[arg(long, env = "ROLLOUT_API_URL", default_value = "http://localhost:3000")]
    api_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a new deployment
    Deploy {
        /// Module name
        module: String,
        /// Target semantic version
        version: String,
        /// Target environment (development|qa|staging|production)
        environment: String,
        /// Requesting user's email
        #[arg(long)]
        requester: String,
        /// Override the environment's default strategy
        #[arg(long)]
        strategy: Option<String>,
        /// Override whether this deployment requires approval
        #[arg(long)]
        require_approval: Option<bool>,
        /// Bypass the one-active-deployment-per-(environment, module) check
        #[arg(long)]
        force: bool,
    },
    /// Show the full status of a deployment execution
    Status {
        /// Deployment execution id
        execution_id: String,
    },
    /// List deployment executions
    List {
        #[arg(long)]
        module: Option<String>,
        #[arg(long)]
        environment: Option<String>,
        #[arg(long, default_value = "50")]
        limit: u32,
    },
    /// Roll a deployment back to its previous version
    Rollback {
        /// Deployment execution id to roll back
        execution_id: String,
        /// Acting user's email
        #[arg(long)]
        actor: String,
    },
    /// Approve a deployment awaiting approval
    Approve {
        execution_id: String,
        #[arg(long)]
        approver: String,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Reject a deployment awaiting approval
    Reject {
        execution_id: String,
        #[arg(long)]
        approver: String,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Cancel a non-terminal deployment
    Cancel {
        execution_id: String,
        #[arg(long)]
        actor: String,
    },
    /// Validate a cluster topology KDL file without calling the API
    ValidateCluster {
        #[arg(default_value = "config/cluster.kdl")]
        path: String,
    },
    /// Validate a runtime policy KDL file without calling the API
    ValidatePolicy {
        #[arg(default_value = "config/policy.kdl")]
        path: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("warn"))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Deploy {
            module,
            version,
            environment,
            requester,
            strategy,
            require_approval,
            force,
        } => {
            commands::deployments::deploy(
                &cli.api_url,
                &module,
                &version,
                &environment,
                &requester,
                strategy,
                require_approval,
                force,
            )
            .await?;
        }
        Commands::Status { execution_id } => {
            commands::deployments::status(&cli.api_url, &execution_id).await?;
        }
        Commands::List { module, environment, limit } => {
            commands::deployments::list(&cli.api_url, module, environment, limit).await?;
        }
        Commands::Rollback { execution_id, actor } => {
            commands::deployments::rollback(&cli.api_url, &execution_id, &actor).await?;
        }
        Commands::Approve { execution_id, approver, reason } => {
            commands::deployments::decide_approval(&cli.api_url, &execution_id, &approver, reason, true).await?;
        }
        Commands::Reject { execution_id, approver, reason } => {
            commands::deployments::decide_approval(&cli.api_url, &execution_id, &approver, reason, false).await?;
        }
        Commands::Cancel { execution_id, actor } => {
            commands::deployments::cancel(&cli.api_url, &execution_id, &actor).await?;
        }
        Commands::ValidateCluster { path } => {
            commands::config::validate_cluster(&path)?;
        }
        Commands::ValidatePolicy { path } => {
            commands::config::validate_policy(&path)?;
        }
    }

    Ok(())
}

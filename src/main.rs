use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{info, Level};

use contractflow::config::ContractflowConfig;
use contractflow::contract::ShareRole;
use contractflow::http::{build_router, AppState};
use contractflow::invites::{mailer_from_config, InviteService};
use contractflow::notifications::UnreadCountPoller;
use contractflow::service::{ContractService, Decision};
use contractflow::store::{DocumentStore, FileStore};
use contractflow::workflows::{progress, ApprovalRecord, ApproverCategory, TransitionOutcome};
use contractflow::{init_telemetry, shutdown_telemetry, Actor};

#[derive(Parser)]
#[command(name = "contractflow")]
#[command(about = "Contract status and approval workflow")]
#[command(long_about = "Drive contracts through review, signing, implementation and amendment. \
                       Transitions are checked against the approval gate and the amendment \
                       sub-workflow before anything is written.")]
struct Cli {
    /// Configuration file (defaults to ./contractflow.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Acting user id
    #[arg(long, global = true, env = "CONTRACTFLOW_ACTOR_ID", default_value = "cli")]
    actor_id: String,

    /// Acting user email
    #[arg(long, global = true, env = "CONTRACTFLOW_ACTOR_EMAIL", default_value = "cli@localhost")]
    actor_email: String,

    /// Acting user display name
    #[arg(long, global = true, env = "CONTRACTFLOW_ACTOR_NAME")]
    actor_name: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a contract in the `requested` state
    Create {
        #[arg(long)]
        title: String,
        /// Additional document fields as a JSON object
        #[arg(long)]
        fields: Option<String>,
    },
    /// Print a contract document
    Show { id: String },
    /// Request a status change or, during an amendment, a stage change
    Transition {
        id: String,
        /// Status (e.g. legal_review) or amendment stage (legal, wwf, counterparty)
        target: String,
        /// Extra fields merged into the contract on a plain status change (JSON object)
        #[arg(long)]
        extra: Option<String>,
    },
    /// Assign the approvers of one category (replaces the existing list)
    Approvers {
        id: String,
        #[arg(long)]
        category: String,
        /// Approver email, repeatable
        #[arg(long = "email", required = true)]
        emails: Vec<String>,
    },
    /// Record an approver's decision
    Decide {
        id: String,
        #[arg(long)]
        category: String,
        #[arg(long)]
        email: String,
        #[arg(long, value_enum)]
        decision: DecisionArg,
        #[arg(long)]
        comment: Option<String>,
    },
    /// Show the progress indicator for a contract
    Progress { id: String },
    /// Share a contract and email the invitation
    Invite {
        id: String,
        #[arg(long)]
        email: String,
        #[arg(long, value_enum, default_value = "viewer")]
        role: RoleArg,
    },
    /// Watch the acting user's unread notification count
    Watch,
    /// Serve the accept-invite endpoint
    Serve,
}

#[derive(Clone, Copy, ValueEnum)]
enum DecisionArg {
    Approve,
    Decline,
}

#[derive(Clone, Copy, ValueEnum)]
enum RoleArg {
    Viewer,
    Editor,
}

fn parse_object(raw: Option<&str>) -> Result<Option<Map<String, Value>>> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    match serde_json::from_str::<Value>(raw).context("invalid JSON")? {
        Value::Object(map) => Ok(Some(map)),
        _ => bail!("expected a JSON object"),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let _ = ContractflowConfig::load_env_file();
    let config = ContractflowConfig::load(cli.config.as_deref())?;
    init_telemetry(&config.observability.log_level, config.observability.json_logs)?;

    let result = tokio::runtime::Runtime::new()?.block_on(run(cli, config));
    shutdown_telemetry();
    result
}

async fn run(cli: Cli, config: ContractflowConfig) -> Result<()> {
    let store: Arc<dyn DocumentStore> = Arc::new(FileStore::new(&config.store.data_dir));
    let contracts = ContractService::new(store.clone());
    let mut actor = Actor::new(cli.actor_id, cli.actor_email);
    if let Some(name) = cli.actor_name {
        actor = actor.with_display_name(name);
    }

    match cli.command {
        Commands::Create { title, fields } => {
            let fields = parse_object(fields.as_deref())?.unwrap_or_default();
            let contract = contracts.create_contract(&actor, &title, fields).await?;
            println!("{}", contract.id);
        }
        Commands::Show { id } => {
            let contract = contracts.get_contract(&id).await?;
            println!("{}", serde_json::to_string_pretty(&contract)?);
        }
        Commands::Transition { id, target, extra } => {
            let extra = parse_object(extra.as_deref())?;
            match contracts
                .request_transition_str(&actor, &id, &target, extra)
                .await?
            {
                TransitionOutcome::Accepted(_) => {
                    let contract = contracts.get_contract(&id).await?;
                    match contract.active_amendment_stage() {
                        Some(stage) => println!("{} (amendment stage: {})", contract.status, stage),
                        None => println!("{}", contract.status),
                    }
                }
                TransitionOutcome::Rejected(rejection) => bail!("{rejection}"),
            }
        }
        Commands::Approvers {
            id,
            category,
            emails,
        } => {
            let category: ApproverCategory = category.parse()?;
            let records = emails.into_iter().map(ApprovalRecord::pending).collect();
            let contract = contracts.set_approvers(&actor, &id, category, records).await?;
            println!("{}", serde_json::to_string_pretty(&contract.approvers)?);
        }
        Commands::Decide {
            id,
            category,
            email,
            decision,
            comment,
        } => {
            let decision = match decision {
                DecisionArg::Approve => Decision::Approve,
                DecisionArg::Decline => Decision::Decline,
            };
            let contract = contracts
                .record_decision(&actor, &id, category.parse()?, &email, decision, comment)
                .await?;
            println!("{}", serde_json::to_string_pretty(&contract.approvers)?);
        }
        Commands::Progress { id } => {
            let contract = contracts.get_contract(&id).await?;
            for marker in progress(contract.status) {
                let mark = if marker.sent_back {
                    "↩"
                } else if marker.current {
                    "●"
                } else if marker.completed {
                    "✓"
                } else {
                    "○"
                };
                println!("{mark} {}", marker.label);
            }
        }
        Commands::Invite { id, email, role } => {
            let role = match role {
                RoleArg::Viewer => ShareRole::Viewer,
                RoleArg::Editor => ShareRole::Editor,
            };
            let invites = InviteService::new(
                store.clone(),
                mailer_from_config(&config.mail)?,
                config.server.public_url.clone(),
            );
            let invite = invites.send_invite(&actor, &id, &email, role).await?;
            println!("{}", invite.id);
        }
        Commands::Watch => {
            let poller = UnreadCountPoller::spawn(
                store.clone(),
                actor.id.clone(),
                Duration::from_secs(config.notifications.poll_interval_seconds.max(1)),
            );
            let mut updates = poller.subscribe();
            loop {
                tokio::select! {
                    changed = updates.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let unread = *updates.borrow_and_update();
                        println!("unread: {unread}");
                    }
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
            poller.stop();
        }
        Commands::Serve => serve(store, &config).await?,
    }
    Ok(())
}

async fn serve(store: Arc<dyn DocumentStore>, config: &ContractflowConfig) -> Result<()> {
    let invites = InviteService::new(
        store,
        mailer_from_config(&config.mail)?,
        config.server.public_url.clone(),
    );
    let state = Arc::new(AppState::new(invites, config.server.app_url.clone()));

    let app = build_router(state).layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    let listener = tokio::net::TcpListener::bind(&config.server.bind_address)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind_address))?;
    info!("contractflow listening on http://{}", config.server.bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await
        .context("server crashed")?;
    Ok(())
}

mod commands;
mod config;
mod server;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process;
use tracing_subscriber::EnvFilter;

use crate::commands::{
    GoalArgs, cmd_auth, cmd_balance, cmd_cloud_summary, cmd_goal_add, cmd_goal_list,
    cmd_goal_primary, cmd_goal_visibility, cmd_shift_add, cmd_shift_earn, cmd_shift_list,
    cmd_shift_status, parse_date,
};
use crate::config::Config;
use shiftbank_core::models::{AuthEvent, OperationType, ShiftStatus, ShiftType};
use shiftbank_core::service::ShiftbankService;

#[derive(Parser)]
#[command(
    name = "shiftbank",
    version,
    about = "Track shifts, earnings and savings goals",
    long_about = "Track shifts, earnings and savings goals offline. Sign in later and \
                  everything you recorded moves into your account."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage savings goals
    Goal {
        #[command(subcommand)]
        command: GoalCommands,
    },
    /// Schedule shifts and record earnings
    Shift {
        #[command(subcommand)]
        command: ShiftCommands,
    },
    /// Show the unallocated balance
    Balance {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Sign in and move offline data into the account
    Login {
        /// Authenticated user id
        user_id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Create an account and move offline data into it
    Signup {
        /// Authenticated user id
        user_id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Resume a saved session, migrating anything left offline
    Restore {
        /// Authenticated user id
        user_id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Inspect cloud account data
    Cloud {
        #[command(subcommand)]
        command: CloudCommands,
    },
    /// Start the session endpoint for an auth provider
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind to (default: 127.0.0.1, use 0.0.0.0 to expose to network)
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
        /// Disable API key authentication (for development/testing)
        #[arg(long)]
        no_auth: bool,
    },
}

#[derive(Subcommand)]
enum GoalCommands {
    /// Create a goal
    Add {
        /// Goal name
        name: String,
        /// Amount to save (e.g. "1000" or "$1,000")
        target: String,
        /// Share of each shift's earnings routed to this goal, in percent
        #[arg(short, long, default_value = "10")]
        allocation: f64,
        /// Icon key
        #[arg(long)]
        icon: Option<String>,
        /// Icon color (hex)
        #[arg(long)]
        color: Option<String>,
        /// Icon background (hex)
        #[arg(long)]
        background: Option<String>,
        /// Target date (YYYY-MM-DD)
        #[arg(long)]
        deadline: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List goals
    List {
        /// Include hidden goals
        #[arg(long)]
        all: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Make a goal the primary one
    Primary {
        /// Goal ID (a unique prefix is enough)
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Hide a goal
    Hide {
        /// Goal ID (a unique prefix is enough)
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Un-hide a goal
    Show {
        /// Goal ID (a unique prefix is enough)
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ShiftCommands {
    /// Schedule a shift
    Add {
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        date: Option<String>,
        /// Shift type: day (08-20) or night (20-08)
        #[arg(short = 't', long = "type", default_value = "day")]
        shift_type: ShiftType,
        /// Operation: returns or receiving
        #[arg(short, long, default_value = "returns")]
        operation: OperationType,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List shifts
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change a shift's status
    Status {
        /// Shift ID (a unique prefix is enough)
        id: String,
        /// scheduled, in_progress, completed, canceled, no_show
        status: ShiftStatus,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Record what a shift paid and split it across goals
    Earn {
        /// Shift ID (a unique prefix is enough)
        id: String,
        /// Amount earned (e.g. "120.50")
        amount: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum CloudCommands {
    /// Show everything stored for an account
    Summary {
        /// Account user id
        user_id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let svc = ShiftbankService::open(&config.local_db_path, &config.cloud_db_path)?;

    match cli.command {
        Commands::Goal { command } => match command {
            GoalCommands::Add {
                name,
                target,
                allocation,
                icon,
                color,
                background,
                deadline,
                json,
            } => {
                let deadline = deadline.map(|d| parse_date(Some(d))).transpose()?;
                let args = GoalArgs {
                    name,
                    target,
                    allocation,
                    icon,
                    color,
                    background,
                    deadline,
                };
                cmd_goal_add(&svc, args, json).await
            }
            GoalCommands::List { all, json } => cmd_goal_list(&svc, all, json).await,
            GoalCommands::Primary { id, json } => cmd_goal_primary(&svc, &id, json).await,
            GoalCommands::Hide { id, json } => cmd_goal_visibility(&svc, &id, true, json).await,
            GoalCommands::Show { id, json } => cmd_goal_visibility(&svc, &id, false, json).await,
        },
        Commands::Shift { command } => match command {
            ShiftCommands::Add {
                date,
                shift_type,
                operation,
                json,
            } => cmd_shift_add(&svc, date, shift_type, operation, json).await,
            ShiftCommands::List { json } => cmd_shift_list(&svc, json).await,
            ShiftCommands::Status { id, status, json } => {
                cmd_shift_status(&svc, &id, status, json).await
            }
            ShiftCommands::Earn { id, amount, json } => {
                cmd_shift_earn(&svc, &id, &amount, json).await
            }
        },
        Commands::Balance { json } => cmd_balance(&svc, json).await,
        Commands::Login { user_id, json } => cmd_auth(&svc, AuthEvent::SignIn, &user_id, json).await,
        Commands::Signup { user_id, json } => {
            cmd_auth(&svc, AuthEvent::SignUp, &user_id, json).await
        }
        Commands::Restore { user_id, json } => {
            cmd_auth(&svc, AuthEvent::SessionRestore, &user_id, json).await
        }
        Commands::Cloud { command } => match command {
            CloudCommands::Summary { user_id, json } => {
                cmd_cloud_summary(&svc, &user_id, json).await
            }
        },
        Commands::Serve {
            port,
            bind,
            no_auth,
        } => {
            let api_key = if no_auth {
                None
            } else {
                Some(config.load_or_create_api_key()?.0)
            };
            server::start_server(svc, port, &bind, api_key).await
        }
    }
}

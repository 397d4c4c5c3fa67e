//! Command-line driver for member transfers.
//!
//! Usage:
//!   member-tx init
//!   member-tx create A 10000
//!   member-tx transfer A B 2000
//!   member-tx transfer A ex 2000 --no-transaction
//!
//! Reads DATABASE_URL and friends from the environment or `.env`;
//! RUST_LOG controls log output (default: info).

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use member_unit_of_work::{
    schema, DatabaseConfig, Member, MemberRepository, MemberService, TransactionCoordinator,
};

#[derive(Parser, Debug)]
#[command(name = "member-tx", about = "Transactional member balance operations")]
struct Cli {
    /// Enable debug logging unless RUST_LOG is set
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the member table if missing
    Init,
    /// Insert a new member
    Create { member_id: String, money: i64 },
    /// Print a member's balance
    Show { member_id: String },
    /// Move money between two members
    Transfer {
        from: String,
        to: String,
        amount: i64,
        /// Run each statement in auto-commit mode instead of one transaction
        #[arg(long)]
        no_transaction: bool,
    },
    /// Remove a member
    Delete { member_id: String },
}

fn init_tracing(debug: bool) -> Result<()> {
    let filter = if debug {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(debug)
        .compact()
        .try_init()
        .map_err(|err| anyhow!(err))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug).context("failed to initialise logging")?;

    let config = DatabaseConfig::from_env().context("failed to load database configuration")?;
    let coordinator = TransactionCoordinator::from_config(&config)
        .await
        .context("failed to connect to the database")?;
    let repository = MemberRepository::new();

    match cli.command {
        Command::Init => {
            schema::ensure_schema(coordinator.pool()).await?;
            println!("member table ready");
        }
        Command::Create { member_id, money } => {
            let member = Member::new(member_id, money)?;
            let saved = coordinator
                .run_in_transaction(|| repository.save(&member))
                .await?;
            println!("{} {}", saved.member_id(), saved.money);
        }
        Command::Show { member_id } => {
            let member = coordinator
                .run_auto_commit(|| repository.find_by_id(&member_id))
                .await?;
            println!("{} {}", member.member_id(), member.money);
        }
        Command::Transfer {
            from,
            to,
            amount,
            no_transaction,
        } => {
            let service = MemberService::new(&coordinator);
            let outcome = if no_transaction {
                service.account_transfer_auto_commit(&from, &to, amount).await
            } else {
                service.account_transfer(&from, &to, amount).await
            };
            if let Err(err) = &outcome {
                let origin = if err.is_business_fault() {
                    "rejected by business rules"
                } else {
                    "store failure"
                };
                tracing::error!(error = %err, origin, "transfer failed");
            }
            outcome?;
            println!("transferred {amount} from {from} to {to}");
        }
        Command::Delete { member_id } => {
            coordinator
                .run_in_transaction(|| repository.delete(&member_id))
                .await?;
            println!("deleted {member_id}");
        }
    }

    coordinator.pool().close().await;
    Ok(())
}

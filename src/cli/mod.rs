use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};

use crate::application::{AccountService, BONUS_AMOUNT, TransferPolicy};
use crate::domain::{Balance, EntityId, RelationEntry, RelationRegistry};

/// Passbook - Account Ledger Service
#[derive(Parser)]
#[command(name = "passbook")]
#[command(about = "An account ledger over a SQLite-backed document store")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(short, long, default_value = "passbook.db")]
    pub database: String,

    /// Relation descriptors to load at startup (JSON file)
    #[arg(short, long, global = true)]
    pub relations: Option<String>,

    /// Refuse transfers that would drive a balance negative
    #[arg(long, global = true)]
    pub strict: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Account management commands
    #[command(subcommand)]
    Account(AccountCommands),

    /// Send balance from one account to another
    Send {
        /// Source account id (24 hex characters)
        from: String,

        /// Destination account id (24 hex characters)
        to: String,

        /// Amount to transfer (non-negative integer)
        amount: Balance,
    },

    /// Credit every account with the standard bonus
    Bonus,

    /// Replay cleanup for deletions interrupted before completion
    Recover,
}

#[derive(Subcommand)]
pub enum AccountCommands {
    /// Create a new account
    Create {
        /// Opening balance
        #[arg(short, long, default_value_t = 0)]
        balance: Balance,

        /// Owner entity id (24 hex characters)
        #[arg(long)]
        owner: Option<String>,
    },

    /// Open an account for an owner with the standard opening balance
    New {
        /// Owner entity id (24 hex characters)
        owner: String,
    },

    /// List all accounts
    List,

    /// Show a single account
    Show {
        /// Account id
        id: String,
    },

    /// Update account fields
    Update {
        /// Account id
        id: String,

        /// Field assignments as name=value pairs (values parsed as JSON when possible)
        fields: Vec<String>,
    },

    /// Delete an account and scrub references to it
    Remove {
        /// Account id
        id: String,
    },

    /// Count accounts
    Count,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        init_tracing(self.verbose);

        let registry = self.load_registry()?;
        let policy = TransferPolicy {
            allow_negative_balance: !self.strict,
        };

        match self.command {
            Commands::Init => {
                AccountService::init(&self.database, registry, policy).await?;
                println!("Database initialized: {}", self.database);
            }

            Commands::Account(account_cmd) => {
                let service = AccountService::connect(&self.database, registry, policy).await?;
                run_account_command(&service, account_cmd).await?;
            }

            Commands::Send { from, to, amount } => {
                let service = AccountService::connect(&self.database, registry, policy).await?;
                let from = EntityId::parse(&from).context("Invalid source account id")?;
                let to = EntityId::parse(&to).context("Invalid destination account id")?;

                let account = service.send(&from, &to, amount).await?;
                println!(
                    "Sent {} from {} to {}; source balance now {}",
                    amount, from, to, account.balance
                );
            }

            Commands::Bonus => {
                let service = AccountService::connect(&self.database, registry, policy).await?;
                let outcome = service.bonus().await?;
                println!(
                    "Credited {} to {} account(s); {} account(s) total",
                    BONUS_AMOUNT, outcome.mutated, outcome.accounts
                );
            }

            Commands::Recover => {
                let service = AccountService::connect(&self.database, registry, policy).await?;
                let resumed = service.recover().await?;
                println!("Resumed {} interrupted cascade(s)", resumed);
            }
        }

        Ok(())
    }

    fn load_registry(&self) -> Result<RelationRegistry> {
        match &self.relations {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read relations file: {}", path))?;
                let entries: Vec<RelationEntry> =
                    serde_json::from_str(&raw).context("Invalid relations file")?;
                Ok(RelationRegistry::from_entries(entries))
            }
            None => Ok(RelationRegistry::new()),
        }
    }
}

async fn run_account_command(service: &AccountService, command: AccountCommands) -> Result<()> {
    match command {
        AccountCommands::Create { balance, owner } => {
            let mut fields = Map::new();
            if let Some(owner) = owner {
                let owner = EntityId::parse(&owner).context("Invalid owner id")?;
                fields.insert("owner".to_string(), Value::String(owner.to_string()));
            }

            let account = service.create_account(balance, fields).await?;
            println!("Created account {} with balance {}", account.id, account.balance);
        }

        AccountCommands::New { owner } => {
            let owner = EntityId::parse(&owner).context("Invalid owner id")?;
            let account = service
                .create_account_for_owner(Some(owner.clone()), Map::new())
                .await?;
            println!(
                "Opened account {} for owner {} with balance {}",
                account.id, owner, account.balance
            );
        }

        AccountCommands::List => {
            let accounts = service.list_accounts().await?;
            if accounts.is_empty() {
                println!("No accounts");
            }
            for account in accounts {
                println!("{}  {}", account.id, account.balance);
            }
        }

        AccountCommands::Show { id } => {
            let id = EntityId::parse(&id).context("Invalid account id")?;
            match service.find_account(&id).await? {
                Some(account) => println!("{}", serde_json::to_string_pretty(&account)?),
                None => println!("Account not found: {}", id),
            }
        }

        AccountCommands::Update { id, fields } => {
            let id = EntityId::parse(&id).context("Invalid account id")?;
            let fields = parse_field_assignments(&fields)?;
            let account = service.update_account(&id, fields).await?;
            println!("Updated account {}", account.id);
        }

        AccountCommands::Remove { id } => {
            let id = EntityId::parse(&id).context("Invalid account id")?;
            match service.remove_account(&id).await? {
                Some(account) => println!(
                    "Removed account {} (balance was {})",
                    account.id, account.balance
                ),
                None => println!("Account not found: {}", id),
            }
        }

        AccountCommands::Count => {
            println!("{}", service.count_accounts().await?);
        }
    }

    Ok(())
}

fn parse_field_assignments(pairs: &[String]) -> Result<Map<String, Value>> {
    let mut fields = Map::new();
    for pair in pairs {
        let (name, raw) = pair
            .split_once('=')
            .with_context(|| format!("Invalid field assignment '{}', expected name=value", pair))?;
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        fields.insert(name.to_string(), value);
    }
    Ok(fields)
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "passbook=debug" } else { "passbook=warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

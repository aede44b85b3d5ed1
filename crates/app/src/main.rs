use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use client::{HttpBackend, JsonFileStore, MutationGateway, OperationResult};
use engine::{AccountKind, Engine};
use migration::{Migrator, MigratorTrait};
use settings::Database;

mod settings;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Parser, Debug)]
#[command(name = "borsa")]
#[command(about = "Offline-first personal ledger")]
struct Cli {
    /// Settings file, extension optional (also read from `BORSA_SETTINGS`).
    #[arg(long, env = "BORSA_SETTINGS", default_value = "settings")]
    settings: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the authoritative ledger over HTTP.
    Serve,
    /// Replay the local offline queue against the server.
    Sync(SyncArgs),
    User(User),
    Account(Account),
}

#[derive(Args, Debug)]
struct SyncArgs {
    /// Client config file (defaults to `config/client.toml`).
    #[arg(long, env = "BORSA_CLIENT_CONFIG")]
    config: Option<String>,
}

#[derive(Args, Debug)]
struct User {
    #[command(subcommand)]
    command: UserCommand,
}

#[derive(Subcommand, Debug)]
enum UserCommand {
    Create(UserCreateArgs),
}

#[derive(Args, Debug)]
struct UserCreateArgs {
    #[arg(long)]
    username: String,
    #[arg(long, env = "BORSA_USER_PASSWORD")]
    password: String,
}

#[derive(Args, Debug)]
struct Account {
    #[command(subcommand)]
    command: AccountCommand,
}

#[derive(Subcommand, Debug)]
enum AccountCommand {
    Create(AccountCreateArgs),
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum KindArg {
    Ordinary,
    CreditLine,
}

impl From<KindArg> for AccountKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Ordinary => AccountKind::Ordinary,
            KindArg::CreditLine => AccountKind::CreditLine,
        }
    }
}

#[derive(Args, Debug)]
struct AccountCreateArgs {
    #[arg(long)]
    owner: String,
    #[arg(long)]
    name: String,
    #[arg(long, value_enum, default_value = "ordinary")]
    kind: KindArg,
    /// Credit limit as a decimal, e.g. `1500.00`.
    #[arg(long)]
    credit_limit: Option<engine::Amount>,
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let cli = Cli::parse();
    let settings = settings::Settings::new(&cli.settings)?;

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "borsa={level},client={level},server={level},engine={level}",
            level = settings.app.level
        ))
        .init();

    match cli.command {
        Command::Serve => serve(settings).await,
        Command::Sync(args) => sync(args).await,
        Command::User(User {
            command: UserCommand::Create(args),
        }) => {
            let engine = open_engine(&settings).await?;
            engine.create_user(&args.username, &args.password).await?;
            tracing::info!(username = %args.username, "user created");
            Ok(())
        }
        Command::Account(Account {
            command: AccountCommand::Create(args),
        }) => {
            let engine = open_engine(&settings).await?;
            let id = engine
                .create_account(
                    &args.owner,
                    &args.name,
                    args.kind.into(),
                    args.credit_limit.map(|limit| limit.minor()),
                )
                .await?;
            println!("{id}");
            Ok(())
        }
    }
}

async fn serve(settings: settings::Settings) -> Result<(), BoxError> {
    let Some(server) = settings.server.clone() else {
        return Err("no [server] section in settings".into());
    };
    tracing::info!("Found server settings...");
    let engine = open_engine(&settings).await?;
    let bind = server.bind.unwrap_or_else(|| "127.0.0.1".to_string());
    let listener = tokio::net::TcpListener::bind(format!("{bind}:{}", server.port)).await?;
    server::run_with_listener(engine, listener).await?;
    Ok(())
}

async fn sync(args: SyncArgs) -> Result<(), BoxError> {
    let config = client::config::load(args.config.as_deref())?;
    let store = Arc::new(JsonFileStore::new(&config.state_dir)?);
    let backend = Arc::new(HttpBackend::new(
        &config.base_url,
        &config.username,
        &config.password,
        config.sync.request_timeout(),
    )?);
    let mut gateway = MutationGateway::open(store, backend, config.sync.clone())?;
    if gateway.queue().is_empty() {
        tracing::info!("nothing to sync");
        return Ok(());
    }

    gateway.set_online(true);
    let report = gateway.sync().await?;
    for entry in &report.results {
        match &entry.result {
            OperationResult::Confirmed(_) => {
                tracing::info!(op_id = %entry.op_id, kind = %entry.kind, "synced");
            }
            OperationResult::Rejected { code, message } => {
                tracing::warn!(op_id = %entry.op_id, kind = %entry.kind, %code, %message, "rejected");
            }
            OperationResult::Retrying {
                next_attempt_at,
                error,
                ..
            } => {
                tracing::info!(op_id = %entry.op_id, kind = %entry.kind, %next_attempt_at, %error, "will retry on a later run");
            }
            OperationResult::Exhausted { message } => {
                tracing::warn!(op_id = %entry.op_id, kind = %entry.kind, %message, "gave up");
            }
        }
    }

    let failed = gateway.failed_operations().len();
    if failed > 0 {
        tracing::warn!(failed, "operations need attention");
    }
    gateway.shutdown()?;
    Ok(())
}

async fn open_engine(settings: &settings::Settings) -> Result<Engine, BoxError> {
    let db = match &settings.server {
        Some(server) => parse_database(&server.database).await?,
        None => parse_database(&Database::Memory).await?,
    };
    Ok(Engine::builder().database(db).build().await?)
}

async fn parse_database(config: &Database) -> Result<sea_orm::DatabaseConnection, BoxError> {
    let url = match config {
        Database::Memory => String::from("sqlite::memory:"),
        Database::Sqlite(path) => format!("sqlite:{path}?mode=rwc"),
    };

    let database = sea_orm::Database::connect(url).await?;
    Migrator::up(&database, None).await?;
    Ok(database)
}

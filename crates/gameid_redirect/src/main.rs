use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Args, CommandFactory, Parser, Subcommand};
use gameid_redirect_core::identifier::GameIdentifier;
use gameid_redirect_core::migrate::{
    MIGRATIONS_POLICY_MESSAGE, pending_migration_count, run_migrations,
};
use gameid_redirect_core::report::{list_missing, store_stats};
use gameid_redirect_core::resolver::Resolver;
use gameid_redirect_core::runtime::{Runtime, RuntimeOverrides, load_runtime, normalize_for_display};
use gameid_redirect_core::server::{page_location, serve};
use gameid_redirect_core::store::SqliteStore;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "gameid_redirect=info,gameid_redirect_core=info,tower_http=info";

#[derive(Debug, Parser)]
#[command(
    name = "gameid-redirect",
    version,
    about = "Redirect game identifiers to their wiki pages"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH", help = "SQLite database path")]
    db: Option<PathBuf>,
    #[arg(long, global = true, help = "Print resolved runtime diagnostics")]
    diagnostics: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Serve redirects over HTTP")]
    Serve,
    #[command(about = "Resolve one identifier (records a miss like a real request)")]
    Resolve(ResolveArgs),
    #[command(about = "List identifiers that had no matching page")]
    Missing(MissingArgs),
    Page(PageArgs),
    Db(DbArgs),
}

#[derive(Debug, Args)]
struct ResolveArgs {
    gameid: String,
    #[arg(long, help = "Print JSON instead of text")]
    json: bool,
}

#[derive(Debug, Args)]
struct MissingArgs {
    #[arg(long, default_value_t = 50)]
    limit: usize,
    #[arg(long, help = "Print JSON instead of text")]
    json: bool,
}

#[derive(Debug, Args)]
struct PageArgs {
    #[command(subcommand)]
    command: PageSubcommand,
}

#[derive(Debug, Subcommand)]
enum PageSubcommand {
    #[command(about = "Insert a page or update its redirect flag")]
    Add {
        title: String,
        #[arg(long)]
        redirect: bool,
    },
}

#[derive(Debug, Args)]
struct DbArgs {
    #[command(subcommand)]
    command: DbSubcommand,
}

#[derive(Debug, Subcommand)]
enum DbSubcommand {
    Migrate,
    Stats,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    match &cli.command {
        Some(Commands::Serve) => run_serve(&cli_runtime(&cli)?, cli.diagnostics),
        Some(Commands::Resolve(args)) => run_resolve(&cli_runtime(&cli)?, args, cli.diagnostics),
        Some(Commands::Missing(args)) => run_missing(&cli_runtime(&cli)?, args),
        Some(Commands::Page(PageArgs {
            command: PageSubcommand::Add { title, redirect },
        })) => run_page_add(&cli_runtime(&cli)?, title, *redirect),
        Some(Commands::Db(DbArgs { command })) => {
            let runtime = cli_runtime(&cli)?;
            match command {
                DbSubcommand::Migrate => run_db_migrate(&runtime, cli.diagnostics),
                DbSubcommand::Stats => run_db_stats(&runtime, cli.diagnostics),
            }
        }
        None => {
            let mut command = Cli::command();
            command.print_help()?;
            println!();
            Ok(())
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn cli_runtime(cli: &Cli) -> Result<Runtime> {
    dotenvy::dotenv().ok();

    let cwd = env::current_dir().context("failed to read current directory")?;
    let overrides = RuntimeOverrides {
        config: cli.config.clone(),
        db_path: cli.db.clone(),
    };
    load_runtime(&cwd, &overrides)
}

fn open_store(runtime: &Runtime) -> Result<SqliteStore> {
    let pending = pending_migration_count(&runtime.settings.store)?;
    if pending > 0 {
        bail!(
            "{} has {pending} pending migration(s).\n{MIGRATIONS_POLICY_MESSAGE}",
            normalize_for_display(&runtime.settings.store.db_path)
        );
    }
    SqliteStore::open(&runtime.settings.store).context("failed to open redirect store")
}

fn print_diagnostics(runtime: &Runtime, diagnostics: bool) {
    if diagnostics {
        println!("\n[diagnostics]\n{}", runtime.diagnostics());
    }
}

fn run_serve(runtime: &Runtime, diagnostics: bool) -> Result<()> {
    // Refuse to start on a missing or unmigrated database.
    drop(open_store(runtime)?);
    print_diagnostics(runtime, diagnostics);

    let settings = runtime.settings.clone();
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?
        .block_on(serve(settings))
}

fn run_resolve(runtime: &Runtime, args: &ResolveArgs, diagnostics: bool) -> Result<()> {
    let identifier = GameIdentifier::parse(Some(&args.gameid))?;
    let store = open_store(runtime)?;
    let resolution = Resolver::new(runtime.settings.region_slot).resolve(&store, &identifier)?;
    let location = page_location(&runtime.settings.page_url, &resolution.title);

    if args.json {
        let mut value = serde_json::to_value(&resolution)?;
        if let Some(object) = value.as_object_mut() {
            object.insert("gameid".to_string(), identifier.as_str().into());
            object.insert("location".to_string(), location.into());
        }
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }
    println!("resolve");
    println!("gameid: {identifier}");
    println!("title: {}", resolution.title);
    println!("outcome: {}", resolution.outcome.as_str());
    println!("location: {location}");
    print_diagnostics(runtime, diagnostics);
    Ok(())
}

fn run_missing(runtime: &Runtime, args: &MissingArgs) -> Result<()> {
    let store = open_store(runtime)?;
    let records = list_missing(&store, args.limit)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }
    println!("missing redirects");
    println!("db_path: {}", normalize_for_display(store.db_path()));
    println!("count: {}", records.len());
    for record in &records {
        println!("  - {} ({})", record.gameid, record.count);
    }
    Ok(())
}

fn run_page_add(runtime: &Runtime, title: &str, redirect: bool) -> Result<()> {
    let title = title.trim();
    if title.is_empty() {
        bail!("page title cannot be empty");
    }
    let store = open_store(runtime)?;
    store.upsert_page(title, redirect)?;
    println!("page add");
    println!("title: {title}");
    println!("redirect: {}", if redirect { "yes" } else { "no" });
    Ok(())
}

fn run_db_migrate(runtime: &Runtime, diagnostics: bool) -> Result<()> {
    let report = run_migrations(&runtime.settings.store)?;
    println!("db migrate");
    println!(
        "db_path: {}",
        normalize_for_display(&runtime.settings.store.db_path)
    );
    println!("applied: {}", report.applied.len());
    for migration in &report.applied {
        println!("  - v{:03}_{}", migration.version, migration.name);
    }
    println!("current_version: {}", report.current_version);
    print_diagnostics(runtime, diagnostics);
    Ok(())
}

fn run_db_stats(runtime: &Runtime, diagnostics: bool) -> Result<()> {
    let store = open_store(runtime)?;
    let stats = store_stats(&store)?;
    println!("db stats");
    println!("db_path: {}", normalize_for_display(store.db_path()));
    println!("pages: {}", stats.pages);
    println!("redirects: {}", stats.redirects);
    println!("missing_identifiers: {}", stats.missing_identifiers);
    println!("missing_hits: {}", stats.missing_hits);
    print_diagnostics(runtime, diagnostics);
    Ok(())
}

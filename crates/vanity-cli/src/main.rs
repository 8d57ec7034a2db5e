#![forbid(unsafe_code)]

mod cmd;
mod git;
mod github;
mod identity;
mod output;

use clap::{Parser, Subcommand};
use output::{CliError, OutputMode, render_error, resolve_output_mode};
use std::env;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "vanity: mirror your team's GitHub activity into your own commit graph",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Act as this GitHub login (skips identity lookup).
    #[arg(long, global = true, value_name = "LOGIN")]
    user: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn output_mode(&self) -> OutputMode {
        resolve_output_mode(self.json)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Initialize vanity in this repository",
        long_about = "Create the .vanity/ data directory with a default config.",
        after_help = "EXAMPLES:\n    # Initialize the shared repository\n    vanity init\n\n    # Emit machine-readable output\n    vanity init --json"
    )]
    Init(cmd::init::InitArgs),

    #[command(
        about = "Record your activity and mirror everyone else's",
        long_about = "Fetch your recent GitHub contributions into your record, then create \
                      backdated commits for whatever other members have recorded since the \
                      last sync, pushing as it goes.",
        after_help = "EXAMPLES:\n    # Regular sync\n    vanity sync\n\n    # Preview without committing\n    vanity sync --dry-run\n\n    # Push every 50 mirror commits\n    vanity sync --batch-size 50\n\n    # Wipe history and mirror everything again\n    vanity sync --rebuild"
    )]
    Sync(cmd::sync::SyncArgs),

    #[command(
        about = "Show members and mirror progress",
        long_about = "List every recorded member with their totals, and how much of each \
                      one you have mirrored.",
        after_help = "EXAMPLES:\n    # Show status\n    vanity status\n\n    # Emit machine-readable output\n    vanity status --json"
    )]
    Status(cmd::status::StatusArgs),

    #[command(
        about = "Import another user's full history",
        long_about = "Fetch a user's complete contribution history and store it as their \
                      record, for members who do not run vanity themselves.",
        after_help = "EXAMPLES:\n    # Import through the GitHub API\n    vanity import octocat\n\n    # Read the public profile calendar instead\n    vanity import octocat --scrape"
    )]
    Import(cmd::import::ImportArgs),
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("VANITY_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose || env::var("DEBUG").is_ok() {
            "vanity=debug,vanity_cli=debug,vanity_core=debug,info"
        } else {
            "vanity=info,vanity_cli=info,vanity_core=info,warn"
        })
    });

    let format = env::var("VANITY_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn run(cli: Cli, output: OutputMode) -> anyhow::Result<()> {
    let ctx = cmd::Context {
        project_root: env::current_dir()?,
        output,
        user_flag: cli.user,
    };
    debug!(root = %ctx.project_root.display(), ?output, "starting");

    match cli.command {
        Commands::Init(args) => cmd::init::run_init(&args, &ctx),
        Commands::Sync(args) => cmd::sync::run_sync(&args, &ctx),
        Commands::Status(args) => cmd::status::run_status(&args, &ctx),
        Commands::Import(args) => cmd::import::run_import(&args, &ctx),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let output = cli.output_mode();

    match run(cli, output) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            debug!(error = ?err, "command failed");
            if let Err(render_err) = render_error(output, &CliError::from(&err)) {
                eprintln!("error: {err:#} ({render_err})");
            }
            ExitCode::FAILURE
        }
    }
}

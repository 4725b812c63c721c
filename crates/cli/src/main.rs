mod compile_cmd;

use {
    clap::{Parser, Subcommand},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "gh-aw", about = "gh-aw — agentic workflow compiler")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile workflow specs to .lock.yml files.
    Compile {
        /// Files or globs to compile (default: .github/workflows/*.md).
        patterns: Vec<String>,

        /// Repository root to compile in.
        #[arg(long, default_value = ".")]
        dir: std::path::PathBuf,

        /// Enable strict-mode checks for every file.
        #[arg(long, default_value_t = false)]
        strict: bool,

        /// Validate without writing lock files.
        #[arg(long, default_value_t = false)]
        no_emit: bool,

        /// Emit diagnostics as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,

        /// Overall deadline in seconds.
        #[arg(long)]
        timeout: Option<u64>,
    },
}

fn init_tracing(log_level: &str, json_logs: bool) {
    let filter = EnvFilter::try_new(log_level)
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_default();
    let registry = tracing_subscriber::registry().with(filter);
    if json_logs {
        registry.with(fmt::layer().json().with_writer(std::io::stderr)).init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.json_logs);

    let exit_code = match cli.command {
        Commands::Compile {
            patterns,
            dir,
            strict,
            no_emit,
            json,
            timeout,
        } => {
            compile_cmd::run_compile(compile_cmd::CompileOptions {
                patterns,
                dir,
                strict,
                no_emit,
                json,
                timeout_secs: timeout,
            })
            .await?
        },
    };

    std::process::exit(exit_code);
}

//! jsoncmd CLI: serve and call JSON command targets.
//!
//! Reuses the same dispatcher (jsoncmd-core) and server bootstrap
//! (jsoncmd-server) that the HTTP endpoint runs on.

use clap::{Parser, Subcommand};
use jsoncmd_cli::commands;

/// jsoncmd: JSON command dispatch over HTTP
#[derive(Parser)]
#[command(name = "jsoncmd", version, about = "jsoncmd: JSON command dispatch over HTTP")]
pub struct Cli {
    /// Path to a YAML dispatch configuration file
    #[arg(long, env = "JSONCMD_CONFIG", global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the jsoncmd HTTP server
    Serve {
        /// Host to bind to
        #[arg(long, env = "JSONCMD_HOST", default_value = "127.0.0.1")]
        host: String,
        /// Port to listen on
        #[arg(long, env = "JSONCMD_PORT", default_value_t = 3210)]
        port: u16,
        /// Mount prefix of the command endpoint ("/" for the root)
        #[arg(long, env = "JSONCMD_PREFIX", default_value = "/json")]
        prefix: String,
    },

    /// Call a target operation in-process and print the envelope
    Call {
        /// Target name (e.g. "System")
        target: String,
        /// Operation name (e.g. "echo")
        operation: String,
        /// Positional arguments as a JSON array
        #[arg(long, default_value = "[]")]
        args: String,
    },

    /// List registered targets and their operations
    Targets,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "jsoncmd_core=warn,jsoncmd_server=warn,jsoncmd_cli=info".into()),
        )
        .init();

    let result = match commands::load_dispatch_config(cli.config.as_deref()) {
        Err(e) => Err(e),
        Ok(dispatch) => match cli.command {
            Some(Commands::Serve { host, port, prefix }) => {
                commands::server::run(host, port, prefix, dispatch).await
            }
            Some(Commands::Call {
                target,
                operation,
                args,
            }) => match commands::init_dispatcher(dispatch) {
                Ok(dispatcher) => {
                    commands::call::call(&dispatcher, &target, &operation, &args).await
                }
                Err(e) => Err(e),
            },
            Some(Commands::Targets) => {
                commands::init_dispatcher(dispatch).and_then(|d| commands::targets::list(&d))
            }
            None => {
                // No subcommand: show help
                use clap::CommandFactory;
                Cli::command().print_help().ok();
                println!();
                Ok(())
            }
        },
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

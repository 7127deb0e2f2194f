//! twinrpc demo - Entry point

use std::path::PathBuf;

use anyhow::Context as _;
use twinrpc_config::{ConfigLoader, ENV_PREFIX};
use twinrpc_demo::{build_app, FileStore, Services, VERSION};
use twinrpc_server::Server;

/// Command-line arguments.
struct Args {
    /// Path to configuration file.
    config: Option<PathBuf>,
}

impl Args {
    fn parse() -> Self {
        let mut args = std::env::args().skip(1);
        let mut config = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" | "-c" => {
                    config = args.next().map(PathBuf::from);
                }
                "--help" | "-h" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("twinrpc-demo {VERSION}");
                    std::process::exit(0);
                }
                other => {
                    eprintln!("Unknown argument: {other}");
                    eprintln!("Use --help for usage information");
                    std::process::exit(1);
                }
            }
        }

        Self { config }
    }
}

fn print_help() {
    println!(
        r"twinrpc demo - user and post procedures over two RPC transports

USAGE:
    twinrpc-demo [OPTIONS]

OPTIONS:
    -c, --config <PATH>    Path to configuration file (TOML or JSON)
    -h, --help             Print help information
    -v, --version          Print version information

ENVIRONMENT VARIABLES:
    TWINRPC__SERVER__HTTP_ADDR              Listen address (default: 0.0.0.0:4000)
    TWINRPC__SERVER__REQUEST_TIMEOUT_MS     Per-request deadline (default: 30000)
    TWINRPC__TELEMETRY__LOGGING__LEVEL      Log filter (default: info)
    TWINRPC__TELEMETRY__LOGGING__FORMAT     json or pretty
    TWINRPC__SECURITY__ENFORCE_LEGACY_AUTH  Reject anonymous protected legacy calls
    TWINRPC__QUOTA__ENABLED                 Enable the in-memory rate limiter
    TWINRPC__UPLOADS__ROOT                  Upload directory (default: uploads)

EXAMPLES:
    # Run with configuration file
    twinrpc-demo --config twinrpc.toml

    # Run on another port with readable logs
    TWINRPC__SERVER__HTTP_ADDR=127.0.0.1:8080 \
    TWINRPC__TELEMETRY__LOGGING__FORMAT=pretty twinrpc-demo
"
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut loader = ConfigLoader::new();
    if let Some(path) = &args.config {
        loader = loader
            .with_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?;
    }
    let config = loader
        .with_dotenv()?
        .with_env_prefix(ENV_PREFIX)
        .load()
        .context("invalid configuration")?;

    twinrpc_telemetry::init_telemetry(&config.telemetry_config())
        .context("failed to initialize telemetry")?;

    tracing::info!(
        version = VERSION,
        addr = %config.server.http_addr,
        uploads = %config.uploads.root.display(),
        "starting twinrpc demo"
    );

    let services = Services::seeded(FileStore::new(&config.uploads.root));
    let app = build_app(&config, services).context("failed to build routers")?;

    Server::new(app).run().await?;
    Ok(())
}

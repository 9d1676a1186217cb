//! timerstore - interactive demo
//!
//! Starts a timer store on the chosen provider and reads commands from
//! stdin. Expired keys are printed as they are swept.

use std::sync::Arc;
use std::time::Duration;
use timerstore::{
    BackendConfig, MemProvider, Provider, Registry, RespBackend, SharedProvider, TimerStore,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Which provider to run on
#[derive(Debug, Clone, Copy, PartialEq)]
enum BackendKind {
    Mem,
    Resp,
}

/// Demo configuration
struct Config {
    backend: BackendKind,
    prefix: String,
    interval: Duration,
    store: BackendConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendKind::Mem,
            prefix: "timerstore".to_string(),
            interval: Duration::from_secs(1),
            store: BackendConfig::default(),
        }
    }
}

impl Config {
    /// Parse configuration from command-line arguments
    fn from_args() -> anyhow::Result<Self> {
        let mut config = Config::default();
        let mut args = std::env::args().skip(1);

        while let Some(arg) = args.next() {
            let mut value = |name: &str| {
                args.next()
                    .ok_or_else(|| anyhow::anyhow!("{} requires a value", name))
            };
            match arg.as_str() {
                "--backend" | "-b" => {
                    config.backend = match value("--backend")?.as_str() {
                        "mem" => BackendKind::Mem,
                        "resp" => BackendKind::Resp,
                        other => anyhow::bail!("unknown backend: {}", other),
                    }
                }
                "--host" | "-h" => config.store.host = value("--host")?,
                "--port" | "-p" => config.store.port = value("--port")?.parse()?,
                "--password" => config.store.password = Some(value("--password")?),
                "--prefix" => config.prefix = value("--prefix")?,
                "--interval-ms" => {
                    config.interval = Duration::from_millis(value("--interval-ms")?.parse()?)
                }
                "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("timerstore version {}", timerstore::VERSION);
                    std::process::exit(0);
                }
                other => anyhow::bail!("unknown argument: {}", other),
            }
        }

        Ok(config)
    }
}

fn print_help() {
    println!(
        r#"
timerstore - TTL keyed store with expiry callbacks

USAGE:
    timerstore [OPTIONS]

OPTIONS:
    -b, --backend <mem|resp>   Provider to use (default: mem)
    -h, --host <HOST>          Shared store host (default: 127.0.0.1)
    -p, --port <PORT>          Shared store port (default: 6379)
        --password <PASS>      Shared store password
        --prefix <PREFIX>      Key namespace (default: timerstore)
        --interval-ms <MS>     Sweep interval (default: 1000)
    -v, --version              Print version information
        --help                 Print this help message

COMMANDS (stdin):
    set <key> <ttl-seconds> <value>
    get <key>
    del <key>
    quit
"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_args()?;

    // Set up logging
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    let provider: Arc<dyn Provider> = match config.backend {
        BackendKind::Mem => Arc::new(MemProvider::new()),
        BackendKind::Resp => {
            let backend = RespBackend::connect(config.store.clone()).await?;
            info!(address = %config.store.address(), "Connected to shared store");
            Arc::new(SharedProvider::new(Arc::new(backend)))
        }
    };

    let registry = Registry::new();
    registry.register("default", provider)?;

    let timers = TimerStore::new(
        &registry,
        &config.prefix,
        "default",
        config.interval,
        |key, value| println!("expired: {} = {}", key, value),
    )?;

    tokio::select! {
        result = repl(&timers) => result?,
        _ = signal::ctrl_c() => info!("Shutdown signal received"),
    }

    timers.stop();
    Ok(())
}

/// Reads commands from stdin until EOF or `quit`.
async fn repl(timers: &TimerStore) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let mut parts = line.splitn(4, char::is_whitespace);
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some("set"), Some(key), Some(ttl), Some(value)) => match ttl.parse::<i64>() {
                Ok(ttl) => match timers.set(key, value, ttl).await {
                    Ok(()) => println!("OK"),
                    Err(e) => println!("(error) {}", e),
                },
                Err(_) => println!("(error) ttl must be an integer"),
            },
            (Some("get"), Some(key), None, None) => match timers.get(key).await {
                Ok(Some(value)) => println!("\"{}\"", value),
                Ok(None) => println!("(nil)"),
                Err(e) => println!("(error) {}", e),
            },
            (Some("del"), Some(key), None, None) => match timers.del(key).await {
                Ok(()) => println!("OK"),
                Err(e) => println!("(error) {}", e),
            },
            (Some("quit"), None, None, None) => break,
            (Some(""), None, None, None) => {}
            _ => println!("(error) unknown command, try --help"),
        }
    }

    Ok(())
}

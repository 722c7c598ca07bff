//! loopwire - UDP echo server and client built from push streams

use std::path::PathBuf;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, Level};
use tracing_subscriber::FmtSubscriber;

use loopwire::config::{ClientConfig, Config, ServerConfig};
use loopwire::error::{Error, Result};
use loopwire::{Context, Packet, Source, Stdin, Tick, UdpOptions};

fn main() -> Result<()> {
    let command = match Command::parse(std::env::args().skip(1)) {
        Ok(command) => command,
        Err(message) => {
            eprintln!("{} (see --help)", message);
            std::process::exit(2);
        }
    };

    let (path, level_override) = match command {
        Command::Help => {
            print_help();
            return Ok(());
        }
        Command::Version => {
            print_version();
            return Ok(());
        }
        Command::GenConfig(mode) => {
            let config = match mode {
                Mode::Server => Config::default_server(),
                Mode::Client => Config::default_client(),
            };
            let json = serde_json::to_string_pretty(&config)
                .map_err(|e| Error::Config(format!("Failed to render config: {}", e)))?;
            println!("{}", json);
            return Ok(());
        }
        Command::Run { config, log_level } => (config, log_level),
    };
    let config = Config::load(&path)?;

    // Initialize logging: --log-level, then RUST_LOG, then the config file
    let log_level = level_override
        .or_else(|| std::env::var("RUST_LOG").ok())
        .and_then(|s| s.parse().ok())
        .or_else(|| config.log.level.parse().ok())
        .unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }

    info!("loopwire v{} starting...", env!("CARGO_PKG_VERSION"));

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let outcome = rt.block_on(async {
        match (config.server, config.client) {
            (Some(server), _) => run_server(server).await,
            (None, Some(client)) => run_client(client).await,
            (None, None) => Err(Error::Config("nothing to run".into())),
        }
    });
    // A pending stdin read would otherwise hold the runtime open
    rt.shutdown_timeout(Duration::from_millis(100));
    outcome?;

    info!("Goodbye!");
    Ok(())
}

/// Echo every datagram back to its sender until idle for too long
async fn run_server(config: ServerConfig) -> Result<()> {
    let ctx = Context::new("loopwire")?;
    let listen = UdpOptions {
        duplex: true,
        ..config.listen.clone()
    };
    let server = ctx.udp_server("server", listen)?;
    let replies = server
        .outgoing
        .clone()
        .ok_or_else(|| Error::Unsupported("server without a reply sink".into()))?;

    match server.bound_port().await {
        Ok(port) => info!("Echo server listening on port {}", port),
        Err(e) => {
            error!("Failed to start server: {}", e);
            return Ok(());
        }
    }

    let echo = ctx.sink::<Packet>("echo");
    ctx.timeout("idle", &server.incoming, &echo, config.idle_timeout());
    let mut requests = echo.feed().subscribe();

    let heartbeat = match &config.heartbeat {
        Some(timer) => Some(log_heartbeat(ctx.timer_from_config("heartbeat", timer)?)),
        None => None,
    };

    loop {
        tokio::select! {
            request = requests.next() => match request {
                Some(Ok(packet)) => {
                    debug!("Echoing {} bytes to {}", packet.payload().len(), packet.peer());
                    replies.send(packet);
                }
                Some(Err(e)) if e.is_timeout() => {
                    info!("No traffic for {:?}, shutting down", config.idle_timeout());
                    break;
                }
                Some(Err(e)) => {
                    error!("Server stopped: {}", e);
                    break;
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    server.incoming.finish();
    if let Some(task) = heartbeat {
        task.abort();
    }
    Ok(())
}

/// Send standard input to the target and print whatever comes back
async fn run_client(config: ClientConfig) -> Result<()> {
    let ctx = Context::new("loopwire")?;
    let target = UdpOptions {
        duplex: true,
        ..config.target.clone()
    };
    let client = ctx.udp_client("client", target)?;
    let incoming = client
        .incoming
        .clone()
        .ok_or_else(|| Error::Unsupported("client without an incoming source".into()))?;

    let answers = ctx.sink::<Packet>("replies");
    ctx.timeout("idle", &incoming, &answers, config.idle_timeout());
    let mut replies = answers.feed().subscribe();

    let stdin = ctx.from("stdin", Stdin)?;
    let mut input = stdin.subscribe();
    let mut input_open = true;

    loop {
        tokio::select! {
            chunk = input.next(), if input_open => match chunk {
                Some(Ok(bytes)) => {
                    client.outgoing.send(bytes);
                }
                Some(Err(e)) => {
                    error!("Reading stdin failed: {}", e);
                    input_open = false;
                }
                None => input_open = false,
            },
            reply = replies.next() => match reply {
                Some(Ok(packet)) => println!("{}", String::from_utf8_lossy(packet.payload())),
                Some(Err(e)) if e.is_timeout() => {
                    info!("No reply for {:?}, exiting", config.idle_timeout());
                    break;
                }
                Some(Err(e)) => {
                    error!("Client stopped: {}", e);
                    break;
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    stdin.finish();
    client.outgoing.finish();
    Ok(())
}

/// The task holds the source; the timer stops when the task is aborted
fn log_heartbeat(ticks: Source<Tick>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut received = ticks.subscribe();
        let mut count = 0u64;
        while let Some(Ok(_)) = received.next().await {
            count += 1;
            info!("Heartbeat #{}", count);
        }
    })
}

/// Which example configuration `--gen-config` prints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Server,
    Client,
}

/// What the command line asks for
#[derive(Debug, PartialEq, Eq)]
enum Command {
    Run {
        config: PathBuf,
        log_level: Option<String>,
    },
    GenConfig(Mode),
    Version,
    Help,
}

impl Command {
    /// Parse arguments (without the program name). Help and version win
    /// over everything else; otherwise a config file is required.
    fn parse(args: impl IntoIterator<Item = String>) -> std::result::Result<Self, String> {
        let mut args = args.into_iter();
        let mut config = None;
        let mut log_level = None;
        let mut gen_config = None;

        while let Some(arg) = args.next() {
            let mut value = |flag: &str| {
                args.next()
                    .ok_or_else(|| format!("{} needs a value", flag))
            };
            match arg.as_str() {
                "-h" | "--help" => return Ok(Command::Help),
                "-v" | "--version" => return Ok(Command::Version),
                "-c" | "--config" => config = Some(PathBuf::from(value(arg.as_str())?)),
                "-l" | "--log-level" => log_level = Some(value(arg.as_str())?),
                "--gen-config" => {
                    gen_config = Some(match value(arg.as_str())?.as_str() {
                        "server" => Mode::Server,
                        "client" => Mode::Client,
                        other => {
                            return Err(format!(
                                "unknown config type '{}', use 'client' or 'server'",
                                other
                            ))
                        }
                    })
                }
                flag if flag.starts_with('-') => return Err(format!("unknown option {}", flag)),
                path if config.is_none() => config = Some(PathBuf::from(path)),
                extra => return Err(format!("unexpected argument {}", extra)),
            }
        }

        match (gen_config, config) {
            (Some(mode), _) => Ok(Command::GenConfig(mode)),
            (None, Some(config)) => Ok(Command::Run { config, log_level }),
            (None, None) => Err("no config file specified".into()),
        }
    }
}

fn print_help() {
    println!(r#"loopwire - UDP echo over push streams

USAGE:
    loopwire [OPTIONS] [FILE]

OPTIONS:
    -c, --config <FILE>     Path to configuration file (or pass it bare)
    -l, --log-level <LEVEL> Override the configured log level
    --gen-config <TYPE>     Generate example config (client/server)
    -v, --version           Print version information
    -h, --help              Print help information

EXAMPLES:
    loopwire --gen-config server > server.json
    loopwire -c server.json
    loopwire --gen-config client > client.json
    echo hello | loopwire -c client.json
"#);
}

fn print_version() {
    println!("loopwire v{}", env!("CARGO_PKG_VERSION"));
    println!("Event-loop resources as push streams");
}

use clap::{Parser, Subcommand, ValueEnum};
use futures_util::StreamExt;
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::Message;

#[derive(Parser)]
#[command(name = "relay-cli")]
#[command(about = "Management CLI for the log relay", long_about = None)]
struct Cli {
    /// REST API base URL
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// Websocket listener base URL
    #[arg(short, long, default_value = "ws://localhost:8443")]
    socket_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Target {
    Service,
    Request,
}

impl Target {
    fn as_str(self) -> &'static str {
        match self {
            Target::Service => "service",
            Target::Request => "request",
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Write one log entry to its service and request sinks
    Log {
        #[arg(long)]
        service: String,
        #[arg(long)]
        request: String,
        #[arg(long, default_value = "info")]
        level: String,
        message: String,
    },
    /// Open a sink
    Open { target: Target, name: String },
    /// Close a sink
    Close { target: Target, name: String },
    /// Manage per-service thresholds
    Levels {
        #[command(subcommand)]
        command: LevelCommands,
    },
    /// Stream lines appended to a sink until interrupted
    Tail { target: Target, name: String },
}

#[derive(Subcommand)]
enum LevelCommands {
    /// List every configured threshold
    List,
    /// Show one service's threshold
    Get { service: String },
    /// Set a service's threshold (use __REQUEST__ for all request sinks)
    Set { service: String, level: String },
    /// Remove a service's threshold
    Delete { service: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let api = cli.url.trim_end_matches('/');
    let levels = format!("{}/v1/config/levels/service", api);

    match cli.command {
        Commands::Log {
            service,
            request,
            level,
            message,
        } => {
            let res = client
                .post(format!("{}/v1/logs", api))
                .json(&json!({
                    "service": service,
                    "request": request,
                    "level": level,
                    "message": message,
                }))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Open { target, name } => {
            let res = client
                .post(format!("{}/v1/{}/{}/logger", api, target.as_str(), name))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Close { target, name } => {
            let res = client
                .delete(format!("{}/v1/{}/{}/logger", api, target.as_str(), name))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Levels { command } => {
            let res = match command {
                LevelCommands::List => client.get(&levels).send().await?,
                LevelCommands::Get { service } => {
                    client.get(format!("{}/{}", levels, service)).send().await?
                }
                LevelCommands::Set { service, level } => {
                    client
                        .put(format!("{}/{}", levels, service))
                        .json(&json!({ "level": level }))
                        .send()
                        .await?
                }
                LevelCommands::Delete { service } => {
                    client.delete(format!("{}/{}", levels, service)).send().await?
                }
            };
            print_response(res).await?;
        }
        Commands::Tail { target, name } => {
            let url = format!(
                "{}/{}/{}",
                cli.socket_url.trim_end_matches('/'),
                target.as_str(),
                name
            );
            tail(&url).await?;
        }
    }

    Ok(())
}

async fn tail(url: &str) -> Result<(), Box<dyn std::error::Error>> {
    let (mut stream, _) = tokio_tungstenite::connect_async(url).await?;
    eprintln!("Connected to {}", url);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            message = stream.next() => match message {
                Some(Ok(Message::Text(line))) => println!("{}", line.as_str()),
                Some(Ok(Message::Close(frame))) => {
                    if let Some(frame) = frame {
                        eprintln!("Closed ({}): {}", u16::from(frame.code), frame.reason.as_str());
                    }
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
                None => break,
            },
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if status == reqwest::StatusCode::NO_CONTENT {
        println!("OK");
        return Ok(());
    }

    let json: Value = res.json().await?;
    if !status.is_success() {
        eprintln!("Error: relay returned status {}", status);
        eprintln!("{}", serde_json::to_string_pretty(&json["errors"])?);
        return Ok(());
    }

    println!("{}", serde_json::to_string_pretty(&json["data"])?);
    Ok(())
}

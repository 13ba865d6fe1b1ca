use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "tunnel-cli")]
#[command(about = "Management CLI for the tunnel broker", long_about = None)]
struct Cli {
    /// Broker control-plane URL
    #[arg(short, long, env = "TUNNEL_BROKER_URL", default_value = "http://localhost:80")]
    url: String,

    /// Bearer secret for bootstrap requests
    #[arg(short, long, env = "TUNNEL_BROKER_AUTH")]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show tunnel count and broker memory usage
    Status,
    /// Show connected sockets of one tunnel
    Tunnel { id: String },
    /// Request a new tunnel, optionally with a chosen name
    New { name: Option<String> },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let mut headers = HeaderMap::new();
    if let Some(token) = &cli.token {
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", token))?);
    }

    let url = match &cli.command {
        Commands::Status => format!("{}/api/status", base),
        Commands::Tunnel { id } => format!("{}/api/tunnels/{}/status", base, id),
        Commands::New { name: Some(name) } => format!("{}/{}", base, name),
        Commands::New { name: None } => format!("{}/?new", base),
    };

    let res = client.get(url).headers(headers).send().await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;

    if !status.is_success() {
        eprintln!("Error: broker returned status {}", status);
        if !text.is_empty() {
            eprintln!("{}", text);
        }
        std::process::exit(1);
    }

    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", text),
    }
    Ok(())
}

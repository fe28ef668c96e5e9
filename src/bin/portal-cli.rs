use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "portal-cli")]
#[command(about = "Management CLI for the portal API", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[arg(short, long, env = "PORTAL_ADMIN_API_KEY")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Uptime, request count and live chat connections
    Status,
    /// Upstream groups with per-endpoint health
    Upstreams,
    /// Image cache usage and store backend
    Images,
    /// Upstream response cache sizes
    Cache,
    /// Drop every cached upstream response
    ClearCache,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let base = cli.url.trim_end_matches('/');
    let request = match cli.command {
        Commands::Status => client.get(format!("{}/admin/status", base)),
        Commands::Upstreams => client.get(format!("{}/admin/upstreams", base)),
        Commands::Images => client.get(format!("{}/admin/images", base)),
        Commands::Cache => client.get(format!("{}/admin/cache", base)),
        Commands::ClearCache => client.post(format!("{}/admin/cache/clear", base)),
    };

    let res = request.headers(headers).send().await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    // Unwrap the response envelope.
    let data = json.get("data").cloned().unwrap_or(json);
    println!("{}", serde_json::to_string_pretty(&data)?);
    Ok(())
}

use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "account-cli")]
#[command(about = "Command-line client for the account service", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// Bearer token for authenticated commands
    #[arg(short, long)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check service liveness
    Health,
    /// Create an account
    Register {
        username: String,
        password: String,
        email: String,
    },
    /// Log in and print the access token
    Login { username: String, password: String },
    /// Show the account behind --token
    Info,
    /// List accounts
    List {
        #[arg(long, default_value_t = 1)]
        page: u64,
        #[arg(long, default_value_t = 10)]
        page_size: u64,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    if let Some(token) = &cli.token {
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token))?,
        );
    }

    let res = match cli.command {
        Commands::Health => client.get(format!("{}/health", cli.url)).send().await?,
        Commands::Register {
            username,
            password,
            email,
        } => {
            client
                .post(format!("{}/api/v1/user/register", cli.url))
                .json(&json!({ "username": username, "password": password, "email": email }))
                .send()
                .await?
        }
        Commands::Login { username, password } => {
            client
                .post(format!("{}/api/v1/user/login", cli.url))
                .json(&json!({ "username": username, "password": password }))
                .send()
                .await?
        }
        Commands::Info => {
            client
                .get(format!("{}/api/v1/user/info", cli.url))
                .headers(headers)
                .send()
                .await?
        }
        Commands::List { page, page_size } => {
            client
                .post(format!("{}/api/v1/user/list", cli.url))
                .json(&json!({ "page": page, "pageSize": page_size }))
                .send()
                .await?
        }
    };

    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: service returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    if json["code"] != 0 {
        eprintln!("Error {}: {}", json["code"], json["message"]);
    }
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

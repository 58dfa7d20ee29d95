use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "facegate", about = "Face identity gateway CLI")]
struct Cli {
    /// Gateway base URL. Falls back to FACEGATE_SERVER, then localhost.
    #[arg(long, global = true)]
    server: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a face image under a name and phone number
    Register {
        /// Path to the image file
        image: PathBuf,
        /// Person name (at least 2 characters)
        #[arg(long)]
        name: String,
        /// Age in years
        #[arg(long)]
        age: i64,
        /// Phone number (exactly 10 digits)
        #[arg(long)]
        phone_number: String,
    },
    /// Recognize the face in an image
    Recognize {
        /// Path to the image file
        image: PathBuf,
    },
    /// Delete every face registered under a name and phone number
    Delete {
        #[arg(long)]
        name: String,
        #[arg(long)]
        phone_number: String,
    },
    /// Show gateway memory, collection and request statistics
    Stats,
    /// Check gateway liveness
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let server = resolve_server(cli.server);
    let client = reqwest::Client::new();

    let response = match cli.command {
        Commands::Register {
            image,
            name,
            age,
            phone_number,
        } => {
            let form = image_form(&image)
                .await?
                .text("name", name)
                .text("age", age.to_string())
                .text("phone_number", phone_number);
            client
                .post(format!("{server}/api/v1/register"))
                .multipart(form)
                .send()
                .await?
        }
        Commands::Recognize { image } => {
            let form = image_form(&image).await?;
            client
                .post(format!("{server}/api/v1/recognize"))
                .multipart(form)
                .send()
                .await?
        }
        Commands::Delete { name, phone_number } => {
            client
                .delete(format!("{server}/api/v1/face"))
                .query(&[("name", name), ("phone_number", phone_number)])
                .send()
                .await?
        }
        Commands::Stats => {
            client
                .get(format!("{server}/api/v1/admin/stats"))
                .send()
                .await?
        }
        Commands::Health => client.get(format!("{server}/health")).send().await?,
    };

    print_response(response).await
}

fn resolve_server(flag: Option<String>) -> String {
    flag.or_else(|| std::env::var("FACEGATE_SERVER").ok())
        .unwrap_or_else(|| "http://127.0.0.1:8000".to_string())
}

/// Multipart form with the image under the `file` field, mime type guessed
/// from the file extension.
async fn image_form(path: &Path) -> Result<reqwest::multipart::Form> {
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());

    let part = reqwest::multipart::Part::bytes(data)
        .file_name(filename)
        .mime_str(mime.essence_str())?;
    Ok(reqwest::multipart::Form::new().part("file", part))
}

async fn print_response(response: reqwest::Response) -> Result<()> {
    let status = response.status();
    let text = response.text().await?;
    let pretty = serde_json::from_str::<serde_json::Value>(&text)
        .and_then(|v| serde_json::to_string_pretty(&v))
        .unwrap_or(text);

    if status.is_success() {
        println!("{pretty}");
        Ok(())
    } else {
        eprintln!("{pretty}");
        bail!("request failed with status {status}");
    }
}

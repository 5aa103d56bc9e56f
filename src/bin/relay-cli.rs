use std::io::Write;

use clap::Parser;
use serde_json::json;

#[derive(Parser)]
#[command(name = "relay-cli")]
#[command(about = "Send a prompt to a chat-relay and print the stream", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// Model to request; the relay default is used when omitted.
    #[arg(short, long)]
    model: Option<String>,

    /// Prompt text.
    input: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut body = json!({ "input": cli.input });
    if let Some(model) = cli.model {
        body["model"] = json!(model);
    }

    let mut res = client
        .post(format!("{}/chat", cli.url.trim_end_matches('/')))
        .json(&body)
        .send()
        .await?;

    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: relay returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text.trim_end());
        }
        std::process::exit(1);
    }

    let mut stdout = std::io::stdout().lock();
    while let Some(chunk) = res.chunk().await? {
        stdout.write_all(&chunk)?;
        stdout.flush()?;
    }
    writeln!(stdout)?;
    Ok(())
}

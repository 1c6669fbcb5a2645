use clap::{Parser, Subcommand};
use futures_util::{SinkExt, StreamExt};
use reqwest::header::ORIGIN;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

#[derive(Parser)]
#[command(name = "relay-cli")]
#[command(about = "Client CLI for the collaborative room relay", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8787")]
    url: String,

    /// Origin header to send, e.g. http://localhost:3000
    #[arg(short, long)]
    origin: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a room and print its id
    Create,
    /// Join a room: stdin lines are sent, received messages are printed
    Join { id: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Create => create(&cli.url, cli.origin.as_deref()).await,
        Commands::Join { ref id } => join(&cli.url, id, cli.origin.as_deref()).await,
    }
}

async fn create(base: &str, origin: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let client = reqwest::Client::new();
    let mut request = client.post(format!("{}/room", base.trim_end_matches('/')));
    if let Some(origin) = origin {
        request = request.header(ORIGIN, origin);
    }

    let res = request.send().await?;
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: relay returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    match json.get("id").and_then(Value::as_str) {
        Some(id) => println!("{}", id),
        None => println!("{}", serde_json::to_string_pretty(&json)?),
    }
    Ok(())
}

/// Websocket URL of room `id` under `base`, keeping any path prefix.
fn room_url(base: &str, id: &str) -> Result<Url, Box<dyn std::error::Error>> {
    let mut base = Url::parse(base)?;
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }

    let mut url = base.join(&format!("room/{}", id))?;
    let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
    url.set_scheme(scheme)
        .map_err(|_| format!("cannot use {} as a websocket url", base))?;
    Ok(url)
}

async fn join(base: &str, id: &str, origin: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let url = room_url(base, id)?;

    let mut request = url.as_str().into_client_request()?;
    if let Some(origin) = origin {
        request.headers_mut().insert("origin", HeaderValue::from_str(origin)?);
    }

    let (ws, _) = connect_async(request).await?;
    let (mut sink, mut stream) = ws.split();
    eprintln!("Joined room {}", id);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => sink.send(Message::text(line)).await?,
                None => {
                    let _ = sink.close().await;
                    break;
                }
            },
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => println!("{}", text.as_str()),
                Some(Ok(Message::Binary(bytes))) => println!("<{} binary bytes>", bytes.len()),
                Some(Ok(Message::Close(_))) | None => {
                    eprintln!("Connection closed");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
            },
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_url_keeps_prefix() {
        let url = room_url("http://relay.local/prefix", "abc").unwrap();
        assert_eq!(url.as_str(), "ws://relay.local/prefix/room/abc");

        let url = room_url("https://relay.local/prefix/", "abc").unwrap();
        assert_eq!(url.as_str(), "wss://relay.local/prefix/room/abc");
    }

    #[test]
    fn test_room_url_bare_host() {
        let url = room_url("http://localhost:8787", "abc").unwrap();
        assert_eq!(url.as_str(), "ws://localhost:8787/room/abc");
    }
}

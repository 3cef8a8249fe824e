use anyhow::Context;
use bytes::Bytes;
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use frontdesk_client::{telemetry, ClientIdentity, ClientServices, ReconnectionCoordinator};
use frontdesk_config::load as load_config;
use frontdesk_files::FileMetadata;
use frontdesk_messages::SenderKind;
use frontdesk_transport::{InboundEvent, InboundEventKind};

#[derive(Parser)]
#[command(name = "frontdesk")]
#[command(about = "Frontdesk realtime engine console")]
struct Cli {
    /// Workspace to join
    #[arg(long)]
    workspace: String,
    /// Participant identifier
    #[arg(long)]
    participant: String,
    /// Display name shown to the other side
    #[arg(long, default_value = "Console User")]
    name: String,
    /// Access token issued by the authentication service
    #[arg(long)]
    token: String,
    /// Act as an agent instead of a visitor
    #[arg(long)]
    agent: bool,
    /// Override the configured WebSocket endpoint
    #[arg(long)]
    ws_url: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    telemetry::init_tracing().context("failed to initialise tracing")?;

    let mut config = load_config().context("failed to load configuration")?;
    if let Some(ws_url) = cli.ws_url {
        config.server.ws_url = ws_url;
    }

    let identity = ClientIdentity {
        workspace_id: cli.workspace,
        participant_id: cli.participant,
        display_name: cli.name,
        kind: if cli.agent {
            SenderKind::Agent
        } else {
            SenderKind::Visitor
        },
    };

    info!(ws_url = %config.server.ws_url, "starting Frontdesk console");

    let services = Arc::new(
        ClientServices::initialise(&config, identity)
            .context("failed to initialise engine services")?,
    );

    register_event_tail(&services);

    if !services.connect(&cli.token).await {
        anyhow::bail!("unable to establish the realtime channel; check token and endpoint");
    }

    let (_reconnect_states, _coordinator) = ReconnectionCoordinator::new(
        Arc::clone(&services.manager),
        Arc::clone(&services.store),
        config.reconnect.clone(),
    )
    .spawn();

    run_console(&services, &cli.token).await?;

    services.shutdown().await;
    Ok(())
}

/// Print inbound traffic as it arrives, alongside the store glue.
fn register_event_tail(services: &ClientServices) {
    services
        .manager
        .add_event_listener(InboundEventKind::NewMessage, |event| {
            if let InboundEvent::NewMessage {
                room_id,
                sender_id,
                message,
                ..
            } = event
            {
                println!("[{room_id}] {sender_id}: {message}");
            }
            Ok(())
        });

    for kind in [InboundEventKind::AgentTyping, InboundEventKind::ClientTyping] {
        services.manager.add_event_listener(kind, |event| {
            if let InboundEvent::AgentTyping {
                room_id,
                participant_id,
                is_typing,
            }
            | InboundEvent::ClientTyping {
                room_id,
                participant_id,
                is_typing,
            } = event
            {
                if *is_typing {
                    println!("[{room_id}] {participant_id} is typing…");
                }
            }
            Ok(())
        });
    }

    services
        .manager
        .add_event_listener(InboundEventKind::AgentConnected, |event| {
            if let InboundEvent::AgentConnected {
                room_id, agent_id, ..
            } = event
            {
                println!("[{room_id}] agent {agent_id} connected");
            }
            Ok(())
        });
}

async fn run_console(services: &ClientServices, token: &str) -> anyhow::Result<()> {
    println!("Frontdesk Interactive Console");
    println!("Type '/help' for commands, '/quit' to exit");
    println!("---");

    let stdin = tokio::io::stdin();
    let mut reader = BufReader::new(stdin);
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            break; // EOF
        }

        let command = line.trim();
        if command.is_empty() {
            continue;
        }

        let mut parts = command.splitn(3, ' ');
        match parts.next().unwrap_or_default() {
            "/quit" | "/exit" | "/q" => {
                println!("Goodbye!");
                break;
            }
            "/help" | "/h" => {
                println!("Available commands:");
                println!("  /help, /h                   - Show this help");
                println!("  /send <room> <text>         - Send a message");
                println!("  /typing <room>              - Signal typing in a room");
                println!("  /read <room>                - Mark a room read and acknowledge");
                println!("  /upload <room> <path>       - Upload a file into a room");
                println!("  /rooms                      - List joined rooms");
                println!("  /unread <room>              - Show unread count");
                println!("  /log <room>                 - Print the room transcript");
                println!("  /connect                    - Re-open the channel");
                println!("  /status                     - Show connection state");
                println!("  /quit, /exit, /q            - Exit console");
            }
            "/send" => {
                let (Some(room), Some(text)) = (parts.next(), parts.next()) else {
                    println!("Usage: /send <room> <text>");
                    continue;
                };
                let outcome = services.send_message(room, text);
                if outcome.emitted {
                    println!("sent {}", outcome.message_id);
                } else {
                    println!("offline: {} kept locally, retry after reconnect", outcome.message_id);
                }
            }
            "/typing" => {
                let Some(room) = parts.next() else {
                    println!("Usage: /typing <room>");
                    continue;
                };
                services.set_typing(room, true);
                println!("typing signalled for {room} (auto-stops when idle)");
            }
            "/read" => {
                let Some(room) = parts.next() else {
                    println!("Usage: /read <room>");
                    continue;
                };
                let marked = services.mark_room_read(room);
                println!("marked {} messages read in {room}", marked.len());
            }
            "/upload" => {
                let (Some(room), Some(path)) = (parts.next(), parts.next()) else {
                    println!("Usage: /upload <room> <path>");
                    continue;
                };
                match upload(services, room, path).await {
                    Ok(message_id) => println!("uploaded as message {message_id}"),
                    Err(error) => println!("upload failed: {error}"),
                }
            }
            "/rooms" => {
                let rooms = services.manager.joined_rooms();
                if rooms.is_empty() {
                    println!("No joined rooms (yet)");
                } else {
                    for room in rooms {
                        println!("  {room}");
                    }
                }
            }
            "/unread" => {
                let Some(room) = parts.next() else {
                    println!("Usage: /unread <room>");
                    continue;
                };
                println!("{} unread in {room}", services.store.lock().unread_count(room));
            }
            "/log" => {
                let Some(room) = parts.next() else {
                    println!("Usage: /log <room>");
                    continue;
                };
                let store = services.store.lock();
                for message in store.messages(room) {
                    println!(
                        "  [{:?}] {}: {}",
                        message.status, message.sender.id, message.content
                    );
                }
            }
            "/connect" => {
                if services.connect(token).await {
                    println!("channel connected");
                } else {
                    println!("connect failed");
                }
            }
            "/status" => {
                let snapshot = services.manager.snapshot();
                println!("transport: {:?}", snapshot.transport_status);
                println!("rooms: {:?}", snapshot.joined_rooms);
                println!("server time offset: {}ms", snapshot.server_time_offset_ms);
                println!("uploads in flight: {}", services.pipeline.in_flight());
            }
            other => {
                println!("Unknown command: {other}");
                println!("Type '/help' for available commands");
            }
        }
    }

    Ok(())
}

async fn upload(services: &ClientServices, room: &str, path: &str) -> anyhow::Result<String> {
    let content = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {path}"))?;
    let file_name = Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string());
    let mime_type = mime_guess::from_path(path)
        .first_or_octet_stream()
        .to_string();

    let metadata = FileMetadata {
        file_name,
        mime_type,
        size: content.len() as u64,
    };

    let message_id = services
        .send_file(room, metadata, Bytes::from(content))
        .await
        .context("file transfer failed")?;
    Ok(message_id)
}

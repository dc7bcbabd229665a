//! # Room Session Demo
//!
//! Walks one player through a Truth or Dare room:
//!
//! 1. Connect to the hub over WebSocket
//! 2. Create a room, or join one when `TRUTH_OR_DARE_ROOM` is set
//! 3. Print roster, turn and journal changes as the server pushes them
//! 4. Leave the room and shut down on Ctrl+C
//!
//! ## Running
//!
//! ```sh
//! TRUTH_OR_DARE_SERVER_URL=http://localhost:5000 cargo run --example room_session
//!
//! # Join an existing room as a second player:
//! TRUTH_OR_DARE_SERVER_URL=http://localhost:5000 TRUTH_OR_DARE_ROOM=abc123 \
//!     TRUTH_OR_DARE_PLAYER=Ben cargo run --example room_session
//! ```

use truth_or_dare_client::{ClientConfig, CreateRoomParams, JoinRoomParams, RoomHub, RoomStatus};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Configuration ───────────────────────────────────────────────
    let config = ClientConfig::from_env()?;
    let player_name = std::env::var("TRUTH_OR_DARE_PLAYER").unwrap_or_else(|_| "Ana".into());
    let player_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(endpoint = %config.endpoint(), player = %player_name, "connecting");

    let hub = RoomHub::new(config);
    hub.connect().await?;

    // ── Enter a room ────────────────────────────────────────────────
    let room_id = match std::env::var("TRUTH_OR_DARE_ROOM") {
        Ok(room_id) => {
            let ack = hub
                .join_room(JoinRoomParams::new(&room_id, &player_id, &player_name))
                .await?;
            tracing::info!(room = %room_id, message = ack.message().unwrap_or(""), "joined");
            room_id
        }
        Err(_) => {
            let created = hub
                .create_room(CreateRoomParams::new("Demo room", &player_id, &player_name))
                .await?;
            tracing::info!(room = %created.room_id, "created; share this id with the other player");
            created.room_id
        }
    };

    // ── Watch the room ──────────────────────────────────────────────
    let mut snapshots = hub.room().subscribe();
    let mut connection = hub.subscribe_connection();
    let mut printed = 0;
    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snap = snapshots.borrow_and_update().clone();
                let names: Vec<_> = snap.players.iter().map(|p| &p.player_name).collect();
                let turn = snap.current_player_name.as_deref();
                tracing::info!(status = ?snap.status, players = ?names, ?turn, "room");
                let playing = snap.status == RoomStatus::Playing;
                if playing && snap.is_turn_of(&player_id) && snap.question.is_none() {
                    println!("Your turn! Drawing a truth...");
                    if let Err(e) = hub
                        .get_random_question(&room_id, &player_id, Default::default())
                        .await
                    {
                        tracing::warn!(error = %e, "could not draw a question");
                    }
                }
            }
            changed = connection.changed() => {
                if changed.is_err() {
                    break;
                }
                tracing::info!(state = ?*connection.borrow_and_update(), "connection");
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received, leaving");
                break;
            }
        }

        let journal = hub.room().journal();
        for entry in journal.iter().skip(printed) {
            let at = entry.at.format("%H:%M:%S");
            println!("[{at}] {}: {}", entry.sender, entry.text);
        }
        printed = journal.len();
    }

    // ── Shutdown ────────────────────────────────────────────────────
    if let Err(e) = hub.leave_room(&room_id, &player_id).await {
        tracing::warn!(error = %e, "leave failed");
    }
    hub.shutdown().await;
    Ok(())
}

//! Two simulated participants in one process: exchange a few messages, show
//! typing, then run a short call.
//!
//! ```sh
//! RUST_LOG=debug cargo run -p workflo-client --example local_session
//! ```

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use workflo_client::{ChatClient, ChatContext};
use workflo_media::{LoopbackFactory, MediaConstraints, VirtualDevices};
use workflo_net::PushHub;
use workflo_shared::constants::APP_NAME;
use workflo_shared::types::{TypingScope, UserId};
use workflo_store::{MemoryBlobStore, MemoryLogStore};

fn connect(
    name: &str,
    hub: &PushHub,
    log: &MemoryLogStore,
    blobs: &MemoryBlobStore,
) -> ChatClient {
    let ctx = ChatContext::new(
        UserId::from(name),
        Arc::new(log.clone()),
        Arc::new(blobs.clone()),
        Arc::new(VirtualDevices::new()),
        Arc::new(LoopbackFactory::new()),
    );
    let (client, _events) = ChatClient::connect(ctx, hub);
    client
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("{APP_NAME} local session starting");

    let hub = PushHub::new();
    let log = MemoryLogStore::new();
    let blobs = MemoryBlobStore::new();

    let mut alice = connect("alice", &hub, &log, &blobs);
    let mut bob = connect("bob", &hub, &log, &blobs);
    let alice_id = alice.local_user().clone();
    let bob_id = bob.local_user().clone();

    let key = alice.open_conversation(&bob_id);
    bob.open_conversation(&alice_id);
    alice.pump().await;
    bob.pump().await;

    alice.set_typing(TypingScope::Conversation(key.clone()), "sal");
    bob.pump().await;
    info!(typing = ?bob.typing_users(&TypingScope::Conversation(key.clone())), "Bob sees");

    alice.set_typing(TypingScope::Conversation(key.clone()), "");
    alice.send_message(&bob_id, "salut bob").await?;
    bob.pump().await;
    bob.send_message(&alice_id, "salut alice").await?;
    alice.pump().await;
    bob.pump().await;

    for message in alice.messages(&key) {
        info!(from = %message.record.sender_id, body = %message.record.body, "Merged view");
    }

    alice.start_call(&bob_id, MediaConstraints::audio_only()).await?;
    bob.pump().await;
    bob.accept_call(MediaConstraints::audio_only()).await?;
    alice.pump().await;
    info!(state = ?alice.call_state(), "Call established");

    alice.hang_up().await;
    bob.pump().await;

    alice.disconnect().await;
    bob.disconnect().await;
    Ok(())
}

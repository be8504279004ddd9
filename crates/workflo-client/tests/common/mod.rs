//! Shared harness: one in-process hub plus shared stores, handing out fully
//! wired clients with their own virtual devices.

use std::sync::Arc;

use tokio::sync::mpsc;

use workflo_client::{ChatClient, ChatContext, ClientEvent};
use workflo_media::{CallState, LoopbackFactory, VirtualDevices};
use workflo_net::PushHub;
use workflo_shared::types::UserId;
use workflo_store::{MemoryBlobStore, MemoryLogStore};

pub struct Harness {
    pub hub: PushHub,
    pub log: MemoryLogStore,
    pub blobs: MemoryBlobStore,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            hub: PushHub::new(),
            log: MemoryLogStore::new(),
            blobs: MemoryBlobStore::new(),
        }
    }

    pub fn client(&self, name: &str) -> TestClient {
        let devices = Arc::new(VirtualDevices::new());
        let ctx = ChatContext::new(
            UserId::from(name),
            Arc::new(self.log.clone()),
            Arc::new(self.blobs.clone()),
            devices.clone(),
            Arc::new(LoopbackFactory::new()),
        );
        let (client, events) = ChatClient::connect(ctx, &self.hub);
        TestClient {
            client,
            events,
            devices,
        }
    }
}

pub struct TestClient {
    pub client: ChatClient,
    pub events: mpsc::Receiver<ClientEvent>,
    pub devices: Arc<VirtualDevices>,
}

impl TestClient {
    /// Everything queued for the UI so far.
    pub fn drain_events(&mut self) -> Vec<ClientEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    /// Call states in emission order, discarding unrelated events.
    pub fn call_states(&mut self) -> Vec<CallState> {
        self.drain_events()
            .into_iter()
            .filter_map(|event| match event {
                ClientEvent::CallStateChanged { state, .. } => Some(state),
                _ => None,
            })
            .collect()
    }
}

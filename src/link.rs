// 📡 Local link - Small JSON messages between co-located devices
//
// The radio itself (BLE, local Wi-Fi, ...) belongs to the platform and is
// reached through the `Transport` trait. `LinkService` is an ordinary owned
// value: whoever needs the link is handed one, there is no global connection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    pub id: String,
    pub name: String,
}

pub type RawHandler = Box<dyn Fn(String) + Send + Sync>;

/// Platform-provided connection API
pub trait Transport: Send {
    fn scan(&mut self) -> anyhow::Result<Vec<Peer>>;
    fn connect(&mut self, peer_id: &str) -> anyhow::Result<Peer>;
    fn disconnect(&mut self) -> anyhow::Result<()>;
    fn send(&mut self, payload: &str) -> anyhow::Result<()>;
    fn on_message(&mut self, handler: RawHandler);
}

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("not connected to a peer")]
    NotConnected,

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connected { peer: Peer },
}

/// Wire envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkMessage {
    pub kind: String,
    pub from: String,
    pub payload: serde_json::Value,
    pub sent_at: DateTime<Utc>,
}

impl LinkMessage {
    pub fn new(kind: &str, from: &str, payload: serde_json::Value) -> Self {
        LinkMessage {
            kind: kind.to_string(),
            from: from.to_string(),
            payload,
            sent_at: Utc::now(),
        }
    }
}

type Subscribers = Arc<Mutex<Vec<Box<dyn Fn(&LinkMessage) + Send + Sync>>>>;

pub struct LinkService<T: Transport> {
    transport: T,
    device_name: String,
    state: LinkState,
    subscribers: Subscribers,
}

impl<T: Transport> LinkService<T> {
    pub fn new(mut transport: T, device_name: &str) -> Self {
        let subscribers: Subscribers = Arc::new(Mutex::new(Vec::new()));

        let dispatch = Arc::clone(&subscribers);
        transport.on_message(Box::new(move |raw: String| {
            let message: LinkMessage = match serde_json::from_str(&raw) {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!(error = %e, "dropping malformed link message");
                    return;
                }
            };
            tracing::debug!(kind = %message.kind, from = %message.from, "link message received");
            if let Ok(handlers) = dispatch.lock() {
                for handler in handlers.iter() {
                    handler(&message);
                }
            }
        }));

        LinkService {
            transport,
            device_name: device_name.to_string(),
            state: LinkState::Disconnected,
            subscribers,
        }
    }

    pub fn state(&self) -> &LinkState {
        &self.state
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, LinkState::Connected { .. })
    }

    pub fn scan(&mut self) -> Result<Vec<Peer>, LinkError> {
        Ok(self.transport.scan()?)
    }

    pub fn connect(&mut self, peer_id: &str) -> Result<&Peer, LinkError> {
        let peer = self.transport.connect(peer_id)?;
        tracing::info!(peer = %peer.name, "link connected");
        self.state = LinkState::Connected { peer };

        match &self.state {
            LinkState::Connected { peer } => Ok(peer),
            LinkState::Disconnected => Err(LinkError::NotConnected),
        }
    }

    pub fn disconnect(&mut self) -> Result<(), LinkError> {
        if self.is_connected() {
            self.transport.disconnect()?;
            tracing::info!("link disconnected");
        }
        self.state = LinkState::Disconnected;
        Ok(())
    }

    pub fn send(&mut self, kind: &str, payload: serde_json::Value) -> Result<LinkMessage, LinkError> {
        if !self.is_connected() {
            return Err(LinkError::NotConnected);
        }

        let message = LinkMessage::new(kind, &self.device_name, payload);
        let raw = serde_json::to_string(&message)?;
        self.transport.send(&raw)?;
        Ok(message)
    }

    /// Register a handler for decoded incoming messages
    pub fn subscribe<F>(&self, handler: F)
    where
        F: Fn(&LinkMessage) + Send + Sync + 'static,
    {
        if let Ok(mut handlers) = self.subscribers.lock() {
            handlers.push(Box::new(handler));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use serde_json::json;

    #[derive(Default)]
    struct FakeRadio {
        peers: Vec<Peer>,
        sent: Arc<Mutex<Vec<String>>>,
        handler: Arc<Mutex<Option<RawHandler>>>,
    }

    impl Transport for FakeRadio {
        fn scan(&mut self) -> anyhow::Result<Vec<Peer>> {
            Ok(self.peers.clone())
        }

        fn connect(&mut self, peer_id: &str) -> anyhow::Result<Peer> {
            self.peers
                .iter()
                .find(|p| p.id == peer_id)
                .cloned()
                .ok_or_else(|| anyhow!("no such peer: {}", peer_id))
        }

        fn disconnect(&mut self) -> anyhow::Result<()> {
            Ok(())
        }

        fn send(&mut self, payload: &str) -> anyhow::Result<()> {
            self.sent.lock().unwrap().push(payload.to_string());
            Ok(())
        }

        fn on_message(&mut self, handler: RawHandler) {
            *self.handler.lock().unwrap() = Some(handler);
        }
    }

    fn radio() -> (FakeRadio, Arc<Mutex<Vec<String>>>, Arc<Mutex<Option<RawHandler>>>) {
        let radio = FakeRadio {
            peers: vec![Peer { id: "tab-1".into(), name: "DM Tablet".into() }],
            ..FakeRadio::default()
        };
        let sent = Arc::clone(&radio.sent);
        let handler = Arc::clone(&radio.handler);
        (radio, sent, handler)
    }

    #[test]
    fn test_send_requires_connection() {
        let (radio, sent, _) = radio();
        let mut link = LinkService::new(radio, "phone");

        assert!(matches!(link.send("roll", json!({})), Err(LinkError::NotConnected)));
        assert!(sent.lock().unwrap().is_empty());
    }

    #[test]
    fn test_connect_send_disconnect() {
        let (radio, sent, _) = radio();
        let mut link = LinkService::new(radio, "phone");

        assert_eq!(link.scan().unwrap().len(), 1);
        assert_eq!(link.connect("tab-1").unwrap().name, "DM Tablet");
        assert!(link.is_connected());

        link.send("roll", json!({"notation": "1d20", "total": 17})).unwrap();
        let raw = sent.lock().unwrap()[0].clone();
        let decoded: LinkMessage = serde_json::from_str(&raw).unwrap();
        assert_eq!(decoded.kind, "roll");
        assert_eq!(decoded.from, "phone");
        assert_eq!(decoded.payload["total"], 17);

        link.disconnect().unwrap();
        assert_eq!(link.state(), &LinkState::Disconnected);
    }

    #[test]
    fn test_connect_unknown_peer_stays_disconnected() {
        let (radio, _, _) = radio();
        let mut link = LinkService::new(radio, "phone");

        assert!(matches!(link.connect("nope"), Err(LinkError::Transport(_))));
        assert!(!link.is_connected());
    }

    #[test]
    fn test_incoming_messages_reach_subscribers() {
        let (radio, _, handler) = radio();
        let link = LinkService::new(radio, "phone");

        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        link.subscribe(move |m| sink.lock().unwrap().push(m.kind.clone()));

        let incoming = serde_json::to_string(&LinkMessage::new("initiative", "tablet", json!({}))).unwrap();
        let guard = handler.lock().unwrap();
        let deliver = guard.as_ref().unwrap();
        deliver(incoming);
        deliver("not json".to_string());

        assert_eq!(*received.lock().unwrap(), vec!["initiative".to_string()]);
    }
}

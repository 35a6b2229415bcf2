//! Discovery-and-streaming orchestration
//!
//! The bridge discovers devices for a bounded window, opens one control
//! session per device and runs one independent task per data service:
//!
//! ```text
//! Orchestrator ──► Bridge::attach(device) ──► StateMap handler ──┐
//!                                         └─► BeatInfo handler ──┴─► OscSink
//! ```
//!
//! Collaborators (the StagelinQ client and the OSC client) sit behind the
//! traits below so every piece can be driven by fakes in tests.

use async_trait::async_trait;
use rosc::OscMessage;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::stagelinq::{self, BeatFrame, Device, DeviceState, EngineDeck, Service, State, Token};

pub mod beat_info;
pub mod debounce;
pub mod discovery;
pub mod network;
pub mod session;
pub mod state_map;


pub use debounce::BeatDebouncer;
pub use discovery::Orchestrator;
pub use network::NetworkConnector;
pub use session::Bridge;

/// Source of device announcements
#[async_trait]
pub trait Discoverer: Send {
    /// Token proving our identity to devices
    fn token(&self) -> Token;

    /// Keep announcing ourselves every `interval` in the background
    fn announce_every(&mut self, interval: Duration);

    /// Wait up to `timeout` for the next announcement
    async fn discover(&mut self, timeout: Duration) -> stagelinq::Result<(Device, DeviceState)>;
}

/// Open control session with one device
#[async_trait]
pub trait ControlConnection: Send {
    async fn request_services(&mut self) -> stagelinq::Result<Vec<Service>>;
}

/// Subscription side of a StateMap session
#[async_trait]
pub trait StateMapControl: Send {
    async fn subscribe(&mut self, name: &str) -> stagelinq::Result<()>;
}

/// Request side of a BeatInfo session
#[async_trait]
pub trait BeatInfoControl: Send {
    async fn start_stream(&mut self) -> stagelinq::Result<()>;
}

/// Established StateMap session
pub struct StateMapSession {
    pub control: Box<dyn StateMapControl>,
    pub states: mpsc::Receiver<State>,
    pub errors: mpsc::Receiver<stagelinq::Error>,
}

/// Established BeatInfo session
pub struct BeatInfoSession {
    pub control: Box<dyn BeatInfoControl>,
    pub frames: mpsc::Receiver<BeatFrame>,
    pub errors: mpsc::Receiver<stagelinq::Error>,
}

/// Opens connections to discovered devices
///
/// `open_*` dial the service port and negotiate the session in one step.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        device: &Device,
        token: Token,
    ) -> stagelinq::Result<Box<dyn ControlConnection>>;

    async fn open_state_map(
        &self,
        device: &Device,
        port: u16,
        token: Token,
    ) -> stagelinq::Result<StateMapSession>;

    async fn open_beat_info(
        &self,
        device: &Device,
        port: u16,
        token: Token,
    ) -> stagelinq::Result<BeatInfoSession>;
}

/// Destination for outbound OSC messages
#[async_trait]
pub trait OscSink: Send + Sync {
    async fn send(&self, message: OscMessage) -> anyhow::Result<()>;
}

/// Deck layout of the deployment: slot count and monitored state paths
#[derive(Debug, Clone, PartialEq)]
pub struct DeckLayout {
    pub deck_count: usize,
    pub state_paths: Vec<String>,
}

impl DeckLayout {
    /// Artist and song name for every deck
    pub fn new(deck_count: usize) -> Self {
        let state_paths = (1..=deck_count)
            .map(EngineDeck::new)
            .flat_map(|deck| [deck.track_artist_name(), deck.track_song_name()])
            .collect();
        Self {
            deck_count,
            state_paths,
        }
    }

    pub fn with_state_paths(deck_count: usize, state_paths: Vec<String>) -> Self {
        Self {
            deck_count,
            state_paths,
        }
    }
}

impl Default for DeckLayout {
    fn default() -> Self {
        Self::new(4)
    }
}

/// Read-only values every handler captures at spawn time
#[derive(Clone)]
pub struct HandlerContext {
    pub connector: Arc<dyn Connector>,
    pub sink: Arc<dyn OscSink>,
    pub token: Token,
    pub layout: Arc<DeckLayout>,
}

/// Why a stream handler stopped
#[derive(Debug)]
pub enum HandlerExit {
    /// Dial or session negotiation failed
    SessionFailed(stagelinq::Error),
    /// The session reported an error
    StreamFailed(stagelinq::Error),
    /// The session closed without reporting an error
    StreamClosed,
}

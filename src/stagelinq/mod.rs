//! StagelinQ protocol client
//!
//! Speaks just enough of the StagelinQ protocol to bridge decks to OSC:
//! UDP discovery announcements, the main (control) TCP connection used to list
//! offered services, and the StateMap / BeatInfo data sessions.
//!
//! Every connection type owns its socket and its background reader task;
//! dropping the value aborts the reader and closes the socket.

pub mod beat_info;
mod codec;
pub mod device;
pub mod error;
pub mod listener;
pub mod state_map;
mod types;

pub use beat_info::{BeatInfoConnection, BeatInfoStreams};
pub use device::DeviceConnection;
pub use error::{Error, Result};
pub use listener::{Listener, ListenerConfig, DISCOVERY_PORT};
pub use state_map::{StateMapConnection, StateMapStreams};
pub use types::{
    BeatFrame, Device, DeviceId, DeviceState, EngineDeck, PlayerInfo, Service, ServiceKind, State,
    Token, TOKEN_LEN,
};

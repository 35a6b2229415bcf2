//! Core StagelinQ data types

use serde_json::{Map, Value};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::{IpAddr, SocketAddr};

/// Length of a StagelinQ identity token in bytes
pub const TOKEN_LEN: usize = 16;

/// Identity token exchanged during discovery and session negotiation
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Token([u8; TOKEN_LEN]);

impl Token {
    /// Generate a fresh random token
    ///
    /// Devices reject tokens whose first byte has the high bit set.
    pub fn random() -> Self {
        let mut bytes = *uuid::Uuid::new_v4().as_bytes();
        bytes[0] &= 0x7f;
        Self(bytes)
    }

    pub const fn from_bytes(bytes: [u8; TOKEN_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; TOKEN_LEN] {
        &self.0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token({})", self)
    }
}

/// Stable identity of a device: where it lives and the token it announces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceId {
    pub ip: IpAddr,
    pub token: Token,
}

/// A device seen on the network
///
/// Equality and hashing only consider [`DeviceId`]; names and versions are
/// informational.
#[derive(Debug, Clone)]
pub struct Device {
    pub ip: IpAddr,
    /// Port of the main (control) connection
    pub port: u16,
    pub token: Token,
    pub name: String,
    pub software_name: String,
    pub software_version: String,
}

impl Device {
    pub fn id(&self) -> DeviceId {
        DeviceId {
            ip: self.ip,
            token: self.token,
        }
    }

    /// Address of a data service offered by this device
    pub fn service_addr(&self, port: u16) -> SocketAddr {
        SocketAddr::new(self.ip, port)
    }
}

impl PartialEq for Device {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Device {}

impl Hash for Device {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

/// Presence carried by a discovery announcement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Present,
    Leaving,
}

/// Data service kinds the bridge knows how to consume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceKind {
    StateMap,
    BeatInfo,
}

impl ServiceKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "StateMap" => Some(ServiceKind::StateMap),
            "BeatInfo" => Some(ServiceKind::BeatInfo),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceKind::StateMap => "StateMap",
            ServiceKind::BeatInfo => "BeatInfo",
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A service offered by a device on its main connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    pub name: String,
    pub port: u16,
}

impl Service {
    pub fn new(name: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            port,
        }
    }

    /// Known kind, or `None` for services the bridge ignores
    pub fn kind(&self) -> Option<ServiceKind> {
        ServiceKind::from_name(&self.name)
    }
}

/// A state change pushed by a StateMap session
///
/// `value` is the JSON object sent by the device, e.g.
/// `{"string": "Daft Punk", "type": 8}`.
#[derive(Debug, Clone, PartialEq)]
pub struct State {
    pub name: String,
    pub value: Map<String, Value>,
}

impl State {
    /// The `"string"` variant of the value, if the device sent one
    pub fn string_value(&self) -> Option<&str> {
        self.value.get("string").and_then(Value::as_str)
    }
}

/// Beat data for a single deck
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PlayerInfo {
    /// Fractional beat position
    pub beat: f64,
    /// Zero until the deck has a track loaded and reporting
    pub total_beats: f64,
    pub bpm: f64,
}

/// One BeatInfo sample covering every deck of a device
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BeatFrame {
    pub clock: u64,
    pub players: Vec<PlayerInfo>,
    pub timelines: Vec<f64>,
}

/// Engine OS deck (1-based) used to build state paths
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineDeck(usize);

impl EngineDeck {
    pub fn new(number: usize) -> Self {
        Self(number)
    }

    fn path(&self, leaf: &str) -> String {
        format!("/Engine/Deck{}/{}", self.0, leaf)
    }

    pub fn track_artist_name(&self) -> String {
        self.path("Track/ArtistName")
    }

    pub fn track_song_name(&self) -> String {
        self.path("Track/SongName")
    }

    pub fn beat(&self) -> String {
        self.path("Beat")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;
    use std::net::Ipv4Addr;

    fn device(ip: [u8; 4], token_byte: u8, name: &str) -> Device {
        Device {
            ip: IpAddr::V4(Ipv4Addr::from(ip)),
            port: 50010,
            token: Token::from_bytes([token_byte; TOKEN_LEN]),
            name: name.to_string(),
            software_name: "JP11".to_string(),
            software_version: "2.4.0".to_string(),
        }
    }

    #[test]
    fn test_device_equality_uses_identity_only() {
        let a = device([10, 0, 0, 2], 1, "SC6000");
        let mut renamed = a.clone();
        renamed.name = "Prime 4".to_string();
        renamed.port = 50020;
        assert_eq!(a, renamed);

        assert_ne!(a, device([10, 0, 0, 3], 1, "SC6000"));
        assert_ne!(a, device([10, 0, 0, 2], 2, "SC6000"));

        let set: HashSet<Device> = [a.clone(), renamed].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_token_random_has_clear_high_bit() {
        for _ in 0..32 {
            let token = Token::random();
            assert!(token.as_bytes()[0] < 0x80);
        }
        assert_ne!(Token::random(), Token::random());
    }

    #[test]
    fn test_token_display_is_hex() {
        let token = Token::from_bytes([0xab; TOKEN_LEN]);
        assert_eq!(token.to_string(), "ab".repeat(TOKEN_LEN));
    }

    #[test]
    fn test_service_kind() {
        assert_eq!(Service::new("StateMap", 1).kind(), Some(ServiceKind::StateMap));
        assert_eq!(Service::new("BeatInfo", 2).kind(), Some(ServiceKind::BeatInfo));
        assert_eq!(Service::new("FileTransfer", 3).kind(), None);
        assert_eq!(Service::new("statemap", 4).kind(), None);
    }

    #[test]
    fn test_state_string_value() {
        let value = json!({"string": "Around the World", "type": 8});
        let state = State {
            name: EngineDeck::new(1).track_song_name(),
            value: value.as_object().cloned().unwrap_or_default(),
        };
        assert_eq!(state.string_value(), Some("Around the World"));

        let state = State {
            name: "/Engine/Deck1/Play".to_string(),
            value: json!({"state": true, "type": 1})
                .as_object()
                .cloned()
                .unwrap_or_default(),
        };
        assert_eq!(state.string_value(), None);
    }

    #[test]
    fn test_engine_deck_paths() {
        let deck = EngineDeck::new(3);
        assert_eq!(deck.track_artist_name(), "/Engine/Deck3/Track/ArtistName");
        assert_eq!(deck.track_song_name(), "/Engine/Deck3/Track/SongName");
        assert_eq!(deck.beat(), "/Engine/Deck3/Beat");
    }
}

//! StageOSC - StagelinQ to OSC bridge
//!
//! Discovers StagelinQ devices on the local network, subscribes to their
//! StateMap and BeatInfo services and forwards track names and beat positions
//! as OSC messages over UDP.

pub mod bridge;
pub mod config;
pub mod osc;
pub mod stagelinq;

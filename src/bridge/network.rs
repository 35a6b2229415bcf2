//! Real network collaborators
//!
//! Wires the StagelinQ client and the OSC client into the bridge traits.

use async_trait::async_trait;
use rosc::OscMessage;
use std::time::Duration;

use super::{
    BeatInfoControl, BeatInfoSession, ControlConnection, Connector, Discoverer, OscSink,
    StateMapControl, StateMapSession,
};
use crate::osc::OscClient;
use crate::stagelinq::{
    self, BeatInfoConnection, Device, DeviceConnection, DeviceState, Listener, Service,
    StateMapConnection, Token,
};

/// Connector that dials devices over TCP
#[derive(Debug, Default, Clone, Copy)]
pub struct NetworkConnector;

#[async_trait]
impl Connector for NetworkConnector {
    async fn connect(
        &self,
        device: &Device,
        token: Token,
    ) -> stagelinq::Result<Box<dyn ControlConnection>> {
        let connection = DeviceConnection::connect(device, token).await?;
        Ok(Box::new(connection))
    }

    async fn open_state_map(
        &self,
        device: &Device,
        port: u16,
        token: Token,
    ) -> stagelinq::Result<StateMapSession> {
        let stream = device.dial(port).await?;
        let (connection, streams) = StateMapConnection::open(stream, token).await?;
        Ok(StateMapSession {
            control: Box::new(connection),
            states: streams.states,
            errors: streams.errors,
        })
    }

    async fn open_beat_info(
        &self,
        device: &Device,
        port: u16,
        token: Token,
    ) -> stagelinq::Result<BeatInfoSession> {
        let stream = device.dial(port).await?;
        let (connection, streams) = BeatInfoConnection::open(stream, token).await?;
        Ok(BeatInfoSession {
            control: Box::new(connection),
            frames: streams.frames,
            errors: streams.errors,
        })
    }
}

#[async_trait]
impl Discoverer for Listener {
    fn token(&self) -> Token {
        Listener::token(self)
    }

    fn announce_every(&mut self, interval: Duration) {
        Listener::announce_every(self, interval)
    }

    async fn discover(&mut self, timeout: Duration) -> stagelinq::Result<(Device, DeviceState)> {
        Listener::discover(self, timeout).await
    }
}

#[async_trait]
impl ControlConnection for DeviceConnection {
    async fn request_services(&mut self) -> stagelinq::Result<Vec<Service>> {
        DeviceConnection::request_services(self).await
    }
}

#[async_trait]
impl StateMapControl for StateMapConnection {
    async fn subscribe(&mut self, name: &str) -> stagelinq::Result<()> {
        StateMapConnection::subscribe(self, name).await
    }
}

#[async_trait]
impl BeatInfoControl for BeatInfoConnection {
    async fn start_stream(&mut self) -> stagelinq::Result<()> {
        BeatInfoConnection::start_stream(self).await
    }
}

#[async_trait]
impl OscSink for OscClient {
    async fn send(&self, message: OscMessage) -> anyhow::Result<()> {
        self.send_message(&message).await?;
        Ok(())
    }
}

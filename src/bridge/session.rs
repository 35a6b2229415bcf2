//! Device sessions
//!
//! `Bridge` turns a newly discovered device into running stream handlers and
//! owns everything that has to outlive the discovery window: the control
//! connections and the handler tasks.

use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{info, warn};

use super::beat_info::run_beat_info;
use super::state_map::run_state_map;
use super::{ControlConnection, Connector, DeckLayout, HandlerContext, HandlerExit, OscSink};
use crate::stagelinq::{Device, ServiceKind, Token};

/// Outcome of a finished handler task
#[derive(Debug)]
pub struct HandlerReport {
    pub device: String,
    pub kind: ServiceKind,
    pub exit: HandlerExit,
}

/// Session manager for every device seen during a run
pub struct Bridge {
    ctx: HandlerContext,
    /// Held open for the lifetime of the process
    controls: Vec<Box<dyn ControlConnection>>,
    handlers: JoinSet<HandlerReport>,
}

impl Bridge {
    pub fn new(
        connector: Arc<dyn Connector>,
        sink: Arc<dyn OscSink>,
        token: Token,
        layout: DeckLayout,
    ) -> Self {
        Self {
            ctx: HandlerContext {
                connector,
                sink,
                token,
                layout: Arc::new(layout),
            },
            controls: Vec::new(),
            handlers: JoinSet::new(),
        }
    }

    /// Number of handler tasks that have not been reaped yet
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Number of control connections being held open
    pub fn session_count(&self) -> usize {
        self.controls.len()
    }

    /// Open a control session with `device` and start a handler per known service
    ///
    /// Failures are logged and abandon the device for this run. Returns the
    /// number of handlers spawned.
    pub async fn attach(&mut self, device: Device) -> usize {
        info!("\tattempting to connect to {}…", device.name);
        let mut control = match self.ctx.connector.connect(&device, self.ctx.token).await {
            Ok(control) => control,
            Err(e) => {
                warn!("⚠️  Could not connect to {}: {}", device.name, e);
                return 0;
            },
        };

        info!("\trequesting device data services…");
        let services = match control.request_services().await {
            Ok(services) => services,
            Err(e) => {
                warn!("⚠️  Could not list services of {}: {}", device.name, e);
                return 0;
            },
        };

        let mut spawned = 0;
        for service in services {
            info!("\toffers {} at port {}", service.name, service.port);
            match service.kind() {
                Some(kind) => {
                    self.spawn_handler(kind, device.clone(), service.port);
                    spawned += 1;
                },
                None => info!("\tignoring service {}", service.name),
            }
        }
        info!("\tend of list of device data services");

        self.controls.push(control);
        spawned
    }

    fn spawn_handler(&mut self, kind: ServiceKind, device: Device, port: u16) {
        let ctx = self.ctx.clone();
        let name = device.name.clone();
        self.handlers.spawn(async move {
            let exit = match kind {
                ServiceKind::StateMap => run_state_map(ctx, device, port).await,
                ServiceKind::BeatInfo => run_beat_info(ctx, device, port).await,
            };
            HandlerReport {
                device: name,
                kind,
                exit,
            }
        });
    }

    /// Wait for the next handler to finish
    ///
    /// Returns `None` once no handlers remain.
    pub async fn next_exit(&mut self) -> Option<HandlerReport> {
        loop {
            match self.handlers.join_next().await? {
                Ok(report) => return Some(report),
                Err(e) => warn!("stream handler task failed: {}", e),
            }
        }
    }

    /// Keep sessions and handlers alive forever
    ///
    /// The discovery window is over; from here on the running handlers are the
    /// product. This never returns. The process ends from outside (signal),
    /// at which point dropping the bridge aborts every handler and closes its
    /// connection.
    pub async fn hold(mut self) {
        while let Some(report) = self.next_exit().await {
            info!(
                "{} handler for {} stopped: {:?}",
                report.kind, report.device, report.exit
            );
        }
        info!(
            "No stream handlers left; holding {} control session(s) open",
            self.controls.len()
        );
        std::future::pending::<()>().await;
    }
}

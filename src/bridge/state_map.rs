//! StateMap stream handler
//!
//! Subscribes to the configured state paths and forwards every text value as
//! an OSC message addressed by the state path.

use rosc::{OscMessage, OscType};
use tracing::{debug, info, warn};

use super::{HandlerContext, HandlerExit, OscSink};
use crate::stagelinq::{Device, State};

/// Turn a state change into an OSC message
///
/// Only the `"string"` variant is forwarded; other values produce nothing.
pub fn translate_state(state: &State) -> Option<OscMessage> {
    let text = state.string_value()?;
    Some(OscMessage {
        addr: state.name.clone(),
        args: vec![OscType::String(text.to_string())],
    })
}

async fn forward_state(sink: &dyn OscSink, state: &State) {
    debug!("{} = {:?}", state.name, state.value);

    let Some(message) = translate_state(state) else {
        return;
    };
    if let Err(e) = sink.send(message).await {
        warn!("Failed to send OSC message for {}: {}", state.name, e);
    }
}

/// Run one StateMap session until it fails
pub async fn run_state_map(ctx: HandlerContext, device: Device, port: u16) -> HandlerExit {
    debug!("connecting to StateMap on {}:{}", device.ip, port);

    let mut session = match ctx
        .connector
        .open_state_map(&device, port, ctx.token)
        .await
    {
        Ok(session) => session,
        Err(e) => {
            warn!("⚠️  StateMap session with {} failed: {}", device.name, e);
            return HandlerExit::SessionFailed(e);
        },
    };

    for path in &ctx.layout.state_paths {
        if let Err(e) = session.control.subscribe(path).await {
            warn!("Failed to subscribe to {} on {}: {}", path, device.name, e);
        }
    }
    info!(
        "✅ StateMap streaming from {} ({} paths)",
        device.name,
        ctx.layout.state_paths.len()
    );

    loop {
        tokio::select! {
            biased;

            state = session.states.recv() => match state {
                Some(state) => forward_state(ctx.sink.as_ref(), &state).await,
                None => {
                    return match session.errors.try_recv() {
                        Ok(e) => {
                            warn!("⚠️  StateMap stream from {} failed: {}", device.name, e);
                            HandlerExit::StreamFailed(e)
                        },
                        Err(_) => {
                            warn!("🔌 StateMap stream from {} closed", device.name);
                            HandlerExit::StreamClosed
                        },
                    };
                },
            },

            error = session.errors.recv() => {
                return match error {
                    Some(e) => {
                        warn!("⚠️  StateMap stream from {} failed: {}", device.name, e);
                        HandlerExit::StreamFailed(e)
                    },
                    None => {
                        warn!("🔌 StateMap stream from {} closed", device.name);
                        HandlerExit::StreamClosed
                    },
                };
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state(name: &str, value: serde_json::Value) -> State {
        State {
            name: name.to_string(),
            value: value.as_object().cloned().unwrap_or_default(),
        }
    }

    #[test]
    fn test_string_state_becomes_message() {
        let message = translate_state(&state(
            "/Engine/Deck1/Track/ArtistName",
            json!({"string": "Bonobo", "type": 8}),
        ))
        .unwrap();
        assert_eq!(message.addr, "/Engine/Deck1/Track/ArtistName");
        assert_eq!(message.args, vec![OscType::String("Bonobo".to_string())]);
    }

    #[test]
    fn test_empty_string_is_still_forwarded() {
        let message = translate_state(&state(
            "/Engine/Deck2/Track/SongName",
            json!({"string": "", "type": 8}),
        ));
        assert!(message.is_some());
    }

    #[test]
    fn test_non_string_state_is_dropped() {
        assert!(translate_state(&state("/Engine/Deck1/Play", json!({"state": true, "type": 1}))).is_none());
        assert!(translate_state(&state("/Engine/Deck1/Track/SongName", json!({"string": 3}))).is_none());
        assert!(translate_state(&state("/Engine/Deck1/Track/SongName", json!({}))).is_none());
    }
}

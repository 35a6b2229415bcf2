//! BeatInfo stream handler
//!
//! Starts the beat stream and forwards debounced beat positions as
//! `/Engine/Deck<N>/Beat` OSC messages.

use rosc::{OscMessage, OscType};
use tracing::{debug, info, warn};

use super::{BeatDebouncer, HandlerContext, HandlerExit, OscSink};
use crate::stagelinq::{BeatFrame, Device, EngineDeck};

/// OSC message for deck slot `slot` (0-based) at `beat`
pub fn beat_message(slot: usize, beat: f64) -> OscMessage {
    OscMessage {
        addr: EngineDeck::new(slot + 1).beat(),
        args: vec![OscType::Float(beat as f32)],
    }
}

/// Messages a frame produces, updating the debouncer as it goes
pub fn translate_frame(debouncer: &mut BeatDebouncer, frame: &BeatFrame) -> Vec<OscMessage> {
    let slots = debouncer.slots();
    frame
        .players
        .iter()
        .take(slots)
        .enumerate()
        .filter(|(slot, player)| debouncer.observe(*slot, player))
        .map(|(slot, player)| beat_message(slot, player.beat))
        .collect()
}

async fn forward_frame(sink: &dyn OscSink, debouncer: &mut BeatDebouncer, frame: &BeatFrame) {
    debug!("{:?}", frame);

    for message in translate_frame(debouncer, frame) {
        debug!("{} {:?}", message.addr, message.args);
        let addr = message.addr.clone();
        if let Err(e) = sink.send(message).await {
            warn!("Failed to send OSC message for {}: {}", addr, e);
        }
    }
}

/// Run one BeatInfo session until it fails
pub async fn run_beat_info(ctx: HandlerContext, device: Device, port: u16) -> HandlerExit {
    debug!("connecting to BeatInfo on {}:{}", device.ip, port);

    let mut session = match ctx
        .connector
        .open_beat_info(&device, port, ctx.token)
        .await
    {
        Ok(session) => session,
        Err(e) => {
            warn!("⚠️  BeatInfo session with {} failed: {}", device.name, e);
            return HandlerExit::SessionFailed(e);
        },
    };

    debug!("requesting BeatInfo stream from {}", device.name);
    if let Err(e) = session.control.start_stream().await {
        warn!("Failed to start BeatInfo stream on {}: {}", device.name, e);
    }
    info!("✅ BeatInfo streaming from {}", device.name);

    let mut debouncer = BeatDebouncer::new(ctx.layout.deck_count);

    loop {
        tokio::select! {
            biased;

            frame = session.frames.recv() => match frame {
                Some(frame) => forward_frame(ctx.sink.as_ref(), &mut debouncer, &frame).await,
                None => {
                    return match session.errors.try_recv() {
                        Ok(e) => {
                            warn!("⚠️  BeatInfo stream from {} failed: {}", device.name, e);
                            HandlerExit::StreamFailed(e)
                        },
                        Err(_) => {
                            warn!("🔌 BeatInfo stream from {} closed", device.name);
                            HandlerExit::StreamClosed
                        },
                    };
                },
            },

            error = session.errors.recv() => {
                return match error {
                    Some(e) => {
                        warn!("⚠️  BeatInfo stream from {} failed: {}", device.name, e);
                        HandlerExit::StreamFailed(e)
                    },
                    None => {
                        warn!("🔌 BeatInfo stream from {} closed", device.name);
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
    use crate::stagelinq::PlayerInfo;

    fn frame(beats: &[(f64, f64)]) -> BeatFrame {
        BeatFrame {
            clock: 0,
            players: beats
                .iter()
                .map(|&(beat, total_beats)| PlayerInfo {
                    beat,
                    total_beats,
                    bpm: 120.0,
                })
                .collect(),
            timelines: vec![0.0; beats.len()],
        }
    }

    #[test]
    fn test_beat_message_address() {
        let message = beat_message(0, 3.5);
        assert_eq!(message.addr, "/Engine/Deck1/Beat");
        assert_eq!(message.args, vec![OscType::Float(3.5)]);
        assert_eq!(beat_message(3, 0.0).addr, "/Engine/Deck4/Beat");
    }

    #[test]
    fn test_frame_emits_only_advancing_decks() {
        let mut debouncer = BeatDebouncer::new(4);
        let messages = translate_frame(
            &mut debouncer,
            &frame(&[(1.2, 300.0), (7.0, 0.0), (0.4, 200.0), (2.0, 100.0)]),
        );
        let addrs: Vec<_> = messages.iter().map(|m| m.addr.as_str()).collect();
        assert_eq!(addrs, vec!["/Engine/Deck1/Beat", "/Engine/Deck4/Beat"]);

        // Same whole beats again: nothing new
        let messages = translate_frame(
            &mut debouncer,
            &frame(&[(1.9, 300.0), (7.0, 0.0), (0.8, 200.0), (2.5, 100.0)]),
        );
        assert!(messages.is_empty());
    }

    #[test]
    fn test_extra_players_beyond_layout_are_ignored() {
        let mut debouncer = BeatDebouncer::new(2);
        let messages = translate_frame(
            &mut debouncer,
            &frame(&[(1.0, 1.0), (1.0, 1.0), (1.0, 1.0), (1.0, 1.0)]),
        );
        assert_eq!(messages.len(), 2);
    }
}

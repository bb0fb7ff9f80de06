use crate::world::creatures::CreatureId;
use crate::world::position::{Direction, Position};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeechType {
    Say,
    Whisper,
    Yell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TextMessageType {
    EventAdvance,
    EventDefault,
    StatusDefault,
    StatusSmall,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MagicEffect {
    BlueShimmer,
    Puff,
    RedSpark,
}

/// What one client is told. Encoding to wire packets happens further out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutboundPayload {
    CreatureSpeech {
        speaker: CreatureId,
        name: String,
        speech_type: SpeechType,
        text: String,
        location: Position,
    },
    TextMessage {
        message_type: TextMessageType,
        text: String,
    },
    MagicEffect {
        location: Position,
        effect: MagicEffect,
    },
    CreatureMoved {
        creature: CreatureId,
        from: Position,
        to: Position,
    },
    CreatureAppeared {
        creature: CreatureId,
        name: String,
        location: Position,
        direction: Direction,
        health_percent: u8,
        speed: u16,
        /// Creature the client should drop to make room for this one.
        replaces_known: Option<CreatureId>,
    },
    CreatureTurned {
        creature: CreatureId,
        direction: Direction,
    },
    CreatureRemoved {
        creature: CreatureId,
        location: Position,
    },
    PlayerCancelWalk {
        direction: Direction,
    },
    PlayerCancelAttack,
    PlayerDeath,
    PlayerConditions {
        flags: u32,
    },
    TileUpdate {
        location: Position,
        item_count: usize,
    },
}

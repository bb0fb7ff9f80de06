pub mod kinds;
pub mod known_creatures;
pub mod notification;
pub mod payload;

pub use known_creatures::KnownCreatureSets;
pub use notification::{
    dispatch, Audience, Notification, NotificationContext, NotificationSink, RecordingSink,
    SendReport, TranscriptSink,
};
pub use payload::{MagicEffect, OutboundPayload, SpeechType, TextMessageType};

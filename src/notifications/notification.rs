//! Fan-out of state changes to the players who should hear about them.
//!
//! A notification names its audience, not its recipients: the audience is
//! resolved against the world as it is when the notification is sent, which
//! happens after the operation that raised it has finished.

use crate::notifications::known_creatures::KnownCreatureSets;
use crate::notifications::payload::OutboundPayload;
use crate::world::creatures::{CreatureFinder, CreatureId};
use crate::world::map::SpatialMap;
use crate::world::position::Position;
use crate::world::time::GameTick;
use serde::Serialize;
use std::io::Write;
use std::sync::Mutex;
use tracing::{trace, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    Player(CreatureId),
    SpectatorsOf(Position),
    /// Whoever can see the creature wherever it stands at send time.
    SpectatorsOfCreature(CreatureId),
    SpectatorsOfEither(Position, Position),
}

impl Audience {
    pub fn resolve(&self, ctx: &NotificationContext<'_>) -> Vec<CreatureId> {
        match self {
            // A player who just left the world still gets their last messages.
            Audience::Player(id) => match ctx.creatures.find_creature(*id) {
                Some(creature) if !creature.is_player() => Vec::new(),
                _ => vec![*id],
            },
            Audience::SpectatorsOf(location) => {
                ctx.map.players_that_can_see(*location, ctx.creatures)
            }
            Audience::SpectatorsOfCreature(id) => ctx
                .creatures
                .find_creature(*id)
                .map(|creature| ctx.map.players_that_can_see(creature.position, ctx.creatures))
                .unwrap_or_default(),
            Audience::SpectatorsOfEither(first, second) => {
                let mut players = ctx.map.players_that_can_see(*first, ctx.creatures);
                players.extend(ctx.map.players_that_can_see(*second, ctx.creatures));
                players.sort();
                players.dedup();
                players
            }
        }
    }
}

pub struct NotificationContext<'a> {
    pub map: &'a dyn SpatialMap,
    pub creatures: &'a dyn CreatureFinder,
    pub known_creatures: &'a KnownCreatureSets,
    pub now: GameTick,
}

pub trait Notification: Send {
    fn audience(&self) -> Audience;

    /// Payloads for one recipient. Empty means nothing to send to them.
    fn prepare(&self, ctx: &NotificationContext<'_>, recipient: CreatureId) -> Vec<OutboundPayload>;

    /// Runs once, after every recipient has been handled.
    fn on_sent(&self, _report: &SendReport) {}
}

/// Hands prepared payloads to whatever talks to clients.
pub trait NotificationSink: Send + Sync {
    fn deliver(&self, recipient: CreatureId, payloads: Vec<OutboundPayload>);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendReport {
    pub recipients: usize,
    pub payloads: usize,
}

/// Sends `notification`. Taking it by value means it can only be sent once.
pub fn dispatch(
    notification: Box<dyn Notification>,
    ctx: &NotificationContext<'_>,
    sink: &dyn NotificationSink,
) -> SendReport {
    let mut report = SendReport::default();
    for recipient in notification.audience().resolve(ctx) {
        let payloads = notification.prepare(ctx, recipient);
        if payloads.is_empty() {
            continue;
        }
        report.recipients += 1;
        report.payloads += payloads.len();
        sink.deliver(recipient, payloads);
    }
    notification.on_sent(&report);
    trace!(recipients = report.recipients, payloads = report.payloads, "notification sent");
    report
}

/// Keeps everything delivered, in order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    delivered: Mutex<Vec<(CreatureId, OutboundPayload)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delivered(&self) -> Vec<(CreatureId, OutboundPayload)> {
        self.delivered
            .lock()
            .map(|delivered| delivered.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn delivered_to(&self, recipient: CreatureId) -> Vec<OutboundPayload> {
        self.delivered()
            .into_iter()
            .filter(|(id, _)| *id == recipient)
            .map(|(_, payload)| payload)
            .collect()
    }

    pub fn clear(&self) {
        self.delivered
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }
}

impl NotificationSink for RecordingSink {
    fn deliver(&self, recipient: CreatureId, payloads: Vec<OutboundPayload>) {
        let mut delivered = self
            .delivered
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        delivered.extend(payloads.into_iter().map(|payload| (recipient, payload)));
    }
}

#[derive(Serialize)]
struct Delivery<'a> {
    recipient: CreatureId,
    at: u64,
    payloads: &'a [OutboundPayload],
}

/// Appends every delivery as a YAML document, e.g. to `log/outbound.yaml`.
pub struct TranscriptSink<W: Write + Send> {
    out: Mutex<W>,
    clock: Box<dyn Fn() -> GameTick + Send + Sync>,
}

impl<W: Write + Send> TranscriptSink<W> {
    pub fn new(out: W, clock: impl Fn() -> GameTick + Send + Sync + 'static) -> Self {
        Self {
            out: Mutex::new(out),
            clock: Box::new(clock),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<W: Write + Send> NotificationSink for TranscriptSink<W> {
    fn deliver(&self, recipient: CreatureId, payloads: Vec<OutboundPayload>) {
        let delivery = Delivery {
            recipient,
            at: (self.clock)().0,
            payloads: &payloads,
        };
        let document = match serde_yaml::to_string(&delivery) {
            Ok(document) => document,
            Err(err) => {
                warn!(%recipient, error = %err, "outbound payload not serializable");
                return;
            }
        };
        let mut out = self.out.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Err(err) = writeln!(out, "---\n{}", document.trim_end()).and_then(|_| out.flush()) {
            warn!(%recipient, error = %err, "outbound transcript write failed");
        }
    }
}

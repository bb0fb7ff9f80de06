use crate::notifications::known_creatures::Familiarity;
use crate::notifications::notification::{Audience, Notification, NotificationContext};
use crate::notifications::payload::{MagicEffect, OutboundPayload, SpeechType, TextMessageType};
use crate::world::creatures::{Creature, CreatureId};
use crate::world::position::{Direction, Position};
use crate::world::viewport::Viewport;

/// Full description of `creature` the first time `recipient` sees it,
/// a plain move update afterwards.
fn introduce(
    ctx: &NotificationContext<'_>,
    recipient: CreatureId,
    creature: &Creature,
    from: Option<Position>,
) -> OutboundPayload {
    match ctx.known_creatures.learn(recipient, creature.id) {
        Familiarity::Known => match from {
            Some(from) => OutboundPayload::CreatureMoved {
                creature: creature.id,
                from,
                to: creature.position,
            },
            None => appeared(creature, None),
        },
        Familiarity::Learned { evicted } => appeared(creature, evicted),
    }
}

fn appeared(creature: &Creature, replaces_known: Option<CreatureId>) -> OutboundPayload {
    OutboundPayload::CreatureAppeared {
        creature: creature.id,
        name: creature.name.clone(),
        location: creature.position,
        direction: creature.direction.client_safe(),
        health_percent: creature.health_percent(),
        speed: creature.speed,
        replaces_known,
    }
}

/// Fixed payloads for one player.
#[derive(Debug, Clone)]
pub struct PlayerNotification {
    player: CreatureId,
    payloads: Vec<OutboundPayload>,
}

impl PlayerNotification {
    pub fn new(player: CreatureId, payloads: Vec<OutboundPayload>) -> Self {
        Self { player, payloads }
    }

    pub fn text(player: CreatureId, message_type: TextMessageType, text: &str) -> Self {
        Self::new(
            player,
            vec![OutboundPayload::TextMessage {
                message_type,
                text: text.to_string(),
            }],
        )
    }
}

impl Notification for PlayerNotification {
    fn audience(&self) -> Audience {
        Audience::Player(self.player)
    }

    fn prepare(&self, _ctx: &NotificationContext<'_>, _recipient: CreatureId) -> Vec<OutboundPayload> {
        self.payloads.clone()
    }
}

#[derive(Debug, Clone)]
pub struct CreatureSpeechNotification {
    pub speaker: CreatureId,
    pub name: String,
    pub speech_type: SpeechType,
    pub text: String,
    pub location: Position,
}

impl Notification for CreatureSpeechNotification {
    fn audience(&self) -> Audience {
        Audience::SpectatorsOf(self.location)
    }

    fn prepare(&self, _ctx: &NotificationContext<'_>, _recipient: CreatureId) -> Vec<OutboundPayload> {
        vec![OutboundPayload::CreatureSpeech {
            speaker: self.speaker,
            name: self.name.clone(),
            speech_type: self.speech_type,
            text: self.text.clone(),
            location: self.location,
        }]
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MagicEffectNotification {
    pub location: Position,
    pub effect: MagicEffect,
}

impl Notification for MagicEffectNotification {
    fn audience(&self) -> Audience {
        Audience::SpectatorsOf(self.location)
    }

    fn prepare(&self, _ctx: &NotificationContext<'_>, _recipient: CreatureId) -> Vec<OutboundPayload> {
        vec![OutboundPayload::MagicEffect {
            location: self.location,
            effect: self.effect,
        }]
    }
}

/// A creature stepped from `from` to `to`.
///
/// Spectators of the destination who have never seen the creature get it in
/// full; spectators who only saw the origin are told it left.
#[derive(Debug, Clone, Copy)]
pub struct CreatureMovedNotification {
    pub creature: CreatureId,
    pub from: Position,
    pub to: Position,
}

impl Notification for CreatureMovedNotification {
    fn audience(&self) -> Audience {
        Audience::SpectatorsOfEither(self.from, self.to)
    }

    fn prepare(&self, ctx: &NotificationContext<'_>, recipient: CreatureId) -> Vec<OutboundPayload> {
        let (Some(viewer), Some(creature)) = (
            ctx.creatures.find_creature(recipient),
            ctx.creatures.find_creature(self.creature),
        ) else {
            return Vec::new();
        };
        if recipient == self.creature {
            return vec![OutboundPayload::CreatureMoved {
                creature: self.creature,
                from: self.from,
                to: self.to,
            }];
        }
        if Viewport::can_see(viewer.position, self.to) {
            vec![introduce(ctx, recipient, creature, Some(self.from))]
        } else if Viewport::can_see(viewer.position, self.from) {
            ctx.known_creatures.forget(recipient, self.creature);
            vec![OutboundPayload::CreatureRemoved {
                creature: self.creature,
                location: self.from,
            }]
        } else {
            Vec::new()
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CreatureAppearedNotification {
    pub creature: CreatureId,
    pub location: Position,
    pub effect: Option<MagicEffect>,
}

impl Notification for CreatureAppearedNotification {
    fn audience(&self) -> Audience {
        Audience::SpectatorsOf(self.location)
    }

    fn prepare(&self, ctx: &NotificationContext<'_>, recipient: CreatureId) -> Vec<OutboundPayload> {
        let Some(creature) = ctx.creatures.find_creature(self.creature) else {
            return Vec::new();
        };
        let mut payloads = vec![introduce(ctx, recipient, creature, None)];
        if let Some(effect) = self.effect {
            payloads.push(OutboundPayload::MagicEffect {
                location: self.location,
                effect,
            });
        }
        payloads
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CreatureRemovedNotification {
    pub creature: CreatureId,
    pub location: Position,
    pub effect: Option<MagicEffect>,
}

impl Notification for CreatureRemovedNotification {
    fn audience(&self) -> Audience {
        Audience::SpectatorsOf(self.location)
    }

    fn prepare(&self, ctx: &NotificationContext<'_>, recipient: CreatureId) -> Vec<OutboundPayload> {
        ctx.known_creatures.forget(recipient, self.creature);
        let mut payloads = vec![OutboundPayload::CreatureRemoved {
            creature: self.creature,
            location: self.location,
        }];
        if let Some(effect) = self.effect {
            payloads.push(OutboundPayload::MagicEffect {
                location: self.location,
                effect,
            });
        }
        payloads
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CreatureTurnedNotification {
    pub creature: CreatureId,
    pub direction: Direction,
}

impl Notification for CreatureTurnedNotification {
    fn audience(&self) -> Audience {
        Audience::SpectatorsOfCreature(self.creature)
    }

    fn prepare(&self, _ctx: &NotificationContext<'_>, _recipient: CreatureId) -> Vec<OutboundPayload> {
        vec![OutboundPayload::CreatureTurned {
            creature: self.creature,
            direction: self.direction.client_safe(),
        }]
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TileUpdatedNotification {
    pub location: Position,
}

impl Notification for TileUpdatedNotification {
    fn audience(&self) -> Audience {
        Audience::SpectatorsOf(self.location)
    }

    fn prepare(&self, ctx: &NotificationContext<'_>, _recipient: CreatureId) -> Vec<OutboundPayload> {
        let item_count = ctx
            .map
            .tile_at(self.location)
            .map(|tile| tile.items.len())
            .unwrap_or(0);
        vec![OutboundPayload::TileUpdate {
            location: self.location,
            item_count,
        }]
    }
}

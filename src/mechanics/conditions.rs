use crate::error::EventError;
use crate::mechanics::context::OperationContext;
use crate::notifications::kinds::PlayerNotification;
use crate::notifications::OutboundPayload;
use crate::scheduling::event::{Condition, EventType};
use crate::world::time::GameTick;
use std::collections::BTreeSet;
use tracing::trace;

/// Status effects a creature can carry, with the bit the client expects for each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConditionType {
    Poisoned,
    Burning,
    Electrified,
    Drunk,
    MagicShield,
    Paralyzed,
    Haste,
    InFight,
}

impl ConditionType {
    pub fn flag(self) -> u32 {
        match self {
            ConditionType::Poisoned => 0x01,
            ConditionType::Burning => 0x02,
            ConditionType::Electrified => 0x04,
            ConditionType::Drunk => 0x08,
            ConditionType::MagicShield => 0x10,
            ConditionType::Paralyzed => 0x20,
            ConditionType::Haste => 0x40,
            ConditionType::InFight => 0x80,
        }
    }

    pub fn event_type(self) -> EventType {
        match self {
            ConditionType::Poisoned => EventType::new("condition.poisoned"),
            ConditionType::Burning => EventType::new("condition.burning"),
            ConditionType::Electrified => EventType::new("condition.electrified"),
            ConditionType::Drunk => EventType::new("condition.drunk"),
            ConditionType::MagicShield => EventType::new("condition.magic_shield"),
            ConditionType::Paralyzed => EventType::new("condition.paralyzed"),
            ConditionType::Haste => EventType::new("condition.haste"),
            ConditionType::InFight => EventType::new("condition.in_fight"),
        }
    }
}

pub fn condition_flags(conditions: &BTreeSet<ConditionType>) -> u32 {
    conditions
        .iter()
        .fold(0, |flags, condition| flags | condition.flag())
}

/// Marks a creature as recently in combat until `ends_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InFightCondition {
    ends_at: GameTick,
}

impl InFightCondition {
    pub fn new(ends_at: GameTick) -> Self {
        Self { ends_at }
    }
}

impl Condition for InFightCondition {
    fn condition_type(&self) -> ConditionType {
        ConditionType::InFight
    }

    fn ends_at(&self) -> GameTick {
        self.ends_at
    }

    fn aggregate(&mut self, other: &dyn Condition) -> bool {
        if other.condition_type() != ConditionType::InFight {
            return false;
        }
        self.ends_at = self.ends_at.max(other.ends_at());
        true
    }

    fn execute(&mut self, ctx: &mut OperationContext<'_>) -> Result<(), EventError> {
        if ctx.now < self.ends_at {
            ctx.repeat_after = Some(self.ends_at.remaining_from(ctx.now));
            return Ok(());
        }
        let requestor = ctx.requestor;
        let Some(creature) = ctx.creatures.find_creature_mut(requestor) else {
            return Ok(());
        };
        creature.conditions.remove(&ConditionType::InFight);
        trace!(creature = %requestor, "in-fight condition ended");
        if creature.is_player() {
            let flags = condition_flags(&creature.conditions);
            ctx.notify(PlayerNotification::new(
                requestor,
                vec![OutboundPayload::PlayerConditions { flags }],
            ));
        }
        Ok(())
    }
}

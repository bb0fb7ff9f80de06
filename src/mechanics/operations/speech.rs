use crate::error::EventError;
use crate::mechanics::context::OperationContext;
use crate::mechanics::operations::movement::is_free_to_enter;
use crate::mechanics::operations::place_creature::PlaceCreatureOperation;
use crate::notifications::kinds::{CreatureSpeechNotification, MagicEffectNotification};
use crate::notifications::{MagicEffect, SpeechType};
use crate::scheduling::event::{EventType, Operation};
use crate::world::creatures::{CreatureFinder, CreatureId};
use crate::world::position::ALL_DIRECTIONS;
use rand::seq::SliceRandom;
use std::time::Duration;
use tracing::debug;

const SPEED_STEP: f32 = 0.1;
const MIN_COMBAT_SPEED: f32 = 0.1;

/// Chat lines the server treats as commands instead of speech.
#[derive(Debug, Clone, PartialEq)]
pub enum SpeechCommand {
    AdjustAttackSpeed(f32),
    AdjustDefenseSpeed(f32),
    GiveExperience(u64),
    SummonMonster(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParsedSpeech {
    Command(SpeechCommand),
    /// Looked like a command but could not be read; swallowed silently.
    Malformed(&'static str),
    Plain,
}

pub fn parse_speech(text: &str) -> ParsedSpeech {
    match text {
        "increase atk speed" => return ParsedSpeech::Command(SpeechCommand::AdjustAttackSpeed(SPEED_STEP)),
        "decrease atk speed" => return ParsedSpeech::Command(SpeechCommand::AdjustAttackSpeed(-SPEED_STEP)),
        "increase def speed" => return ParsedSpeech::Command(SpeechCommand::AdjustDefenseSpeed(SPEED_STEP)),
        "decrease def speed" => return ParsedSpeech::Command(SpeechCommand::AdjustDefenseSpeed(-SPEED_STEP)),
        _ => {}
    }
    if let Some(amount) = text.strip_prefix("!exp") {
        return match amount.trim().parse::<u64>() {
            Ok(amount) => ParsedSpeech::Command(SpeechCommand::GiveExperience(amount)),
            Err(_) => ParsedSpeech::Malformed("experience amount is not a number"),
        };
    }
    if let Some(race) = text.strip_prefix("!mon") {
        let race = race.trim();
        return if race.is_empty() {
            ParsedSpeech::Malformed("no race given")
        } else {
            ParsedSpeech::Command(SpeechCommand::SummonMonster(race.to_string()))
        };
    }
    ParsedSpeech::Plain
}

#[derive(Debug, Clone)]
pub struct SpeechOperation {
    speaker: CreatureId,
    speech_type: SpeechType,
    text: String,
}

impl SpeechOperation {
    pub fn new(speaker: CreatureId, speech_type: SpeechType, text: impl Into<String>) -> Self {
        Self {
            speaker,
            speech_type,
            text: text.into(),
        }
    }

    fn apply(&self, ctx: &mut OperationContext<'_>, command: SpeechCommand) -> Result<(), EventError> {
        let speaker = ctx
            .creatures
            .find_creature_mut(self.speaker)
            .ok_or(EventError::CreatureNotFound(self.speaker))?;
        match command {
            SpeechCommand::AdjustAttackSpeed(delta) => {
                speaker.attack_speed = (speaker.attack_speed + delta).max(MIN_COMBAT_SPEED);
                debug!(creature = %self.speaker, attack_speed = speaker.attack_speed, "attack speed changed");
            }
            SpeechCommand::AdjustDefenseSpeed(delta) => {
                speaker.defense_speed = (speaker.defense_speed + delta).max(MIN_COMBAT_SPEED);
                debug!(creature = %self.speaker, defense_speed = speaker.defense_speed, "defense speed changed");
            }
            SpeechCommand::GiveExperience(amount) => speaker.add_experience(amount),
            SpeechCommand::SummonMonster(race) => {
                let origin = speaker.position;
                let mut directions = ALL_DIRECTIONS;
                directions.shuffle(&mut *ctx.rng);
                let location = if ctx.monster_types.monster_type(&race).is_some() {
                    directions
                        .iter()
                        .filter_map(|direction| origin.step(*direction))
                        .find(|to| is_free_to_enter(&*ctx, *to))
                } else {
                    None
                };
                match location {
                    Some(location) => {
                        ctx.schedule(
                            CreatureId::SYSTEM,
                            PlaceCreatureOperation::monster(race, location),
                            Duration::ZERO,
                        );
                    }
                    None => {
                        debug!(creature = %self.speaker, %race, "summon fizzled");
                        ctx.notify(MagicEffectNotification {
                            location: origin,
                            effect: MagicEffect::Puff,
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

impl Operation for SpeechOperation {
    fn event_type(&self) -> EventType {
        EventType::SPEECH
    }

    fn execute(&mut self, ctx: &mut OperationContext<'_>) -> Result<(), EventError> {
        let Some(speaker) = ctx.creatures.find_creature(self.speaker) else {
            return Ok(());
        };
        let (name, location) = (speaker.name.clone(), speaker.position);
        match parse_speech(&self.text) {
            ParsedSpeech::Command(command) => self.apply(ctx, command),
            ParsedSpeech::Malformed(reason) => {
                debug!(creature = %self.speaker, text = %self.text, reason, "speech command ignored");
                Ok(())
            }
            ParsedSpeech::Plain => {
                ctx.notify(CreatureSpeechNotification {
                    speaker: self.speaker,
                    name,
                    speech_type: self.speech_type,
                    text: self.text.clone(),
                    location,
                });
                Ok(())
            }
        }
    }
}

//! Entry point for decoded client requests.
//!
//! Connection threads call in here while the consumer loop owns the world,
//! so only the shape of a request is checked. Whether the player and any
//! follow target still exist is settled when the operation runs: events of
//! departed requestors are skipped and a walk towards a vanished creature
//! aborts.

use crate::error::RequestError;
use crate::mechanics::context::MechanicsSettings;
use crate::mechanics::operations::{
    AutoWalkOrchestratorOperation, CancelOperationsOperation, SpeechOperation, TurnOperation,
};
use crate::notifications::SpeechType;
use crate::pathfinding::{GoalLocationProvider, WalkPlan, WalkStrategy};
use crate::scheduling::event::{EventId, EventType, ScheduledEvent};
use crate::scheduling::scheduler::Scheduler;
use crate::world::creatures::CreatureId;
use crate::world::position::Direction;
use std::time::Duration;
use tracing::{debug, warn};

/// Longest direction list a single walk request may carry.
pub const MAX_WALK_STEPS: usize = 64;

/// How close a follower tries to stay to whoever it follows.
const FOLLOW_DISTANCE: u32 = 1;

#[derive(Debug, Clone, PartialEq)]
pub enum PlayerRequest {
    AutoWalk { directions: Vec<Direction> },
    Follow { target: CreatureId },
    Speech { speech_type: SpeechType, text: String },
    CancelOperations,
    Turn { direction: Direction },
}

/// Safe to call from any thread; touches nothing but the scheduler.
pub fn handle_request(
    player: CreatureId,
    request: PlayerRequest,
    scheduler: &Scheduler,
    settings: &MechanicsSettings,
) -> Result<EventId, RequestError> {
    let result = accept(player, request, scheduler, settings);
    match &result {
        Ok(event_id) => debug!(%player, %event_id, "request accepted"),
        Err(error) => warn!(%player, %error, "request dropped"),
    }
    result
}

fn accept(
    player: CreatureId,
    request: PlayerRequest,
    scheduler: &Scheduler,
    settings: &MechanicsSettings,
) -> Result<EventId, RequestError> {
    if player.is_system() {
        return Err(RequestError::NotAPlayer(player));
    }

    let event = match request {
        PlayerRequest::AutoWalk { directions } => {
            if directions.is_empty() {
                return Err(RequestError::EmptyWalk);
            }
            if directions.len() > MAX_WALK_STEPS {
                return Err(RequestError::WalkTooLong(directions.len()));
            }
            scheduler.cancel_all_for(player, EventType::MOVEMENT);
            ScheduledEvent::operation(player, AutoWalkOrchestratorOperation::along(player, directions))
        }
        PlayerRequest::Follow { target } => {
            if target == player || target.is_system() {
                return Err(RequestError::UnknownTarget(target));
            }
            scheduler.cancel_all_for(player, EventType::MOVEMENT);
            let plan = WalkPlan::towards(
                GoalLocationProvider::Creature(target),
                WalkStrategy::Dynamic,
                FOLLOW_DISTANCE,
            )
            .with_wait_time(settings.walk_wait_time);
            ScheduledEvent::operation(player, AutoWalkOrchestratorOperation::with_plan(player, plan))
        }
        PlayerRequest::Speech { speech_type, text } => {
            if text.trim().is_empty() {
                return Err(RequestError::EmptySpeech);
            }
            ScheduledEvent::operation(player, SpeechOperation::new(player, speech_type, text))
        }
        PlayerRequest::CancelOperations => {
            ScheduledEvent::operation(player, CancelOperationsOperation::new(player)).not_cancellable()
        }
        PlayerRequest::Turn { direction } => {
            ScheduledEvent::operation(player, TurnOperation::new(player, direction))
        }
    };
    Ok(scheduler.schedule(event, Duration::ZERO))
}

//! Action verification: local checks, the optimistic queue, and submission.
//!
//! A claim passes every local gate before anything leaves the device:
//! code match for scans, then fix accuracy, movement plausibility, and the
//! geofence for everything else. Survivors are written to the pending queue
//! first and only then sent to the authority, so going offline mid-way
//! never loses a visit.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cancel::CancelToken;
use crate::config::{RetryConfig, VerificationConfig};
use crate::event::SessionEvent;
use crate::geofence;
use crate::model::{
    ActionKind, ActionStatus, ClueId, MissionLocation, Outcome, PendingAction, Position, Rejection,
};
use crate::position::{FixOptions, PositionSource};
use crate::remote::{RemoteAuthority, TransportError};
use crate::retry::{self, Classification, RetryError, RetryPolicy};
use crate::storage::{Appended, Storage, StorageError};

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// One claim from the player.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifyRequest {
    pub mission_id: String,
    pub location: MissionLocation,
    pub action_kind: ActionKind,

    /// Decoded code, for code scans.
    pub proof: Option<String>,

    pub online: bool,
}

impl VerifyRequest {
    /// A claim of whatever action the location requires, without proof.
    pub fn new(mission_id: impl Into<String>, location: MissionLocation, online: bool) -> Self {
        Self {
            mission_id: mission_id.into(),
            action_kind: location.required_action_kind,
            location,
            proof: None,
            online,
        }
    }

    pub fn with_proof(mut self, proof: impl Into<String>) -> Self {
        self.proof = Some(proof.into());
        self
    }
}

/// Why a single submission attempt failed.
#[derive(Debug, thiserror::Error)]
enum SubmitError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("rejected by authority: {0}")]
    Rejected(String),
}

impl SubmitError {
    fn classify(&self) -> Classification {
        match self {
            Self::Transport(_) => Classification::Retryable,
            Self::Rejected(_) => Classification::Terminal,
        }
    }
}

pub struct ActionVerifier {
    storage: Arc<Storage>,
    positions: PositionSource,
    authority: Arc<dyn RemoteAuthority>,
    verification: VerificationConfig,
    retry: RetryConfig,
    events: broadcast::Sender<SessionEvent>,
    last_accepted_fix: Option<Position>,
}

impl ActionVerifier {
    pub fn new(
        storage: Arc<Storage>,
        positions: PositionSource,
        authority: Arc<dyn RemoteAuthority>,
        verification: VerificationConfig,
        retry: RetryConfig,
        events: broadcast::Sender<SessionEvent>,
    ) -> Self {
        Self {
            storage,
            positions,
            authority,
            verification,
            retry,
            events,
            last_accepted_fix: None,
        }
    }

    pub fn positions(&self) -> &PositionSource {
        &self.positions
    }

    pub fn last_accepted_fix(&self) -> Option<&Position> {
        self.last_accepted_fix.as_ref()
    }

    /// Runs one claim through the local gates, records it, and submits it
    /// when online.
    pub async fn verify(
        &mut self,
        request: VerifyRequest,
        cancel: CancelToken,
    ) -> Result<Outcome, VerifyError> {
        let location = &request.location;

        let (position, proof) = if request.action_kind == ActionKind::CodeScan {
            let Some(code) =
                matching_code(request.proof.as_deref(), location.expected_code.as_deref())
            else {
                return Ok(reject(location, Rejection::InvalidCode));
            };
            // The code is the proof. A fix is only attached for the record.
            let options = self.fix_options();
            let position = self
                .positions
                .current_fix(options, cancel.clone())
                .await
                .ok();
            (position, Some(code))
        } else {
            match self.check_position(location, cancel.clone()).await {
                Ok(position) => (Some(position), request.proof.clone()),
                Err(rejection) => return Ok(reject(location, rejection)),
            }
        };

        let action = PendingAction::new(
            &request.mission_id,
            &location.id,
            request.action_kind,
            position,
            proof,
        );
        let action = match self.storage.append_action(&action)? {
            Appended::New(action) => {
                debug!(action = %action.short_id(), location = %action.location_id, "action queued");
                self.emit(SessionEvent::status(&action));
                action
            }
            Appended::Existing(existing) => {
                info!(
                    action = %existing.short_id(),
                    location = %existing.location_id,
                    status = %existing.status,
                    "collapsed into pending action"
                );
                if existing.status == ActionStatus::Verifying {
                    return Ok(Outcome::Queued {
                        action_id: existing.id,
                    });
                }
                existing
            }
        };

        if !request.online {
            info!(location = %location.id, "offline, action left queued");
            return Ok(Outcome::Queued {
                action_id: action.id,
            });
        }
        self.submit(&action, cancel).await
    }

    /// Sends a queued action to the authority with retries.
    ///
    /// Used both right after `verify` and when replaying the queue. The
    /// action's captured position is sent as-is; nothing is re-sampled.
    pub async fn submit(
        &mut self,
        action: &PendingAction,
        cancel: CancelToken,
    ) -> Result<Outcome, VerifyError> {
        let id = action.id;
        let in_flight = self
            .storage
            .update_action_status(id, ActionStatus::Verifying)?;
        self.emit(SessionEvent::status(&in_flight));

        let storage = self.storage.clone();
        let authority = self.authority.clone();

        let result = retry::run(
            RetryPolicy::from(&self.retry),
            SubmitError::classify,
            cancel,
            |attempt| {
                debug!(action = %in_flight.short_id(), attempt, "submitting");
                if let Err(e) = storage.record_attempt(id) {
                    warn!(action = %in_flight.short_id(), attempt, error = %e, "failed to record attempt");
                }
            },
            || {
                let authority = authority.clone();
                let action = in_flight.clone();
                async move { submit_once(authority.as_ref(), &action).await }
            },
        )
        .await;

        match self.settle(&in_flight, result) {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                // Never leave the row in flight; a requeued row replays later.
                if let Err(requeue) = self.transition(id, ActionStatus::Queued) {
                    debug!(action = %in_flight.short_id(), error = %requeue, "could not requeue");
                }
                Err(e.into())
            }
        }
    }

    /// Records the authority's answer for an in-flight action.
    fn settle(
        &self,
        in_flight: &PendingAction,
        result: Result<Option<ClueId>, RetryError<SubmitError>>,
    ) -> Result<Outcome, StorageError> {
        let id = in_flight.id;
        let outcome = match result {
            Ok(clue_ref) => {
                self.finish(id, ActionStatus::Committed)?;
                info!(action = %in_flight.short_id(), ?clue_ref, "action committed");
                Outcome::Committed {
                    action_id: id,
                    clue_ref,
                }
            }
            Err(RetryError::Terminal(SubmitError::Rejected(reason))) => {
                self.finish(id, ActionStatus::Rejected)?;
                info!(action = %in_flight.short_id(), %reason, "action rejected by authority");
                Outcome::Rejected(Rejection::ServerRejected { reason })
            }
            Err(RetryError::Cancelled { .. }) => {
                self.transition(id, ActionStatus::Queued)?;
                debug!(action = %in_flight.short_id(), "submission cancelled, left queued");
                Outcome::Queued { action_id: id }
            }
            // Transport failures always classify as retryable; the terminal
            // pattern only completes the match.
            Err(
                e @ (RetryError::MaxRetriesExceeded { .. }
                | RetryError::Terminal(SubmitError::Transport(_))),
            ) => {
                // The stored count lags when attempts could not be recorded.
                let attempts = self
                    .storage
                    .load_action(id)?
                    .attempt_count
                    .max(in_flight.attempt_count.saturating_add(e.attempts()));
                if attempts >= self.retry.abandon_after_attempts {
                    self.transition(id, ActionStatus::Abandoned)?;
                    warn!(action = %in_flight.short_id(), attempts, error = %e, "action abandoned");
                    Outcome::Abandoned {
                        action_id: id,
                        attempts,
                    }
                } else {
                    self.transition(id, ActionStatus::Queued)?;
                    info!(action = %in_flight.short_id(), attempts, error = %e, "submission failed, will retry");
                    Outcome::PendingRetry {
                        action_id: id,
                        attempts,
                    }
                }
            }
        };
        Ok(outcome)
    }

    /// Acquires a fix and applies the accuracy, movement, and geofence gates.
    async fn check_position(
        &mut self,
        location: &MissionLocation,
        cancel: CancelToken,
    ) -> Result<Position, Rejection> {
        let options = self.fix_options();
        let position = self
            .positions
            .current_fix(options, cancel)
            .await
            .map_err(|e| {
                debug!(error = %e, "no usable fix");
                Rejection::PositionUnavailable
            })?;

        let threshold = self.verification.trust_threshold_meters;
        if position.accuracy_meters > threshold {
            return Err(Rejection::PositionInaccurate {
                accuracy_meters: position.accuracy_meters,
                threshold_meters: threshold,
            });
        }

        if let Some(previous) = self.last_accepted_fix
            && previous.captured_at != position.captured_at
        {
            let movement = geofence::check_movement(
                &previous,
                &position,
                self.verification.max_travel_speed_mps,
            )
            .map_err(invalid_fix)?;
            if !movement.plausible {
                return Err(Rejection::ImplausibleMovement {
                    speed_mps: movement.speed_mps,
                });
            }
        }

        let check = geofence::is_within(&position, location).map_err(invalid_fix)?;
        if !check.within {
            return Err(Rejection::OutOfGeofence {
                distance_meters: check.distance_meters,
                radius_meters: check.radius_meters,
            });
        }

        self.last_accepted_fix = Some(position);
        Ok(position)
    }

    /// Moves an action to a terminal answer and drops it from the queue.
    fn finish(&self, id: Uuid, status: ActionStatus) -> Result<(), StorageError> {
        self.transition(id, status)?;
        self.storage.remove_action(id)
    }

    fn transition(&self, id: Uuid, status: ActionStatus) -> Result<(), StorageError> {
        let action = self.storage.update_action_status(id, status)?;
        self.emit(SessionEvent::status(&action));
        Ok(())
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn fix_options(&self) -> FixOptions {
        FixOptions::from(&self.verification)
    }
}

async fn submit_once(
    authority: &dyn RemoteAuthority,
    action: &PendingAction,
) -> Result<Option<ClueId>, SubmitError> {
    let response = match (action.action_kind, action.proof.as_deref()) {
        (ActionKind::CodeScan, Some(code)) => {
            authority
                .submit_code_match(&action.location_id, code)
                .await?
        }
        _ => {
            authority
                .submit_visit(
                    &action.location_id,
                    action.action_kind,
                    action.captured_position.as_ref(),
                )
                .await?
        }
    };

    if response.accepted {
        Ok(response.clue_ref)
    } else {
        Err(SubmitError::Rejected(
            response
                .rejection_reason
                .unwrap_or_else(|| "claim not accepted".to_string()),
        ))
    }
}

/// The trimmed code, if it matches what the location expects.
fn matching_code(proof: Option<&str>, expected: Option<&str>) -> Option<String> {
    let proof = proof?.trim();
    let expected = expected?.trim();
    (!proof.is_empty() && proof == expected).then(|| proof.to_string())
}

fn invalid_fix(e: geofence::GeofenceError) -> Rejection {
    warn!(error = %e, "fix has invalid coordinates");
    Rejection::PositionUnavailable
}

fn reject(location: &MissionLocation, rejection: Rejection) -> Outcome {
    info!(location = %location.id, %rejection, "claim rejected locally");
    Outcome::Rejected(rejection)
}

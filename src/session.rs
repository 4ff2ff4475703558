//! Mission session: the single writer for one player's mission attempt.
//!
//! Commands from the UI and connectivity transitions are handled one at a
//! time by [`MissionSession::run`], so the queue, the progress snapshot,
//! and the unlock state never see concurrent mutation. Observers follow
//! along through a broadcast of [`SessionEvent`]s.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cancel::CancelSource;
use crate::config::Config;
use crate::connectivity::{ConnectivityMonitor, Transition};
use crate::event::SessionEvent;
use crate::model::{
    ActionKind, ActionStatus, Clue, ClueId, Mission, MissionLocation, Outcome, Position,
    ProgressSnapshot, Rejection,
};
use crate::position::{PositionError, PositionSource, PositioningCapability, WatchHandle};
use crate::remote::RemoteAuthority;
use crate::scan::CodeDecoder;
use crate::storage::{Appended, Storage, StorageError};
use crate::unlock;
use crate::verifier::{ActionVerifier, VerifyError, VerifyRequest};

const COMMAND_BUFFER: usize = 32;
const EVENT_BUFFER: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("unknown location: {0}")]
    UnknownLocation(String),

    #[error("action {action} belongs to mission {mission}")]
    ForeignAction { action: Uuid, mission: String },

    #[error("session has been torn down")]
    TornDown,

    #[error("session is no longer running")]
    Closed,

    #[error(transparent)]
    Verify(#[from] VerifyError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

type Reply<T> = oneshot::Sender<Result<T, SessionError>>;

/// Requests handled by the session loop.
#[derive(Debug)]
pub enum SessionCommand {
    Verify {
        location_id: String,
        /// Overrides the location's required action, e.g. for code scans.
        kind: Option<ActionKind>,
        proof: Option<String>,
        reply: Reply<Outcome>,
    },
    AdvanceStage {
        stage: u32,
        reply: Reply<BTreeSet<ClueId>>,
    },
    RecordPhoto {
        location_id: String,
        reply: Reply<BTreeSet<ClueId>>,
    },
    RetryAbandoned {
        action_id: Uuid,
        reply: Reply<Outcome>,
    },
    Teardown,
}

pub struct MissionSession {
    mission: Mission,
    storage: Arc<Storage>,
    verifier: ActionVerifier,
    connectivity: ConnectivityMonitor,
    progress: ProgressSnapshot,
    events: broadcast::Sender<SessionEvent>,
    commands: mpsc::Receiver<SessionCommand>,
    cancel: Arc<CancelSource>,
    fix_timeout: Duration,
}

impl MissionSession {
    /// Builds a session and the handle used to talk to it once it runs.
    ///
    /// Actions left mid-flight by a previous process go back in the queue,
    /// and stored progress for the mission is picked up.
    pub fn new(
        mission: Mission,
        storage: Arc<Storage>,
        capability: Arc<dyn PositioningCapability>,
        authority: Arc<dyn RemoteAuthority>,
        connectivity: ConnectivityMonitor,
        config: &Config,
    ) -> Result<(Self, SessionHandle), SessionError> {
        let requeued = storage.requeue_interrupted(&mission.id)?;
        if requeued > 0 {
            info!(requeued, "requeued interrupted actions");
        }
        let progress = storage.load_progress(&mission.id)?;

        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let (tx, commands) = mpsc::channel(COMMAND_BUFFER);
        let cancel = Arc::new(CancelSource::new());

        let verifier = ActionVerifier::new(
            storage.clone(),
            PositionSource::new(capability),
            authority,
            config.verification.clone(),
            config.retry.clone(),
            events.clone(),
        );

        let handle = SessionHandle {
            commands: tx,
            events: events.clone(),
            cancel: cancel.clone(),
        };
        let session = Self {
            mission,
            storage,
            verifier,
            connectivity,
            progress,
            events,
            commands,
            cancel,
            fix_timeout: config.verification.fix_timeout(),
        };
        Ok((session, handle))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// A copy of the current progress.
    pub fn progress(&self) -> ProgressSnapshot {
        self.progress.clone()
    }

    pub fn revealed_clues(&self) -> Vec<&Clue> {
        unlock::revealed(&self.mission.clues, &self.progress)
    }

    pub fn locked_count(&self) -> usize {
        unlock::locked_count(&self.mission.clues, &self.progress)
    }

    /// Processes commands and connectivity changes until torn down.
    ///
    /// Drains the queue at startup when already online, and again on every
    /// transition to online.
    pub async fn run(mut self) -> Result<(), SessionError> {
        info!(mission = %self.mission.id, "session started");
        self.commit_progress()?;
        if self.connectivity.is_online() {
            self.replay_logged().await;
        }

        let mut cancelled = self.cancel.token();
        let mut signal_open = true;
        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    let Some(command) = command else {
                        debug!("all session handles dropped");
                        break;
                    };
                    if !self.dispatch(command).await {
                        break;
                    }
                }
                transition = self.connectivity.next_transition(), if signal_open => {
                    match transition {
                        Some(Transition::CameOnline) => self.replay_logged().await,
                        Some(Transition::WentOffline) => {}
                        None => {
                            debug!("connectivity signal closed");
                            signal_open = false;
                        }
                    }
                }
                () = cancelled.cancelled() => break,
            }
        }

        self.teardown();
        Ok(())
    }

    /// Returns false when the loop should stop.
    async fn dispatch(&mut self, command: SessionCommand) -> bool {
        match command {
            SessionCommand::Verify {
                location_id,
                kind,
                proof,
                reply,
            } => {
                let result = self.verify_as(&location_id, kind, proof).await;
                let _ = reply.send(result);
            }
            SessionCommand::AdvanceStage { stage, reply } => {
                let _ = reply.send(self.advance_stage(stage));
            }
            SessionCommand::RecordPhoto { location_id, reply } => {
                let _ = reply.send(self.record_photo(&location_id));
            }
            SessionCommand::RetryAbandoned { action_id, reply } => {
                let _ = reply.send(self.retry_abandoned(action_id).await);
            }
            SessionCommand::Teardown => return false,
        }
        true
    }

    /// Claims the action a location requires.
    pub async fn verify(
        &mut self,
        location_id: &str,
        proof: Option<String>,
    ) -> Result<Outcome, SessionError> {
        self.verify_as(location_id, None, proof).await
    }

    /// Decodes `frame` and claims a code scan at the location.
    ///
    /// An unreadable frame is rejected like a wrong code.
    pub async fn scan_code(
        &mut self,
        location_id: &str,
        decoder: &dyn CodeDecoder,
        frame: &[u8],
    ) -> Result<Outcome, SessionError> {
        let Some(code) = decoder.decode(frame) else {
            debug!(location = location_id, "no code in frame");
            return Ok(Outcome::Rejected(Rejection::InvalidCode));
        };
        self.verify_as(location_id, Some(ActionKind::CodeScan), Some(code))
            .await
    }

    async fn verify_as(
        &mut self,
        location_id: &str,
        kind: Option<ActionKind>,
        proof: Option<String>,
    ) -> Result<Outcome, SessionError> {
        self.ensure_live()?;
        let location = self.location(location_id)?.clone();
        let mut request = VerifyRequest::new(
            &self.mission.id,
            location,
            self.connectivity.is_online(),
        );
        if let Some(kind) = kind {
            request.action_kind = kind;
        }
        request.proof = proof;
        let action_kind = request.action_kind;

        let outcome = self.verifier.verify(request, self.cancel.token()).await?;
        self.apply_outcome(location_id, action_kind, &outcome)?;
        Ok(outcome)
    }

    /// Moves the mission to `stage` and returns newly unlocked clues.
    pub fn advance_stage(&mut self, stage: u32) -> Result<BTreeSet<ClueId>, SessionError> {
        self.ensure_live()?;
        if !self.progress.advance_stage(stage) {
            debug!(
                stage,
                current = self.progress.current_stage,
                "ignoring backwards stage change"
            );
            return Ok(BTreeSet::new());
        }
        info!(stage, "stage advanced");
        self.commit_progress()
    }

    pub fn record_photo(&mut self, location_id: &str) -> Result<BTreeSet<ClueId>, SessionError> {
        self.ensure_live()?;
        self.location(location_id)?;
        self.progress.record_photo(location_id);
        self.commit_progress()
    }

    /// Gives an abandoned action another go.
    ///
    /// It re-enters the queue with its original position and submission
    /// time, and is sent right away when online.
    pub async fn retry_abandoned(&mut self, action_id: Uuid) -> Result<Outcome, SessionError> {
        self.ensure_live()?;
        let owner = self.storage.load_action(action_id)?.mission_id;
        if owner != self.mission.id {
            return Err(SessionError::ForeignAction {
                action: action_id,
                mission: owner,
            });
        }
        let action = match self.storage.replace_abandoned(action_id)? {
            Appended::New(action) => {
                info!(old = %action_id, new = %action.short_id(), "abandoned action requeued");
                let _ = self.events.send(SessionEvent::status(&action));
                action
            }
            Appended::Existing(existing) => existing,
        };

        if !self.connectivity.is_online() || action.status != ActionStatus::Queued {
            return Ok(Outcome::Queued {
                action_id: action.id,
            });
        }
        let outcome = self.verifier.submit(&action, self.cancel.token()).await?;
        self.apply_outcome(&action.location_id, action.action_kind, &outcome)?;
        Ok(outcome)
    }

    /// Submits every queued action once, oldest first.
    pub async fn drain_queue(&mut self) -> Result<Vec<Outcome>, SessionError> {
        self.ensure_live()?;
        let queued = self.storage.list_queued_actions(&self.mission.id)?;
        if queued.is_empty() {
            return Ok(Vec::new());
        }
        info!(count = queued.len(), "replaying queued actions");

        let mut outcomes = Vec::with_capacity(queued.len());
        for action in queued {
            if self.cancel.is_cancelled() {
                break;
            }
            let outcome = self.verifier.submit(&action, self.cancel.token()).await?;
            self.apply_outcome(&action.location_id, action.action_kind, &outcome)?;
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    /// Subscribes to position updates for as long as the session lives.
    pub fn watch_position<F>(&self, interval: Duration, callback: F) -> WatchHandle
    where
        F: FnMut(Result<Position, PositionError>) + Send + 'static,
    {
        self.verifier
            .positions()
            .watch(interval, self.fix_timeout, self.cancel.token(), callback)
    }

    /// Stops position subscriptions and pending backoff. Idempotent.
    pub fn teardown(&mut self) {
        if !self.cancel.is_cancelled() {
            info!(mission = %self.mission.id, "session torn down");
        }
        self.cancel.cancel();
    }

    async fn replay_logged(&mut self) {
        if let Err(e) = self.drain_queue().await {
            warn!(error = %e, "queue replay failed");
        }
    }

    /// Folds a verification result into progress and tells observers.
    fn apply_outcome(
        &mut self,
        location_id: &str,
        kind: ActionKind,
        outcome: &Outcome,
    ) -> Result<(), SessionError> {
        let _ = self.events.send(SessionEvent::Outcome {
            location_id: location_id.to_string(),
            outcome: outcome.clone(),
        });
        if matches!(outcome, Outcome::Committed { .. }) {
            self.progress.record_visit(location_id, kind);
            self.commit_progress()?;
        }
        Ok(())
    }

    /// Unlocks whatever now qualifies, persists, and reports the delta.
    fn commit_progress(&mut self) -> Result<BTreeSet<ClueId>, SessionError> {
        let delta = unlock::evaluate(&self.mission.clues, &self.progress);
        self.progress.mark_unlocked(&delta);
        self.progress = self.storage.save_progress(&self.mission.id, &self.progress)?;

        if !delta.is_empty() {
            info!(mission = %self.mission.id, clues = ?delta, "clues unlocked");
            let _ = self.events.send(SessionEvent::CluesUnlocked {
                mission_id: self.mission.id.clone(),
                clue_ids: delta.clone(),
            });
        }
        Ok(delta)
    }

    fn location(&self, id: &str) -> Result<&MissionLocation, SessionError> {
        self.mission
            .location(id)
            .ok_or_else(|| SessionError::UnknownLocation(id.to_string()))
    }

    fn ensure_live(&self) -> Result<(), SessionError> {
        if self.cancel.is_cancelled() {
            return Err(SessionError::TornDown);
        }
        Ok(())
    }
}

/// Cloneable handle for sending commands to a running session.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    events: broadcast::Sender<SessionEvent>,
    cancel: Arc<CancelSource>,
}

impl SessionHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub async fn verify(
        &self,
        location_id: impl Into<String>,
        proof: Option<String>,
    ) -> Result<Outcome, SessionError> {
        let location_id = location_id.into();
        self.request(|reply| SessionCommand::Verify {
            location_id,
            kind: None,
            proof,
            reply,
        })
        .await
    }

    /// Decodes on the caller's side and sends only the code text.
    pub async fn scan_code(
        &self,
        location_id: impl Into<String>,
        decoder: &dyn CodeDecoder,
        frame: &[u8],
    ) -> Result<Outcome, SessionError> {
        let Some(code) = decoder.decode(frame) else {
            return Ok(Outcome::Rejected(Rejection::InvalidCode));
        };
        let location_id = location_id.into();
        self.request(|reply| SessionCommand::Verify {
            location_id,
            kind: Some(ActionKind::CodeScan),
            proof: Some(code),
            reply,
        })
        .await
    }

    pub async fn advance_stage(&self, stage: u32) -> Result<BTreeSet<ClueId>, SessionError> {
        self.request(|reply| SessionCommand::AdvanceStage { stage, reply })
            .await
    }

    pub async fn record_photo(
        &self,
        location_id: impl Into<String>,
    ) -> Result<BTreeSet<ClueId>, SessionError> {
        let location_id = location_id.into();
        self.request(|reply| SessionCommand::RecordPhoto { location_id, reply })
            .await
    }

    pub async fn retry_abandoned(&self, action_id: Uuid) -> Result<Outcome, SessionError> {
        self.request(|reply| SessionCommand::RetryAbandoned { action_id, reply })
            .await
    }

    /// Cancels in-progress waits right away, then stops the loop.
    ///
    /// A remote call already in flight still completes and its result is
    /// applied before the loop exits.
    pub async fn teardown(&self) {
        self.cancel.cancel();
        let _ = self.commands.send(SessionCommand::Teardown).await;
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(Reply<T>) -> SessionCommand,
    ) -> Result<T, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::sync::watch;
    use tokio::time::timeout;

    use crate::config::{RetryConfig, VerificationConfig};
    use crate::model::{PendingAction, UnlockCondition};
    use crate::position::fake::FakeCapability;
    use crate::remote::fake::{ScriptedAuthority, Submission};
    use crate::scan::PlainTextDecoder;
    use crate::verifier::tests::{bridge, fix_near_library, library};

    fn clue(id: &str, order: u32, condition: UnlockCondition) -> Clue {
        Clue {
            id: id.into(),
            text: format!("clue {id}"),
            media_ref: None,
            unlock_condition: condition,
            reveal_order: order,
        }
    }

    fn mission() -> Mission {
        Mission {
            id: "m1".into(),
            title: "Campus walk".into(),
            locations: vec![library(), bridge()],
            clues: vec![
                clue("at-library", 1, UnlockCondition::LocationReached("library".into())),
                clue("bridge-code", 2, UnlockCondition::CodeScanned("bridge".into())),
                clue("stage-two", 3, UnlockCondition::StageCompleted(2)),
                clue("library-photo", 4, UnlockCondition::PhotoTaken("library".into())),
            ],
        }
    }

    fn config() -> Config {
        Config {
            verification: VerificationConfig {
                fix_max_age_ms: 0,
                ..VerificationConfig::default()
            },
            ..Config::default()
        }
    }

    struct Harness {
        session: MissionSession,
        handle: SessionHandle,
        storage: Arc<Storage>,
        authority: Arc<ScriptedAuthority>,
    }

    fn harness_with(
        storage: Arc<Storage>,
        authority: ScriptedAuthority,
        connectivity: ConnectivityMonitor,
        config: &Config,
    ) -> Harness {
        let authority = Arc::new(authority);
        let capability = Arc::new(FakeCapability::fixed(fix_near_library(5.0, 10.0)));
        let (session, handle) = MissionSession::new(
            mission(),
            storage.clone(),
            capability,
            authority.clone(),
            connectivity,
            config,
        )
        .unwrap();
        Harness {
            session,
            handle,
            storage,
            authority,
        }
    }

    fn harness(authority: ScriptedAuthority, online: bool) -> Harness {
        harness_with(
            Arc::new(Storage::in_memory().unwrap()),
            authority,
            ConnectivityMonitor::fixed(online),
            &config(),
        )
    }

    async fn next_outcome(events: &mut broadcast::Receiver<SessionEvent>) -> Outcome {
        loop {
            let event = timeout(Duration::from_secs(60), events.recv())
                .await
                .unwrap()
                .unwrap();
            if let SessionEvent::Outcome { outcome, .. } = event {
                return outcome;
            }
        }
    }

    fn unlocked_events(events: &mut broadcast::Receiver<SessionEvent>) -> Vec<BTreeSet<ClueId>> {
        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let SessionEvent::CluesUnlocked { clue_ids, .. } = event {
                seen.push(clue_ids);
            }
        }
        seen
    }

    fn ids(list: &[&str]) -> BTreeSet<ClueId> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn offline_check_in_commits_once_on_reconnect() {
        let (signal, rx) = watch::channel(false);
        let h = harness_with(
            Arc::new(Storage::in_memory().unwrap()),
            ScriptedAuthority::accepting(),
            ConnectivityMonitor::new(rx),
            &config(),
        );
        let mut events = h.handle.subscribe();
        let task = tokio::spawn(h.session.run());

        let outcome = h.handle.verify("library", None).await.unwrap();
        assert!(matches!(outcome, Outcome::Queued { .. }));
        assert_eq!(h.authority.calls(), 0);

        signal.send(true).unwrap();
        let first = next_outcome(&mut events).await;
        assert!(matches!(first, Outcome::Queued { .. }));
        let replayed = next_outcome(&mut events).await;
        assert!(matches!(replayed, Outcome::Committed { .. }));

        assert_eq!(h.authority.calls(), 1);
        assert!(h.storage.list_actions().unwrap().is_empty());
        let progress = h.storage.load_progress("m1").unwrap();
        assert!(progress.completed_location_ids.contains("library"));
        assert!(progress.unlocked_clue_ids.contains("at-library"));

        h.handle.teardown().await;
        task.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn stage_clue_is_reported_exactly_once() {
        let mut h = harness(ScriptedAuthority::accepting(), true);
        let mut events = h.session.subscribe();

        assert!(h.session.advance_stage(1).unwrap().is_empty());
        assert_eq!(h.session.advance_stage(2).unwrap(), ids(&["stage-two"]));
        assert!(h.session.advance_stage(2).unwrap().is_empty());
        assert!(h.session.advance_stage(1).unwrap().is_empty());

        assert_eq!(unlocked_events(&mut events), vec![ids(&["stage-two"])]);
        assert_eq!(h.session.progress().current_stage, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn committed_scan_unlocks_code_clue() {
        let mut h = harness(ScriptedAuthority::accepting(), true);

        let outcome = h
            .session
            .scan_code("bridge", &PlainTextDecoder, b"BRIDGE-42")
            .await
            .unwrap();

        assert!(matches!(outcome, Outcome::Committed { .. }));
        assert!(h.session.progress().unlocked_clue_ids.contains("bridge-code"));
        let revealed: Vec<_> = h.session.revealed_clues().iter().map(|c| c.id.clone()).collect();
        assert_eq!(revealed, vec!["bridge-code"]);
        assert_eq!(h.session.locked_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn unreadable_frame_is_invalid_code() {
        let mut h = harness(ScriptedAuthority::accepting(), true);

        let outcome = h
            .session
            .scan_code("bridge", &PlainTextDecoder, b"   ")
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Rejected(Rejection::InvalidCode));
        assert_eq!(h.authority.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn photo_unlocks_photo_clue() {
        let mut h = harness(ScriptedAuthority::accepting(), true);

        assert_eq!(
            h.session.record_photo("library").unwrap(),
            ids(&["library-photo"])
        );
        assert!(matches!(
            h.session.record_photo("nowhere"),
            Err(SessionError::UnknownLocation(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn drain_replays_in_submission_order() {
        let mut h = harness(ScriptedAuthority::accepting(), false);

        h.session.verify("library", None).await.unwrap();
        h.session
            .verify("bridge", Some("BRIDGE-42".into()))
            .await
            .unwrap();

        let outcomes = h.session.drain_queue().await.unwrap();
        assert_eq!(outcomes.len(), 2);
        let order: Vec<_> = h
            .authority
            .submissions()
            .into_iter()
            .map(|s| match s {
                Submission::Visit { location_id, .. } | Submission::Code { location_id, .. } => {
                    location_id
                }
            })
            .collect();
        assert_eq!(order, vec!["library", "bridge"]);
        assert!(h.storage.list_actions().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_during_backoff_leaves_action_queued() {
        let h = harness(ScriptedAuthority::unreachable(), true);
        let task = tokio::spawn(h.session.run());

        let handle = h.handle.clone();
        let pending = tokio::spawn(async move { handle.verify("library", None).await });

        // First attempt fails at once; the loop is now waiting out the backoff.
        tokio::time::sleep(Duration::from_millis(500)).await;
        h.handle.teardown().await;

        let outcome = pending.await.unwrap().unwrap();
        let Outcome::Queued { action_id } = outcome else {
            panic!("expected Queued, got {outcome:?}");
        };
        assert_eq!(h.authority.calls(), 1);
        assert_eq!(
            h.storage.load_action(action_id).unwrap().status,
            ActionStatus::Queued
        );
        task.await.unwrap().unwrap();

        assert!(matches!(
            h.handle.advance_stage(3).await,
            Err(SessionError::Closed)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_call_is_applied_after_teardown() {
        let h = harness(
            ScriptedAuthority::accepting().with_latency(Duration::from_secs(5)),
            true,
        );
        let task = tokio::spawn(h.session.run());

        let handle = h.handle.clone();
        let pending = tokio::spawn(async move { handle.verify("library", None).await });

        tokio::time::sleep(Duration::from_secs(1)).await;
        h.handle.teardown().await;

        let outcome = pending.await.unwrap().unwrap();
        assert!(matches!(outcome, Outcome::Committed { .. }));
        task.await.unwrap().unwrap();
        let progress = h.storage.load_progress("m1").unwrap();
        assert!(progress.completed_location_ids.contains("library"));
    }

    #[tokio::test(start_paused = true)]
    async fn torn_down_session_refuses_work() {
        let mut h = harness(ScriptedAuthority::accepting(), true);
        h.session.teardown();

        assert!(matches!(
            h.session.verify("library", None).await,
            Err(SessionError::TornDown)
        ));
        assert!(matches!(
            h.session.advance_stage(1),
            Err(SessionError::TornDown)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_stops_position_watch() {
        let mut h = harness(ScriptedAuthority::accepting(), true);
        let watch = h.session.watch_position(Duration::from_secs(1), |_| {});

        h.session.teardown();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(watch.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_action_can_be_retried() {
        let config = Config {
            retry: RetryConfig {
                abandon_after_attempts: 3,
                ..RetryConfig::default()
            },
            ..config()
        };
        let mut h = harness_with(
            Arc::new(Storage::in_memory().unwrap()),
            ScriptedAuthority::unreachable(),
            ConnectivityMonitor::fixed(true),
            &config,
        );

        let outcome = h.session.verify("library", None).await.unwrap();
        let Outcome::Abandoned { action_id, attempts } = outcome else {
            panic!("expected Abandoned, got {outcome:?}");
        };
        assert_eq!(attempts, 3);
        let original = h.storage.load_action(action_id).unwrap();

        h.authority.set_fallback(Ok(crate::remote::AuthorityResponse::accepted(None)));
        let outcome = h.session.retry_abandoned(action_id).await.unwrap();

        assert!(matches!(outcome, Outcome::Committed { .. }));
        assert!(h.storage.list_actions().unwrap().is_empty());
        let Some(Submission::Visit { position, .. }) = h.authority.submissions().pop() else {
            panic!("expected a visit submission");
        };
        assert_eq!(position, original.captured_position);
    }

    #[tokio::test(start_paused = true)]
    async fn progress_carries_over_to_next_session() {
        let storage = Arc::new(Storage::in_memory().unwrap());
        {
            let mut h = harness_with(
                storage.clone(),
                ScriptedAuthority::accepting(),
                ConnectivityMonitor::fixed(true),
                &config(),
            );
            h.session.verify("library", None).await.unwrap();
        }

        let h = harness_with(
            storage,
            ScriptedAuthority::accepting(),
            ConnectivityMonitor::fixed(true),
            &config(),
        );
        assert!(h.session.progress().unlocked_clue_ids.contains("at-library"));
        assert_eq!(h.session.revealed_clues().len(), 1);
    }

    fn other_mission_visit(storage: &Storage) -> PendingAction {
        let action = PendingAction::new(
            "m2",
            "library",
            ActionKind::CheckIn,
            Some(fix_near_library(5.0, 10.0)),
            None,
        );
        storage.append_action(&action).unwrap();
        action
    }

    #[tokio::test(start_paused = true)]
    async fn drain_leaves_other_missions_alone() {
        let mut h = harness(ScriptedAuthority::accepting(), true);
        let theirs = other_mission_visit(&h.storage);

        let outcomes = h.session.drain_queue().await.unwrap();

        assert!(outcomes.is_empty());
        assert_eq!(h.authority.calls(), 0);
        assert!(h.session.progress().unlocked_clue_ids.is_empty());
        assert_eq!(h.storage.list_queued_actions("m2").unwrap(), vec![theirs]);
        assert!(h.storage.load_progress("m2").unwrap().unlocked_clue_ids.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn startup_leaves_other_missions_in_flight() {
        let storage = Arc::new(Storage::in_memory().unwrap());
        let theirs = other_mission_visit(&storage);
        storage
            .update_action_status(theirs.id, ActionStatus::Verifying)
            .unwrap();

        let h = harness_with(
            storage,
            ScriptedAuthority::accepting(),
            ConnectivityMonitor::fixed(true),
            &config(),
        );
        assert_eq!(
            h.storage.load_action(theirs.id).unwrap().status,
            ActionStatus::Verifying
        );
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_action_of_other_mission_is_refused() {
        let mut h = harness(ScriptedAuthority::accepting(), true);
        let theirs = other_mission_visit(&h.storage);
        h.storage
            .update_action_status(theirs.id, ActionStatus::Verifying)
            .unwrap();
        h.storage
            .update_action_status(theirs.id, ActionStatus::Abandoned)
            .unwrap();

        let err = h.session.retry_abandoned(theirs.id).await.unwrap_err();

        assert!(matches!(
            err,
            SessionError::ForeignAction { ref mission, .. } if mission == "m2"
        ));
        assert_eq!(h.authority.calls(), 0);
        assert_eq!(
            h.storage.load_action(theirs.id).unwrap().status,
            ActionStatus::Abandoned
        );
    }

    #[tokio::test(start_paused = true)]
    async fn interrupted_actions_replay_on_startup() {
        let storage = Arc::new(Storage::in_memory().unwrap());
        let action = PendingAction::new(
            "m1",
            "library",
            ActionKind::CheckIn,
            Some(fix_near_library(5.0, 10.0)),
            None,
        );
        storage.append_action(&action).unwrap();
        storage
            .update_action_status(action.id, ActionStatus::Verifying)
            .unwrap();

        let h = harness_with(
            storage,
            ScriptedAuthority::accepting(),
            ConnectivityMonitor::fixed(true),
            &config(),
        );
        assert_eq!(h.storage.list_queued_actions("m1").unwrap().len(), 1);

        let mut events = h.handle.subscribe();
        let task = tokio::spawn(h.session.run());
        let outcome = next_outcome(&mut events).await;
        assert!(matches!(outcome, Outcome::Committed { .. }));

        h.handle.teardown().await;
        task.await.unwrap().unwrap();
        assert!(h.storage.list_actions().unwrap().is_empty());
    }
}

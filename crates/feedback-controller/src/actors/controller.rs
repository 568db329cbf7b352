//! `SessionControllerActor` - singleton supervisor for session actors.
//!
//! The controller is the top-level actor:
//!
//! - Maps seed-derived session ids to live `SessionActor` instances
//! - Owns session creation and teardown, including the cascade on end
//! - Arms and disarms the expiration scheduler; the expired-timer path
//!   and the explicit-end path converge on the same `EndSession` handler
//! - Broadcasts the terminal `SessionEnded` event and closes the
//!   session's channel
//! - Owns the root `CancellationToken` for graceful shutdown

use crate::actors::messages::{ControllerMessage, ControllerStatus, SessionPhase, SessionState};
use crate::actors::metrics::{ActorMetrics, ActorType, MailboxMonitor};
use crate::actors::session::{SessionActor, SessionActorHandle, SessionParams};
use crate::config::Config;
use crate::errors::FcError;
use crate::events::{EventHub, SessionEvent};
use crate::ident;
use crate::scheduler::ExpirationScheduler;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Default channel buffer size for the controller mailbox.
const CONTROLLER_CHANNEL_BUFFER: usize = 1000;

/// Handle to the `SessionControllerActor`.
///
/// This is the public interface for interacting with the controller.
/// All methods are async and return results via oneshot channels.
#[derive(Clone)]
pub struct SessionControllerActorHandle {
    sender: mpsc::Sender<ControllerMessage>,
    cancel_token: CancellationToken,
}

impl SessionControllerActorHandle {
    /// Create a new `SessionControllerActor` and return a handle to it.
    ///
    /// This spawns the actor task and returns immediately.
    #[must_use]
    pub fn new(
        config: Config,
        hub: Arc<EventHub>,
        scheduler: Arc<ExpirationScheduler>,
        metrics: Arc<ActorMetrics>,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(CONTROLLER_CHANNEL_BUFFER);
        let cancel_token = CancellationToken::new();

        let actor = SessionControllerActor::new(
            config,
            sender.clone(),
            receiver,
            cancel_token.clone(),
            hub,
            scheduler,
            metrics,
        );

        tokio::spawn(actor.run());

        Self {
            sender,
            cancel_token,
        }
    }

    /// Create a session from a seed.
    ///
    /// Without `owner_identity` the seed holder is the owner: the
    /// creator id is the seed-derived session id itself.
    pub async fn create_session(
        &self,
        seed: String,
        owner_identity: Option<String>,
        premium: bool,
    ) -> Result<SessionState, FcError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(ControllerMessage::CreateSession {
                seed,
                owner_identity,
                premium,
                respond_to: tx,
            })
            .await
            .map_err(|e| FcError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| FcError::Internal(format!("response receive failed: {e}")))?
    }

    /// Find a session by its creation seed.
    pub async fn find_session(&self, seed: &str) -> Result<SessionState, FcError> {
        let session_id = ident::derive_id(seed)?;
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(ControllerMessage::FindSession {
                session_id,
                respond_to: tx,
            })
            .await
            .map_err(|e| FcError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| FcError::Internal(format!("response receive failed: {e}")))?
    }

    /// Find a session by its opaque invite token.
    pub async fn find_by_add_link(&self, add_link: String) -> Result<SessionState, FcError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(ControllerMessage::FindByAddLink {
                add_link,
                respond_to: tx,
            })
            .await
            .map_err(|e| FcError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| FcError::Internal(format!("response receive failed: {e}")))?
    }

    /// Get the actor handle for a session, for room-level operations.
    pub async fn session(&self, seed: &str) -> Result<SessionActorHandle, FcError> {
        self.session_by_id(ident::derive_id(seed)?).await
    }

    /// Get the actor handle for a session by id.
    pub async fn session_by_id(&self, session_id: String) -> Result<SessionActorHandle, FcError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(ControllerMessage::GetSession {
                session_id,
                respond_to: tx,
            })
            .await
            .map_err(|e| FcError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| FcError::Internal(format!("response receive failed: {e}")))?
    }

    /// End a session: cascade-delete its subgraph, disarm its timer and
    /// broadcast `SessionEnded`. Session owner only.
    pub async fn end_session(&self, seed: &str, caller: String) -> Result<SessionState, FcError> {
        let session_id = ident::derive_id(seed)?;
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(ControllerMessage::EndSession {
                session_id,
                caller: Some(caller),
                respond_to: tx,
            })
            .await
            .map_err(|e| FcError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| FcError::Internal(format!("response receive failed: {e}")))?
    }

    /// Get the current controller status.
    pub async fn get_status(&self) -> Result<ControllerStatus, FcError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(ControllerMessage::GetStatus { respond_to: tx })
            .await
            .map_err(|e| FcError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| FcError::Internal(format!("response receive failed: {e}")))
    }

    /// Initiate graceful shutdown.
    pub async fn shutdown(&self) -> Result<(), FcError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(ControllerMessage::Shutdown { respond_to: tx })
            .await
            .map_err(|e| FcError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| FcError::Internal(format!("response receive failed: {e}")))
    }

    /// Cancel the actor (for immediate shutdown).
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Check if the actor is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Get a child token tied to the controller's lifetime.
    #[must_use]
    pub fn child_token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }
}

/// Internal state for a managed session.
struct ManagedSession {
    /// Handle to the session actor.
    handle: SessionActorHandle,
    /// Join handle for monitoring the actor task.
    task_handle: JoinHandle<()>,
    /// Owner identity, for authorization without querying the actor.
    creator_id: String,
    /// Invite token, for index cleanup.
    add_link: String,
    /// Whether an expiration timer was armed for this session.
    has_timer: bool,
    /// Session creation timestamp.
    created_at: i64,
}

/// The `SessionControllerActor` implementation.
pub struct SessionControllerActor {
    /// Controller instance ID.
    fc_id: String,
    /// Configuration snapshot.
    config: Config,
    /// Own sender, cloned into expiration-timer callbacks.
    sender: mpsc::Sender<ControllerMessage>,
    /// Message receiver.
    receiver: mpsc::Receiver<ControllerMessage>,
    /// Cancellation token (root).
    cancel_token: CancellationToken,
    /// Managed sessions by ID.
    sessions: HashMap<String, ManagedSession>,
    /// Invite token -> session id.
    add_links: HashMap<String, String>,
    /// Whether the controller is accepting new sessions.
    accepting_new: bool,
    /// Change-notification fan-out.
    hub: Arc<EventHub>,
    /// Expiration timers.
    scheduler: Arc<ExpirationScheduler>,
    /// Shared metrics.
    metrics: Arc<ActorMetrics>,
    /// Mailbox monitor.
    mailbox: MailboxMonitor,
}

impl SessionControllerActor {
    fn new(
        config: Config,
        sender: mpsc::Sender<ControllerMessage>,
        receiver: mpsc::Receiver<ControllerMessage>,
        cancel_token: CancellationToken,
        hub: Arc<EventHub>,
        scheduler: Arc<ExpirationScheduler>,
        metrics: Arc<ActorMetrics>,
    ) -> Self {
        let fc_id = config.fc_id.clone();
        let mailbox = MailboxMonitor::new(ActorType::Controller, &fc_id);

        Self {
            fc_id,
            config,
            sender,
            receiver,
            cancel_token,
            sessions: HashMap::new(),
            add_links: HashMap::new(),
            accepting_new: true,
            hub,
            scheduler,
            metrics,
            mailbox,
        }
    }

    /// Run the actor message loop.
    #[instrument(skip_all, name = "fc.actor.controller", fields(fc_id = %self.fc_id))]
    async fn run(mut self) {
        info!(
            target: "fc.actor.controller",
            fc_id = %self.fc_id,
            "SessionControllerActor started"
        );

        loop {
            // Check for terminated session actors
            self.check_session_health().await;

            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "fc.actor.controller",
                        fc_id = %self.fc_id,
                        "SessionControllerActor received cancellation signal"
                    );
                    self.graceful_shutdown().await;
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.mailbox.record_enqueue();
                            self.handle_message(message).await;
                            self.mailbox.record_dequeue();
                            self.metrics.record_message_processed();
                        }
                        None => {
                            info!(
                                target: "fc.actor.controller",
                                fc_id = %self.fc_id,
                                "SessionControllerActor channel closed, exiting"
                            );
                            break;
                        }
                    }
                }
            }
        }

        info!(
            target: "fc.actor.controller",
            fc_id = %self.fc_id,
            sessions_remaining = self.sessions.len(),
            messages_processed = self.mailbox.messages_processed(),
            "SessionControllerActor stopped"
        );
    }

    /// Handle a single message.
    async fn handle_message(&mut self, message: ControllerMessage) {
        match message {
            ControllerMessage::CreateSession {
                seed,
                owner_identity,
                premium,
                respond_to,
            } => {
                let result = self.create_session(&seed, owner_identity, premium).await;
                let _ = respond_to.send(result);
            }

            ControllerMessage::FindSession {
                session_id,
                respond_to,
            } => {
                let result = self.find_session(&session_id).await;
                let _ = respond_to.send(result);
            }

            ControllerMessage::FindByAddLink {
                add_link,
                respond_to,
            } => {
                let result = match self.add_links.get(&add_link).cloned() {
                    Some(session_id) => self.find_session(&session_id).await,
                    None => Err(FcError::SessionNotFound(add_link)),
                };
                let _ = respond_to.send(result);
            }

            ControllerMessage::GetSession {
                session_id,
                respond_to,
            } => {
                let result = self
                    .sessions
                    .get(&session_id)
                    .map(|managed| managed.handle.clone())
                    .ok_or(FcError::SessionNotFound(session_id));
                let _ = respond_to.send(result);
            }

            ControllerMessage::EndSession {
                session_id,
                caller,
                respond_to,
            } => {
                let result = self.end_session(&session_id, caller.as_deref()).await;
                let _ = respond_to.send(result);
            }

            ControllerMessage::GetStatus { respond_to } => {
                let status = self.get_status();
                let _ = respond_to.send(status);
            }

            ControllerMessage::Shutdown { respond_to } => {
                info!(
                    target: "fc.actor.controller",
                    fc_id = %self.fc_id,
                    session_count = self.sessions.len(),
                    "Initiating graceful shutdown"
                );
                self.accepting_new = false;
                self.cancel_token.cancel();
                let _ = respond_to.send(());
            }
        }
    }

    /// Create a new session actor and arm its expiration timer.
    async fn create_session(
        &mut self,
        seed: &str,
        owner_identity: Option<String>,
        premium: bool,
    ) -> Result<SessionState, FcError> {
        if !self.accepting_new {
            return Err(FcError::Draining);
        }

        let session_id = ident::derive_id(seed)?;

        if let Some(existing) = self.sessions.get(&session_id) {
            // A locked predecessor blocks with a phase error rather than
            // a plain conflict.
            let locked = existing
                .handle
                .get_state()
                .await
                .map(|state| state.locked)
                .unwrap_or(false);
            if locked {
                return Err(FcError::Locked("create session".to_string()));
            }
            return Err(FcError::SessionConflict);
        }

        if self.sessions.len() >= self.config.max_sessions as usize {
            return Err(FcError::CapacityExceeded(format!(
                "controller holds at most {} sessions",
                self.config.max_sessions
            )));
        }

        let creator_id = owner_identity.unwrap_or_else(|| session_id.clone());
        let add_link = ident::opaque_token();
        let created_at = chrono::Utc::now().timestamp();
        let time_to_expire = if premium {
            None
        } else {
            Some(self.config.free_session_ttl_seconds)
        };
        let expiration_timestamp =
            time_to_expire.map(|ttl| created_at.saturating_add(ttl as i64));

        debug!(
            target: "fc.actor.controller",
            fc_id = %self.fc_id,
            session_id = %session_id,
            premium,
            "Creating new session actor"
        );

        let session_token = self.cancel_token.child_token();
        let params = SessionParams {
            id: session_id.clone(),
            creator_id: creator_id.clone(),
            add_link: add_link.clone(),
            premium,
            expiration_timestamp,
            created_at,
            max_rooms: self.config.max_rooms_per_session as usize,
        };
        let (handle, task_handle) = SessionActor::spawn(
            params,
            session_token,
            Arc::clone(&self.hub),
            Arc::clone(&self.metrics),
        );

        self.sessions.insert(
            session_id.clone(),
            ManagedSession {
                handle,
                task_handle,
                creator_id: creator_id.clone(),
                add_link: add_link.clone(),
                has_timer: time_to_expire.is_some(),
                created_at,
            },
        );
        self.add_links.insert(add_link.clone(), session_id.clone());

        if let Some(ttl) = time_to_expire {
            self.arm_expiration(&session_id, Duration::from_secs(ttl));
        }

        self.metrics.session_created();

        info!(
            target: "fc.actor.controller",
            fc_id = %self.fc_id,
            session_id = %session_id,
            total_sessions = self.sessions.len(),
            expires_in_secs = time_to_expire,
            "Session created"
        );

        Ok(SessionState {
            id: session_id,
            creator_id,
            add_link,
            phase: SessionPhase::Collecting,
            locked: false,
            premium,
            expiration_timestamp,
            created_at,
            room_count: 0,
        })
    }

    /// Arm the expiration timer for a session.
    ///
    /// The fired callback re-enters through this actor's own mailbox, so
    /// the timer path runs in the same critical section as every other
    /// session operation. A session ended explicitly before the timer
    /// fires answers the callback with `SessionNotFound`, which is the
    /// expected race and only logged.
    fn arm_expiration(&self, session_id: &str, delay: Duration) {
        let sender = self.sender.clone();
        let session_id_owned = session_id.to_string();

        let armed = self.scheduler.arm(session_id, delay, move || async move {
            info!(
                target: "fc.actor.controller",
                session_id = %session_id_owned,
                "Session expiration timeout"
            );

            let (tx, rx) = tokio::sync::oneshot::channel();
            let sent = sender
                .send(ControllerMessage::EndSession {
                    session_id: session_id_owned.clone(),
                    caller: None,
                    respond_to: tx,
                })
                .await;

            if sent.is_err() {
                warn!(
                    target: "fc.actor.controller",
                    session_id = %session_id_owned,
                    "Controller mailbox closed, expired session not ended"
                );
                return;
            }

            match rx.await {
                Ok(Ok(_)) => {
                    info!(
                        target: "fc.actor.controller",
                        session_id = %session_id_owned,
                        "Expired session ended"
                    );
                }
                Ok(Err(FcError::SessionNotFound(_))) => {
                    info!(
                        target: "fc.actor.controller",
                        session_id = %session_id_owned,
                        "Expired session was already ended"
                    );
                }
                Ok(Err(err)) => {
                    warn!(
                        target: "fc.actor.controller",
                        session_id = %session_id_owned,
                        error = %err,
                        "Ending expired session failed"
                    );
                }
                Err(_) => {
                    warn!(
                        target: "fc.actor.controller",
                        session_id = %session_id_owned,
                        "No response while ending expired session"
                    );
                }
            }
        });

        if let Err(err) = armed {
            // A fresh session id cannot have an armed timer; log and
            // keep the session alive without one.
            error!(
                target: "fc.actor.controller",
                session_id = %session_id,
                error = %err,
                "Failed to arm expiration timer"
            );
        }
    }

    /// Read a session's state, falling back to cached facts if the actor
    /// is unreachable.
    async fn find_session(&self, session_id: &str) -> Result<SessionState, FcError> {
        match self.sessions.get(session_id) {
            Some(managed) => match managed.handle.get_state().await {
                Ok(state) => Ok(state),
                Err(_) => {
                    warn!(
                        target: "fc.actor.controller",
                        fc_id = %self.fc_id,
                        session_id = %session_id,
                        "Failed to query session actor state, returning cached info"
                    );
                    Ok(SessionState {
                        id: session_id.to_string(),
                        creator_id: managed.creator_id.clone(),
                        add_link: managed.add_link.clone(),
                        phase: SessionPhase::Collecting,
                        locked: false,
                        premium: !managed.has_timer,
                        expiration_timestamp: None,
                        created_at: managed.created_at,
                        room_count: 0,
                    })
                }
            },
            None => Err(FcError::SessionNotFound(session_id.to_string())),
        }
    }

    /// End a session: the single convergence point for the explicit-end
    /// and the expired-timer paths.
    async fn end_session(
        &mut self,
        session_id: &str,
        caller: Option<&str>,
    ) -> Result<SessionState, FcError> {
        let Some(managed) = self.sessions.get(session_id) else {
            return Err(FcError::SessionNotFound(session_id.to_string()));
        };

        // The timer path carries no caller: the session ends under its
        // own identity.
        if let Some(caller) = caller {
            if caller != managed.creator_id {
                return Err(FcError::PermissionDenied(
                    "only the session owner can end it".to_string(),
                ));
            }
        }

        let Some(managed) = self.sessions.remove(session_id) else {
            return Err(FcError::SessionNotFound(session_id.to_string()));
        };

        let state = match managed.handle.end().await {
            Ok(state) => state,
            Err(err) => {
                warn!(
                    target: "fc.actor.controller",
                    fc_id = %self.fc_id,
                    session_id = %session_id,
                    error = %err,
                    "Session actor unreachable during end, removing anyway"
                );
                SessionState {
                    id: session_id.to_string(),
                    creator_id: managed.creator_id.clone(),
                    add_link: managed.add_link.clone(),
                    phase: SessionPhase::Collecting,
                    locked: false,
                    premium: !managed.has_timer,
                    expiration_timestamp: None,
                    created_at: managed.created_at,
                    room_count: 0,
                }
            }
        };

        managed.handle.cancel();

        if managed.has_timer {
            // Logged no-op when the firing timer already consumed itself.
            self.scheduler.disarm(session_id);
        }

        self.add_links.remove(&managed.add_link);
        self.metrics.session_removed();

        self.hub.publish(session_id, SessionEvent::SessionEnded);
        self.hub.close(session_id);

        // Reap the actor task off the message loop.
        let fc_id = self.fc_id.clone();
        let session_id_owned = session_id.to_string();
        tokio::spawn(async move {
            match tokio::time::timeout(Duration::from_secs(5), managed.task_handle).await {
                Ok(Ok(())) => {
                    debug!(
                        target: "fc.actor.controller",
                        fc_id = %fc_id,
                        session_id = %session_id_owned,
                        "Session actor task completed cleanly"
                    );
                }
                Ok(Err(e)) => {
                    warn!(
                        target: "fc.actor.controller",
                        fc_id = %fc_id,
                        session_id = %session_id_owned,
                        error = ?e,
                        "Session actor task panicked during removal"
                    );
                }
                Err(_) => {
                    warn!(
                        target: "fc.actor.controller",
                        fc_id = %fc_id,
                        session_id = %session_id_owned,
                        "Session actor task cleanup timed out"
                    );
                }
            }
        });

        info!(
            target: "fc.actor.controller",
            fc_id = %self.fc_id,
            session_id = %session_id,
            explicit = caller.is_some(),
            total_sessions = self.sessions.len(),
            "Session removed"
        );

        Ok(state)
    }

    /// Get current controller status.
    fn get_status(&self) -> ControllerStatus {
        ControllerStatus {
            session_count: self.sessions.len(),
            armed_timers: self.scheduler.armed_count(),
            is_draining: !self.accepting_new,
            mailbox_depth: self.mailbox.current_depth(),
        }
    }

    /// Perform graceful shutdown.
    async fn graceful_shutdown(&mut self) {
        info!(
            target: "fc.actor.controller",
            fc_id = %self.fc_id,
            session_count = self.sessions.len(),
            "Performing graceful shutdown"
        );

        self.accepting_new = false;

        for (session_id, managed) in &self.sessions {
            debug!(
                target: "fc.actor.controller",
                fc_id = %self.fc_id,
                session_id = %session_id,
                "Cancelling session actor"
            );
            if managed.has_timer {
                self.scheduler.disarm(session_id);
            }
            managed.handle.cancel();
        }

        for (session_id, managed) in self.sessions.drain() {
            match tokio::time::timeout(Duration::from_secs(5), managed.task_handle).await {
                Ok(Ok(())) => {
                    debug!(
                        target: "fc.actor.controller",
                        fc_id = %self.fc_id,
                        session_id = %session_id,
                        "Session actor completed cleanly"
                    );
                }
                Ok(Err(e)) => {
                    warn!(
                        target: "fc.actor.controller",
                        fc_id = %self.fc_id,
                        session_id = %session_id,
                        error = ?e,
                        "Session actor task panicked during shutdown"
                    );
                }
                Err(_) => {
                    warn!(
                        target: "fc.actor.controller",
                        fc_id = %self.fc_id,
                        session_id = %session_id,
                        "Session actor shutdown timed out"
                    );
                }
            }
        }
        self.add_links.clear();

        info!(
            target: "fc.actor.controller",
            fc_id = %self.fc_id,
            "Graceful shutdown complete"
        );
    }

    /// Check health of managed session actors.
    ///
    /// The normal end path removes a session from the map before its task
    /// finishes, so anything found here stopped unexpectedly.
    async fn check_session_health(&mut self) {
        let mut stopped = Vec::new();

        for (session_id, managed) in &self.sessions {
            if managed.task_handle.is_finished() {
                warn!(
                    target: "fc.actor.controller",
                    fc_id = %self.fc_id,
                    session_id = %session_id,
                    "Session actor task finished unexpectedly"
                );
                stopped.push(session_id.clone());
            }
        }

        for session_id in stopped {
            if let Some(managed) = self.sessions.remove(&session_id) {
                match managed.task_handle.await {
                    Ok(()) => {
                        info!(
                            target: "fc.actor.controller",
                            fc_id = %self.fc_id,
                            session_id = %session_id,
                            "Session actor exited cleanly"
                        );
                    }
                    Err(join_error) => {
                        if join_error.is_panic() {
                            error!(
                                target: "fc.actor.controller",
                                fc_id = %self.fc_id,
                                session_id = %session_id,
                                error = ?join_error,
                                "Session actor panicked"
                            );
                            self.metrics.record_panic(ActorType::Session);
                        }
                    }
                }

                if managed.has_timer {
                    self.scheduler.disarm(&session_id);
                }
                self.add_links.remove(&managed.add_link);
                self.hub.close(&session_id);
                self.metrics.session_removed();
            }
        }
    }
}

//! Ensemble-aware session executor.
//!
//! [`SessionExecutor`] keeps exactly one session alive against an ensemble.
//! When the active transport closes it picks another member, waits a short
//! random backoff and resumes the same session there; requests submitted in
//! the gap are queued and flushed in order once the new handshake is valid.
//!
//! Every state change is a command applied by a single [`Actor`] runner,
//! so the attempt state is only ever touched by one thread at a time.
//! Continuations (connecting, awaiting a handshake, relaying transport
//! events) post their outcome back as commands tagged with the attempt
//! number they belong to; outcomes of superseded attempts are discarded.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use zkpool_core::{
    Actor, ActorExecutor, ActorHandler, EnsembleView, HandshakeResult, Listeners, Providers,
    RandomProvider, Request, ServerAddress, Session, TaskProvider, TimeProvider, TransportState,
    WeakActor,
};

use crate::config::SessionConfig;
use crate::connection::{ClientConnection, ClientExecutor, Connector, SessionEvent, SessionListener};
use crate::ensemble::EnsembleViewFactory;
use crate::error::{ClientError, ClientResult};
use crate::promise::ReplyPromise;

/// Whether the current session is usable.
#[derive(Clone)]
pub enum Readiness {
    /// No session yet, or relocating.
    Pending,
    /// Session established on this connection.
    Ready(Arc<dyn ClientConnection>),
    /// Permanently failed.
    Failed(ClientError),
}

impl Readiness {
    /// Whether a session is established.
    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Ready(_))
    }

    /// The terminal error, if failed.
    pub fn error(&self) -> Option<&ClientError> {
        match self {
            Readiness::Failed(error) => Some(error),
            _ => None,
        }
    }
}

impl fmt::Debug for Readiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Readiness::Pending => f.write_str("Pending"),
            Readiness::Ready(connection) => f
                .debug_tuple("Ready")
                .field(&connection.address().to_string())
                .finish(),
            Readiness::Failed(error) => f.debug_tuple("Failed").field(error).finish(),
        }
    }
}

/// Connection handed back by a stop so it can be disconnected gracefully.
type Graceful = Option<(Arc<dyn ClientConnection>, Duration)>;

enum Command {
    Start,
    Connected {
        attempt: u64,
        result: ClientResult<Arc<dyn ClientConnection>>,
    },
    Handshake {
        attempt: u64,
        result: ClientResult<HandshakeResult>,
    },
    TransportClosed {
        attempt: u64,
    },
    Submit {
        request: Request,
        promise: ReplyPromise,
    },
    Cancel,
    Stop {
        reply: oneshot::Sender<Graceful>,
    },
}

/// Release whatever a command holds when it can no longer be applied.
fn discard(command: Command) {
    match command {
        Command::Submit { promise, .. } => promise.send_error(ClientError::Stopped),
        Command::Connected {
            result: Ok(connection),
            ..
        } => connection.close(),
        Command::Stop { reply } => {
            let _ = reply.send(None);
        }
        _ => {}
    }
}

#[derive(Clone, Debug)]
enum Phase {
    Idle,
    Connecting,
    Ready,
    Failed(ClientError),
    Stopped,
}

struct Current {
    connection: Arc<dyn ClientConnection>,
    relay: Arc<dyn SessionListener>,
}

struct SessionState {
    phase: Phase,
    attempt: u64,
    server: Option<ServerAddress>,
    session: Option<Session>,
    resumable: bool,
    established: bool,
    halted: bool,
    current: Option<Current>,
    task: Option<JoinHandle<()>>,
    pending: VecDeque<(Request, ReplyPromise)>,
}

impl SessionState {
    fn new() -> Self {
        Self {
            phase: Phase::Idle,
            attempt: 0,
            server: None,
            session: None,
            resumable: true,
            established: false,
            halted: false,
            current: None,
            task: None,
            pending: VecDeque::new(),
        }
    }

    fn is_current(&self, attempt: u64) -> bool {
        attempt == self.attempt && matches!(self.phase, Phase::Connecting | Phase::Ready)
    }
}

struct SessionHandler<P: Providers> {
    me: WeakActor<SessionHandler<P>, P::Task>,
    providers: P,
    config: SessionConfig,
    ensemble: EnsembleViewFactory<P::Random>,
    listeners: Listeners<dyn SessionListener>,
    events: ActorExecutor<P::Task>,
    readiness: watch::Sender<Readiness>,
    state: Mutex<SessionState>,
}

/// Post `command` to the executor behind `me`, releasing it if the
/// executor is gone or stopped.
fn post<P: Providers>(me: &WeakActor<SessionHandler<P>, P::Task>, command: Command) {
    match me.upgrade() {
        Some(actor) => {
            if let Err(rejected) = actor.send(command) {
                discard(rejected.into_inner());
            }
        }
        None => discard(command),
    }
}

impl<P: Providers> ActorHandler for SessionHandler<P> {
    type Item = Command;

    fn apply(&self, command: Command) {
        match command {
            Command::Start => self.on_start(),
            Command::Connected { attempt, result } => self.on_connected(attempt, result),
            Command::Handshake { attempt, result } => self.on_handshake(attempt, result),
            Command::TransportClosed { attempt } => self.on_transport_closed(attempt),
            Command::Submit { request, promise } => self.on_submit(request, promise),
            Command::Cancel => self.on_cancel(),
            Command::Stop { reply } => self.on_stop(reply),
        }
    }

    fn cancel(&self, command: Command) {
        discard(command);
    }
}

impl<P: Providers> SessionHandler<P> {
    fn on_start(&self) {
        let mut state = self.state.lock();
        if !matches!(state.phase, Phase::Idle) {
            return;
        }
        state.server = Some(self.ensemble.select());
        self.begin_attempt(&mut state);
    }

    fn begin_attempt(&self, state: &mut SessionState) {
        let Some(server) = state.server.clone() else {
            return;
        };
        let factory = match self.ensemble.get(&server) {
            Ok(factory) => factory,
            Err(error) => {
                self.fail(state, error);
                return;
            }
        };

        state.attempt += 1;
        let attempt = state.attempt;
        state.phase = Phase::Connecting;
        self.readiness.send_replace(Readiness::Pending);

        let resume = if state.resumable {
            state.session.clone()
        } else {
            None
        };
        let backoff = match resume {
            Some(_) => self.draw_backoff(),
            None => None,
        };
        match &resume {
            Some(session) => tracing::info!(
                %session,
                %server,
                attempt,
                backoff_ms = backoff.map(|d| d.as_millis() as u64).unwrap_or(0),
                "resuming session"
            ),
            None => tracing::info!(%server, attempt, "connecting new session"),
        }

        let me = self.me.clone();
        let time = self.providers.time().clone();
        let task = self
            .providers
            .task()
            .spawn_task("session-connect", async move {
                if let Some(delay) = backoff {
                    time.sleep(delay).await;
                }
                let result = match resume {
                    Some(session) => factory.get_session(&session).await,
                    None => factory.get().await,
                };
                post(&me, Command::Connected { attempt, result });
            });
        state.task = Some(task);
    }

    fn draw_backoff(&self) -> Option<Duration> {
        let range = self.config.resume_backoff.clone();
        if range.is_empty() {
            None
        } else {
            Some(self.providers.random().random_range(range))
        }
    }

    fn on_connected(&self, attempt: u64, result: ClientResult<Arc<dyn ClientConnection>>) {
        let mut state = self.state.lock();
        if !state.is_current(attempt) {
            drop(state);
            if let Ok(connection) = result {
                tracing::debug!(attempt, server = %connection.address(), "discarding stale connection");
                connection.close();
            }
            return;
        }
        state.task = None;

        let connection = match result {
            Ok(connection) => connection,
            Err(error) => {
                tracing::warn!(
                    attempt,
                    server = ?state.server.as_ref().map(ToString::to_string),
                    %error,
                    "error connecting"
                );
                self.recover(&mut state);
                return;
            }
        };

        let relay: Arc<dyn SessionListener> = Arc::new(Relay {
            attempt,
            actor: self.me.clone(),
        });
        connection.subscribe(relay.clone());
        state.current = Some(Current {
            connection: connection.clone(),
            relay,
        });
        if connection.transport_state() >= TransportState::Closing {
            tracing::warn!(attempt, server = %connection.address(), "connection closed before it was handed over");
            self.recover(&mut state);
            return;
        }

        let me = self.me.clone();
        let task = self
            .providers
            .task()
            .spawn_task("session-handshake", async move {
                let result = connection.handshake().await;
                post(&me, Command::Handshake { attempt, result });
            });
        state.task = Some(task);
    }

    fn on_handshake(&self, attempt: u64, result: ClientResult<HandshakeResult>) {
        let mut state = self.state.lock();
        if !state.is_current(attempt) {
            return;
        }
        state.task = None;

        match result {
            Ok(HandshakeResult::Valid(session)) => {
                let connection = state.current.as_ref().map(|c| c.connection.clone());
                let Some(connection) = connection else {
                    return;
                };
                if let Some(previous) = &state.session {
                    if previous.id() != session.id() {
                        tracing::info!(previous = %previous, %session, "session replaced");
                    }
                }
                if connection.transport_state() >= TransportState::Closing {
                    tracing::warn!(attempt, server = %connection.address(), "connection closed during handshake");
                    state.session = Some(session);
                    self.recover(&mut state);
                    return;
                }
                tracing::info!(
                    %session,
                    server = %connection.address(),
                    attempt,
                    "session established"
                );
                state.session = Some(session);
                state.established = true;
                state.phase = Phase::Ready;
                let pending: Vec<_> = state.pending.drain(..).collect();
                drop(state);

                self.readiness
                    .send_replace(Readiness::Ready(connection.clone()));
                if !pending.is_empty() {
                    tracing::debug!(count = pending.len(), "flushing queued requests");
                }
                for (request, promise) in pending {
                    if promise.is_canceled() {
                        promise.send_error(ClientError::Cancelled);
                        continue;
                    }
                    connection.submit_with(request, promise);
                }
            }
            Ok(HandshakeResult::Invalid) => {
                tracing::warn!(
                    attempt,
                    session = ?state.session.as_ref().map(ToString::to_string),
                    "session rejected, starting a new one"
                );
                state.session = None;
                state.resumable = false;
                if let Some(connection) = self.detach(&mut state) {
                    connection.close();
                }
                self.begin_attempt(&mut state);
            }
            Err(error) => {
                tracing::warn!(attempt, %error, "handshake failed");
                self.recover(&mut state);
            }
        }
    }

    fn on_transport_closed(&self, attempt: u64) {
        let mut state = self.state.lock();
        if !state.is_current(attempt) {
            return;
        }
        tracing::warn!(
            attempt,
            server = ?state.server.as_ref().map(ToString::to_string),
            "connection closed"
        );
        self.recover(&mut state);
    }

    /// Move to another member after losing the current one, or give up.
    fn recover(&self, state: &mut SessionState) {
        if let Some(task) = state.task.take() {
            task.abort();
        }
        if let Some(connection) = self.detach(state) {
            connection.close();
        }

        if state.halted {
            self.fail(state, ClientError::Cancelled);
            return;
        }
        if !state.established {
            tracing::warn!("initial connection attempt failed, not retrying");
            self.fail(state, ClientError::ConnectionLost);
            return;
        }

        let next = state
            .server
            .as_ref()
            .and_then(|previous| self.ensemble.select_other(previous));
        match next {
            Some(server) => {
                tracing::info!(
                    from = ?state.server.as_ref().map(ToString::to_string),
                    to = %server,
                    "relocating session"
                );
                state.server = Some(server);
                self.begin_attempt(state);
            }
            None => {
                tracing::warn!("no other ensemble member to fail over to");
                self.fail(state, ClientError::ConnectionLost);
            }
        }
    }

    /// Forget the current connection and stop relaying its events.
    fn detach(&self, state: &mut SessionState) -> Option<Arc<dyn ClientConnection>> {
        let current = state.current.take()?;
        current.connection.unsubscribe(&current.relay);
        Some(current.connection)
    }

    fn fail(&self, state: &mut SessionState, error: ClientError) {
        tracing::error!(%error, attempt = state.attempt, "session executor failed");
        if let Some(task) = state.task.take() {
            task.abort();
        }
        if let Some(connection) = self.detach(state) {
            connection.close();
        }
        state.phase = Phase::Failed(error.clone());
        self.readiness.send_replace(Readiness::Failed(error.clone()));
        for (_, promise) in state.pending.drain(..) {
            promise.send_error(error.clone());
        }
    }

    fn on_submit(&self, request: Request, promise: ReplyPromise) {
        let mut state = self.state.lock();
        match state.phase.clone() {
            Phase::Idle | Phase::Connecting | Phase::Ready if promise.is_canceled() => {
                drop(state);
                promise.send_error(ClientError::Cancelled);
            }
            Phase::Ready => {
                let connection = state.current.as_ref().map(|c| c.connection.clone());
                match connection {
                    Some(connection) => {
                        drop(state);
                        connection.submit_with(request, promise);
                    }
                    None => state.pending.push_back((request, promise)),
                }
            }
            Phase::Idle | Phase::Connecting => state.pending.push_back((request, promise)),
            Phase::Failed(error) => {
                drop(state);
                promise.send_error(error);
            }
            Phase::Stopped => {
                drop(state);
                promise.send_error(ClientError::Stopped);
            }
        }
    }

    fn on_cancel(&self) {
        let mut state = self.state.lock();
        state.halted = true;
        if matches!(state.phase, Phase::Idle | Phase::Connecting) {
            tracing::info!(attempt = state.attempt, "connection attempt cancelled");
            self.fail(&mut state, ClientError::Cancelled);
        }
    }

    fn on_stop(&self, reply: oneshot::Sender<Graceful>) {
        let mut state = self.state.lock();
        if matches!(state.phase, Phase::Stopped) {
            let _ = reply.send(None);
            return;
        }
        if let Some(task) = state.task.take() {
            task.abort();
        }

        let was_ready = matches!(state.phase, Phase::Ready);
        let graceful = match (was_ready, self.detach(&mut state)) {
            (true, Some(connection)) => {
                let timeout = state
                    .session
                    .as_ref()
                    .map(Session::timeout)
                    .filter(|t| !t.is_zero())
                    .unwrap_or(self.config.shutdown_timeout);
                Some((connection, timeout))
            }
            (_, Some(connection)) => {
                connection.close();
                None
            }
            (_, None) => None,
        };

        state.phase = Phase::Stopped;
        let pending: Vec<_> = state.pending.drain(..).collect();
        drop(state);

        tracing::info!("session executor stopping");
        self.readiness
            .send_replace(Readiness::Failed(ClientError::Stopped));
        for (_, promise) in pending {
            promise.send_error(ClientError::Stopped);
        }
        let _ = reply.send(graceful);
        if let Some(actor) = self.me.upgrade() {
            actor.stop();
        }
    }

    fn publish(&self, event: SessionEvent) {
        let listeners = self.listeners.snapshot();
        if listeners.is_empty() {
            return;
        }
        self.events.execute("session-event", move || {
            for listener in &listeners {
                listener.on_event(&event);
            }
        });
    }
}

/// Subscribed on each connection: relays its events to the executor's
/// listeners and reports transport loss for its attempt.
struct Relay<P: Providers> {
    attempt: u64,
    actor: WeakActor<SessionHandler<P>, P::Task>,
}

impl<P: Providers> SessionListener for Relay<P> {
    fn on_event(&self, event: &SessionEvent) {
        let Some(actor) = self.actor.upgrade() else {
            return;
        };
        actor.handler().publish(event.clone());
        if let SessionEvent::TransportChanged {
            to: TransportState::Closed,
            ..
        } = event
        {
            if let Err(rejected) = actor.send(Command::TransportClosed {
                attempt: self.attempt,
            }) {
                discard(rejected.into_inner());
            }
        }
    }
}

/// Keeps one session alive against an ensemble.
///
/// # Example
///
/// ```rust,ignore
/// let executor = SessionExecutor::new(view, connector, TokioProviders::new(), SessionConfig::default());
/// executor.start();
/// executor.ready().await?;
/// let reply = executor.submit(Request::GetData { path, watch: false }).await?;
/// executor.stop().await;
/// ```
pub struct SessionExecutor<P: Providers> {
    actor: Actor<SessionHandler<P>, P::Task>,
}

impl<P: Providers> Clone for SessionExecutor<P> {
    fn clone(&self) -> Self {
        Self {
            actor: self.actor.clone(),
        }
    }
}

impl<P: Providers> SessionExecutor<P> {
    /// Create an executor over `view`. Call [`start`](Self::start) to connect.
    pub fn new(
        view: EnsembleView,
        connector: Arc<dyn Connector>,
        providers: P,
        config: SessionConfig,
    ) -> Self {
        let ensemble = EnsembleViewFactory::new(
            view,
            connector,
            providers.random().clone(),
            config.session_timeout,
        );
        Self::with_ensemble(ensemble, providers, config)
    }

    /// Create an executor over an existing ensemble factory.
    pub fn with_ensemble(
        ensemble: EnsembleViewFactory<P::Random>,
        providers: P,
        config: SessionConfig,
    ) -> Self {
        let task = providers.task().clone();
        let events = ActorExecutor::new("session-events", task.clone());
        let (readiness, _) = watch::channel(Readiness::Pending);
        let actor = Actor::new_cyclic(
            "session-executor",
            |me| SessionHandler {
                me,
                events,
                providers,
                config,
                ensemble,
                listeners: Listeners::new(),
                readiness,
                state: Mutex::new(SessionState::new()),
            },
            task,
        );
        Self { actor }
    }

    /// Select a member and start connecting. Idempotent.
    pub fn start(&self) {
        if let Err(rejected) = self.actor.send(Command::Start) {
            discard(rejected.into_inner());
        }
    }

    /// Wait until a session is usable.
    ///
    /// # Errors
    ///
    /// The terminal error once the executor has failed, been cancelled or
    /// been stopped.
    pub async fn ready(&self) -> ClientResult<Arc<dyn ClientConnection>> {
        let mut receiver = self.actor.handler().readiness.subscribe();
        loop {
            let current = receiver.borrow_and_update().clone();
            match current {
                Readiness::Ready(connection) => return Ok(connection),
                Readiness::Failed(error) => return Err(error),
                Readiness::Pending => {}
            }
            if receiver.changed().await.is_err() {
                return Err(ClientError::Stopped);
            }
        }
    }

    /// Snapshot of the current readiness.
    pub fn readiness(&self) -> Readiness {
        self.actor.handler().readiness.borrow().clone()
    }

    /// Cancel an in-flight connection attempt and halt reconnection.
    ///
    /// An established session keeps serving requests until its transport
    /// closes, after which the executor fails with
    /// [`ClientError::Cancelled`].
    pub fn cancel(&self) {
        if let Err(rejected) = self.actor.send(Command::Cancel) {
            discard(rejected.into_inner());
        }
    }

    /// Stop the executor.
    ///
    /// A connected session is sent a close-session request, awaited up to
    /// the session timeout, before the transport is closed. Queued and
    /// later requests fail with [`ClientError::Stopped`].
    pub async fn stop(&self) {
        let (reply, graceful) = oneshot::channel();
        if let Err(rejected) = self.actor.send(Command::Stop { reply }) {
            discard(rejected.into_inner());
            return;
        }

        if let Ok(Some((connection, timeout))) = graceful.await {
            if connection.protocol_state().is_connected()
                && connection.transport_state() < TransportState::Closing
            {
                tracing::info!(server = %connection.address(), "disconnecting session");
                let disconnect = connection.submit(Request::Disconnect);
                match self
                    .actor
                    .handler()
                    .providers
                    .time()
                    .timeout(timeout, disconnect)
                    .await
                {
                    Ok(Ok(_)) => tracing::debug!("session disconnected"),
                    Ok(Err(error)) => tracing::warn!(%error, "disconnect failed"),
                    Err(_) => tracing::warn!(?timeout, "disconnect timed out"),
                }
            }
            connection.close();
        }

        let handler = self.actor.handler();
        handler.events.shutdown();
        handler.listeners.clear();
    }

    /// The last established session, if any.
    pub fn session(&self) -> Option<Session> {
        self.actor.handler().state.lock().session.clone()
    }

    /// The currently selected member, if any.
    pub fn server(&self) -> Option<ServerAddress> {
        self.actor.handler().state.lock().server.clone()
    }

    /// Number of connection attempts made so far.
    pub fn attempts(&self) -> u64 {
        self.actor.handler().state.lock().attempt
    }

    /// The ensemble factory this executor draws connections from.
    pub fn ensemble(&self) -> &EnsembleViewFactory<P::Random> {
        &self.actor.handler().ensemble
    }
}

impl<P: Providers> ClientExecutor for SessionExecutor<P> {
    fn submit_with(&self, request: Request, promise: ReplyPromise) {
        if let Err(rejected) = self.actor.send(Command::Submit { request, promise }) {
            discard(rejected.into_inner());
        }
    }

    fn subscribe(&self, listener: Arc<dyn SessionListener>) {
        self.actor.handler().listeners.subscribe(listener);
    }

    fn unsubscribe(&self, listener: &Arc<dyn SessionListener>) -> bool {
        self.actor.handler().listeners.unsubscribe(listener)
    }
}

impl<P: Providers> fmt::Debug for SessionExecutor<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.actor.handler().state.lock();
        f.debug_struct("SessionExecutor")
            .field("phase", &state.phase)
            .field("attempt", &state.attempt)
            .field("server", &state.server.as_ref().map(ToString::to_string))
            .field("session", &state.session)
            .field("pending", &state.pending.len())
            .finish()
    }
}

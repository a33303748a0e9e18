//! Reference-counted socket connection shared by many subscribers.
//!
//! A [`SyncHub`] owns at most one link at a time. The first subscription opens
//! it, releasing the last [`Subscription`] closes it. Everything except the
//! socket read itself runs on the thread that calls [`SyncHub::pump`]:
//! decoding, dispatch and reconnect timers. Subscriber callbacks therefore
//! never interleave.
//!
//! Reconnects use linear backoff (`base_delay * attempt`) and stop for good
//! after `max_attempts`; only a new subscription starts a fresh cycle.

pub mod transport;

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::{Rc, Weak};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::config::{ReconnectSettings, SyncConfig};
use crate::dispatch::{Dispatcher, SubscriberId, deliver};
use crate::events::{SyncEvent, decode_frame};

pub use transport::{LinkFrame, LinkHandle, LinkSender, Transport, WsTransport};

/// Consecutive failed attempts after which per-attempt failures drop to `debug`.
pub const QUIET_AFTER_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Closing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl ReconnectPolicy {
    pub fn from_settings(settings: &ReconnectSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            base_delay: settings.base_delay(),
        }
    }

    /// Delay before reconnect attempt `attempt` (1-based), or `None` once the
    /// attempt budget is spent.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }
        Some(self.base_delay.saturating_mul(attempt))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    pub retry_count: u32,
    pub max_attempts: u32,
    pub intentional_close: bool,
    /// Reconnect budget spent; no automatic retry until a new subscription.
    pub exhausted: bool,
    pub subscribers: usize,
    #[serde(skip)]
    pub next_retry_in: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerKind {
    InitialConnect,
    Reconnect,
}

struct HubInner {
    url: String,
    policy: ReconnectPolicy,
    initial_delay: Duration,
    initial_pending: bool,
    transport: Box<dyn Transport>,
    dispatcher: Dispatcher,
    state: ConnectionState,
    retry_count: u32,
    intentional_close: bool,
    exhausted: bool,
    generation: u64,
    link: Option<Box<dyn LinkHandle>>,
    timer: Option<(Instant, TimerKind)>,
    frames_tx: LinkSender,
    frames_rx: mpsc::Receiver<(u64, LinkFrame)>,
    outbox: VecDeque<SyncEvent>,
    dispatching: bool,
}

impl HubInner {
    fn connect(&mut self) {
        if matches!(self.state, ConnectionState::Open | ConnectionState::Connecting) {
            return;
        }
        self.intentional_close = false;
        self.timer = None;
        if self.initial_pending {
            self.initial_pending = false;
            if !self.initial_delay.is_zero() {
                tracing::info!(
                    delay_ms = self.initial_delay.as_millis() as u64,
                    "delaying first connect for co-located backend"
                );
                self.state = ConnectionState::Connecting;
                self.timer = Some((Instant::now() + self.initial_delay, TimerKind::InitialConnect));
                return;
            }
        }
        self.open_link();
    }

    fn open_link(&mut self) {
        self.generation += 1;
        self.state = ConnectionState::Connecting;
        tracing::debug!(url = %self.url, generation = self.generation, "opening socket link");
        let link = self
            .transport
            .open(&self.url, self.generation, self.frames_tx.clone());
        self.link = Some(link);
    }

    fn schedule_reconnect(&mut self) {
        let attempt = self.retry_count + 1;
        match self.policy.delay_for(attempt) {
            Some(delay) => {
                self.retry_count = attempt;
                self.timer = Some((Instant::now() + delay, TimerKind::Reconnect));
                if attempt <= QUIET_AFTER_ATTEMPTS {
                    tracing::info!(
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "scheduling reconnect"
                    );
                } else {
                    tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "scheduling reconnect");
                }
            }
            None => {
                self.exhausted = true;
                self.timer = None;
                tracing::error!(
                    attempts = self.retry_count,
                    "max reconnect attempts reached; staying disconnected until a new subscription"
                );
            }
        }
    }

    fn disconnect(&mut self) {
        self.intentional_close = true;
        self.timer = None;
        self.retry_count = 0;
        self.exhausted = false;
        match self.link.as_mut() {
            Some(link) if self.state != ConnectionState::Disconnected => {
                link.close();
                self.state = ConnectionState::Closing;
            }
            _ => self.state = ConnectionState::Disconnected,
        }
    }

    fn on_subscribed(&mut self) {
        if self.dispatcher.len() == 1 || self.exhausted {
            self.retry_count = 0;
            self.exhausted = false;
        }
        self.connect();
    }

    fn on_released(&mut self) {
        if self.dispatcher.is_empty() {
            tracing::info!("last subscriber released; closing socket");
            self.disconnect();
        }
    }

    fn handle_frame(&mut self, generation: u64, frame: LinkFrame) {
        if generation != self.generation {
            tracing::debug!(generation, current = self.generation, "dropping frame from stale link");
            return;
        }
        let closing = self.intentional_close && self.state == ConnectionState::Closing;
        match frame {
            LinkFrame::Opened | LinkFrame::Text(_) if closing => {
                tracing::debug!(generation, "ignoring frame from closing link");
            }
            LinkFrame::Opened => {
                self.state = ConnectionState::Open;
                self.retry_count = 0;
                self.exhausted = false;
                tracing::info!(url = %self.url, "socket connected");
                self.outbox.push_back(SyncEvent::connection_status(true));
            }
            LinkFrame::Text(text) => match decode_frame(&text) {
                Ok(event) => self.outbox.push_back(event),
                Err(err) => tracing::warn!(%err, "dropping malformed frame"),
            },
            LinkFrame::Closed(reason) => {
                self.link = None;
                self.state = ConnectionState::Disconnected;
                self.outbox.push_back(SyncEvent::connection_status(false));
                if self.intentional_close {
                    tracing::info!("socket closed");
                    return;
                }
                if self.retry_count < QUIET_AFTER_ATTEMPTS {
                    tracing::warn!(%reason, "socket link lost");
                } else {
                    tracing::debug!(%reason, attempt = self.retry_count, "socket link lost");
                }
                if !self.dispatcher.is_empty() && !self.exhausted {
                    self.schedule_reconnect();
                }
            }
        }
    }

    fn fire_due_timer(&mut self, now: Instant) {
        let Some((deadline, kind)) = self.timer else {
            return;
        };
        if deadline > now {
            return;
        }
        self.timer = None;
        match kind {
            TimerKind::InitialConnect => {
                if self.state == ConnectionState::Connecting && self.link.is_none() {
                    self.open_link();
                }
            }
            TimerKind::Reconnect => {
                if self.state == ConnectionState::Disconnected
                    && !self.intentional_close
                    && !self.dispatcher.is_empty()
                {
                    tracing::debug!(attempt = self.retry_count, "reconnecting");
                    self.open_link();
                }
            }
        }
    }

    fn wait_budget(&self, max_wait: Duration, now: Instant) -> Duration {
        match self.timer {
            Some((deadline, _)) => max_wait.min(deadline.saturating_duration_since(now)),
            None => max_wait,
        }
    }

    fn status(&self) -> ConnectionStatus {
        ConnectionStatus {
            state: self.state,
            retry_count: self.retry_count,
            max_attempts: self.policy.max_attempts,
            intentional_close: self.intentional_close,
            exhausted: self.exhausted,
            subscribers: self.dispatcher.len(),
            next_retry_in: self
                .timer
                .map(|(deadline, _)| deadline.saturating_duration_since(Instant::now())),
        }
    }
}

/// Owner-side handle to the shared connection. Cheap to clone; all clones
/// drive the same link and must stay on one thread.
#[derive(Clone)]
pub struct SyncHub {
    inner: Rc<RefCell<HubInner>>,
}

impl SyncHub {
    pub fn new<T>(config: &SyncConfig, transport: T) -> Self
    where
        T: Transport + 'static,
    {
        Self::with_settings(config.ws_url.as_str(), &config.reconnect, transport)
    }

    pub fn with_settings<T>(url: &str, settings: &ReconnectSettings, transport: T) -> Self
    where
        T: Transport + 'static,
    {
        let (frames_tx, frames_rx) = mpsc::channel();
        let inner = HubInner {
            url: url.to_string(),
            policy: ReconnectPolicy::from_settings(settings),
            initial_delay: settings.initial_delay(),
            initial_pending: true,
            transport: Box::new(transport),
            dispatcher: Dispatcher::new(),
            state: ConnectionState::Disconnected,
            retry_count: 0,
            intentional_close: false,
            exhausted: false,
            generation: 0,
            link: None,
            timer: None,
            frames_tx,
            frames_rx,
            outbox: VecDeque::new(),
            dispatching: false,
        };
        Self {
            inner: Rc::new(RefCell::new(inner)),
        }
    }

    /// Registers `callback` for every event from now on and connects if needed.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: FnMut(&SyncEvent) + 'static,
    {
        let id = {
            let mut inner = self.inner.borrow_mut();
            let id = inner.dispatcher.register(callback);
            inner.on_subscribed();
            id
        };
        self.flush();
        Subscription {
            hub: Rc::downgrade(&self.inner),
            id: Some(id),
        }
    }

    /// No-op while open or connecting.
    pub fn connect(&self) {
        self.inner.borrow_mut().connect();
        self.flush();
    }

    /// Schedules the next backoff attempt, or gives up once the budget is spent.
    pub fn reconnect(&self) {
        let mut inner = self.inner.borrow_mut();
        if inner.intentional_close || inner.exhausted {
            return;
        }
        inner.schedule_reconnect();
    }

    /// Intentional close: cancels pending retries and clears retry state.
    pub fn disconnect(&self) {
        self.inner.borrow_mut().disconnect();
        self.flush();
    }

    pub fn status(&self) -> ConnectionStatus {
        self.inner.borrow().status()
    }

    /// Runs one turn of the loop: fires due timers, waits up to `max_wait`
    /// for link frames, then dispatches everything that is ready. Returns the
    /// number of frames handled.
    pub fn pump(&self, max_wait: Duration) -> usize {
        self.fire_timers();

        let first = {
            let inner = self.inner.borrow();
            let wait = inner.wait_budget(max_wait, Instant::now());
            inner.frames_rx.recv_timeout(wait)
        };
        let mut handled = 0;
        match first {
            Ok((generation, frame)) => {
                self.handle(generation, frame);
                handled += 1;
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                tracing::error!("link channel closed");
            }
        }
        loop {
            let next = self.inner.borrow().frames_rx.try_recv();
            let Ok((generation, frame)) = next else {
                break;
            };
            self.handle(generation, frame);
            handled += 1;
        }

        self.fire_timers();
        handled
    }

    /// Pumps until `done` returns true or `timeout` elapses. Returns `done()`.
    pub fn pump_until<F>(&self, timeout: Duration, mut done: F) -> bool
    where
        F: FnMut() -> bool,
    {
        let deadline = Instant::now() + timeout;
        loop {
            if done() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            self.pump((deadline - now).min(Duration::from_millis(50)));
        }
    }

    fn handle(&self, generation: u64, frame: LinkFrame) {
        self.inner.borrow_mut().handle_frame(generation, frame);
        self.flush();
    }

    fn fire_timers(&self) {
        self.inner.borrow_mut().fire_due_timer(Instant::now());
        self.flush();
    }

    fn release(&self, id: SubscriberId) {
        {
            let mut inner = self.inner.borrow_mut();
            if !inner.dispatcher.unregister(id) {
                return;
            }
            inner.on_released();
        }
        self.flush();
    }

    /// Delivers queued events outside any borrow. Nested calls made from a
    /// callback only queue; the outermost call drains in order.
    fn flush(&self) {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.dispatching {
                return;
            }
            inner.dispatching = true;
        }
        loop {
            let next = {
                let mut inner = self.inner.borrow_mut();
                match inner.outbox.pop_front() {
                    Some(event) => Some((event, inner.dispatcher.targets())),
                    None => {
                        inner.dispatching = false;
                        None
                    }
                }
            };
            let Some((event, targets)) = next else {
                break;
            };
            deliver(&targets, &event);
        }
    }
}

/// Disposable subscription handle; releasing (or dropping) it decrements the
/// hub's reference count.
pub struct Subscription {
    hub: Weak<RefCell<HubInner>>,
    id: Option<SubscriberId>,
}

impl Subscription {
    pub fn release(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        let Some(id) = self.id.take() else {
            return;
        };
        if let Some(inner) = self.hub.upgrade() {
            SyncHub { inner }.release(id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release_now();
    }
}

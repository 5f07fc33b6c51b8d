//! Session lifecycle control.
//!
//! A focus session owns exactly one interception loop. The controller
//! establishes the interface, hands the loop and the expiry worker a
//! shared [`SessionState`], and tears everything down on explicit stop,
//! platform revocation, or timer expiry. The two workers synchronize on
//! nothing but the state's atomic status token.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::dns::matcher::{BlockRule, RuleSet};
use crate::dns::relay::UpstreamRelay;
use crate::engine::{LoopSettings, run_loop};
use crate::error::Result;
use crate::network::tun::{TunConfig, TunProvider};

/// Lifecycle states of an interception session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionStatus {
    Idle = 0,
    Established = 1,
    Running = 2,
    Stopping = 3,
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The owner asked for an explicit stop.
    Stopped,
    /// The session timer reached its end time.
    Expired,
    /// The platform revoked the interception permission.
    Revoked,
}

/// Shared lifecycle state of the single active session.
///
/// The status field is the only token the loop worker and the expiry
/// worker coordinate through; transitions are compare-and-swap so a
/// stop request and a startup never race into an inconsistent state.
#[derive(Debug)]
pub struct SessionState {
    status: AtomicU8,
    reason: Mutex<Option<StopReason>>,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            status: AtomicU8::new(SessionStatus::Idle as u8),
            reason: Mutex::new(None),
        }
    }

    pub fn status(&self) -> SessionStatus {
        match self.status.load(Ordering::SeqCst) {
            1 => SessionStatus::Established,
            2 => SessionStatus::Running,
            3 => SessionStatus::Stopping,
            _ => SessionStatus::Idle,
        }
    }

    /// Whether the interception loop should keep reading.
    #[inline]
    pub fn is_running(&self) -> bool {
        self.status.load(Ordering::SeqCst) == SessionStatus::Running as u8
    }

    /// Mark the interface established. Fails if a session is already
    /// underway.
    pub fn establish(&self) -> bool {
        self.transition(SessionStatus::Idle, SessionStatus::Established)
    }

    /// Move the established session into the running state; called by
    /// the loop as its first act. Fails if a stop arrived in between.
    pub(crate) fn begin_running(&self) -> bool {
        self.transition(SessionStatus::Established, SessionStatus::Running)
    }

    /// Ask the session to shut down. The first caller's reason wins;
    /// returns false if the session was not live.
    pub fn request_stop(&self, reason: StopReason) -> bool {
        let stopped = self.transition(SessionStatus::Running, SessionStatus::Stopping)
            || self.transition(SessionStatus::Established, SessionStatus::Stopping);
        if stopped {
            self.reason.lock().get_or_insert(reason);
        }
        stopped
    }

    /// Return to idle once the loop has released its resources.
    pub(crate) fn finish(&self) {
        self.status
            .store(SessionStatus::Idle as u8, Ordering::SeqCst);
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        *self.reason.lock()
    }

    fn transition(&self, from: SessionStatus, to: SessionStatus) -> bool {
        self.status
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Milliseconds since the Unix epoch.
pub fn unix_time_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
}

/// Tunables for a session, independent of the rule snapshot.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Public resolver queries are forwarded to.
    pub upstream: std::net::SocketAddr,
    /// Bound on one upstream round trip.
    pub forward_timeout: Duration,
    /// Cadence of the end-time check.
    pub expiry_poll_interval: Duration,
    pub loop_settings: LoopSettings,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            upstream: std::net::SocketAddr::from(([8, 8, 8, 8], 53)),
            forward_timeout: Duration::from_secs(5),
            expiry_poll_interval: Duration::from_secs(1),
            loop_settings: LoopSettings::default(),
        }
    }
}

/// Outcome of a session start.
#[derive(Debug)]
pub enum StartOutcome {
    /// The interface is up and the loop is running.
    Started(SessionMonitor),
    /// The rule snapshot was empty; nothing to intercept.
    NothingToBlock,
}

/// Awaitable termination notification for the session owner.
#[derive(Debug)]
pub struct SessionMonitor {
    terminated: watch::Receiver<Option<StopReason>>,
}

impl SessionMonitor {
    /// Wait until the session has fully shut down.
    pub async fn wait(mut self) -> StopReason {
        loop {
            if let Some(reason) = *self.terminated.borrow_and_update() {
                return reason;
            }
            if self.terminated.changed().await.is_err() {
                return StopReason::Stopped;
            }
        }
    }
}

/// Establishes and tears down interception sessions.
///
/// At most one session is live at a time; `start` tears down any
/// previous session before establishing the next interface, and `stop`
/// is an idempotent no-op when nothing is running.
pub struct SessionController<P: TunProvider> {
    provider: P,
    tun_config: TunConfig,
    settings: SessionSettings,
    active: Option<ActiveSession>,
}

struct ActiveSession {
    state: Arc<SessionState>,
    loop_task: JoinHandle<()>,
    expiry_task: JoinHandle<()>,
}

impl<P: TunProvider> SessionController<P> {
    pub fn new(provider: P, tun_config: TunConfig, settings: SessionSettings) -> Self {
        Self {
            provider,
            tun_config,
            settings,
            active: None,
        }
    }

    /// Start a session that blocks `rules` until `end_time_ms`.
    ///
    /// Establishment failures are fatal to the start: no half-built
    /// session is left behind. An empty rule snapshot skips the
    /// interface entirely.
    pub async fn start(&mut self, rules: Vec<BlockRule>, end_time_ms: u64) -> Result<StartOutcome> {
        self.stop().await;

        let rules = RuleSet::new(rules);
        if rules.is_empty() {
            info!("session has no domain rules, skipping interface establishment");
            return Ok(StartOutcome::NothingToBlock);
        }

        let (tun, relay_socket) = self.provider.establish(&self.tun_config)?;
        let relay = UpstreamRelay::from_std(
            relay_socket,
            self.settings.upstream,
            self.settings.forward_timeout,
        )?;

        let state = Arc::new(SessionState::new());
        state.establish();
        info!(
            rules = rules.len(),
            upstream = %self.settings.upstream,
            end_time_ms,
            "interception session established"
        );

        let (terminated_tx, terminated_rx) = watch::channel(None);

        let loop_state = Arc::clone(&state);
        let loop_settings = self.settings.loop_settings;
        let loop_task = tokio::spawn(async move {
            run_loop(tun, relay, rules, Arc::clone(&loop_state), loop_settings).await;
            let reason = loop_state.stop_reason().unwrap_or(StopReason::Stopped);
            loop_state.finish();
            info!(?reason, "interception session torn down");
            let _ = terminated_tx.send(Some(reason));
        });

        let expiry_task = tokio::spawn(expiry_worker(
            Arc::clone(&state),
            end_time_ms,
            self.settings.expiry_poll_interval,
        ));

        self.active = Some(ActiveSession {
            state,
            loop_task,
            expiry_task,
        });
        Ok(StartOutcome::Started(SessionMonitor {
            terminated: terminated_rx,
        }))
    }

    /// Stop the active session, if any, and wait for teardown.
    pub async fn stop(&mut self) {
        self.stop_with(StopReason::Stopped).await;
    }

    /// Tear down after the platform revoked the interception permission.
    pub async fn revoke(&mut self) {
        self.stop_with(StopReason::Revoked).await;
    }

    async fn stop_with(&mut self, reason: StopReason) {
        let Some(session) = self.active.take() else {
            return;
        };
        session.state.request_stop(reason);
        if let Err(err) = session.loop_task.await {
            warn!(error = %err, "interception loop task failed");
        }
        // The expiry worker owns nothing; no need to wait out its tick.
        session.expiry_task.abort();
        let _ = session.expiry_task.await;
    }

    pub fn status(&self) -> SessionStatus {
        self.active
            .as_ref()
            .map_or(SessionStatus::Idle, |session| session.state.status())
    }
}

/// Poll the session end time and request shutdown once it passes.
///
/// Runs independently of the loop worker so a stalled forward can never
/// delay expiry; exits on its own when the session stops early.
async fn expiry_worker(state: Arc<SessionState>, end_time_ms: u64, poll: Duration) {
    loop {
        match state.status() {
            SessionStatus::Established | SessionStatus::Running => {}
            _ => break,
        }
        if unix_time_ms() >= end_time_ms {
            info!("focus session expired, requesting shutdown");
            state.request_stop(StopReason::Expired);
            break;
        }
        tokio::time::sleep(poll).await;
    }
}

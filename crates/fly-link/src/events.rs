use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use fly_proto::telemetry::BatteryInfo;
use tokio::sync::{broadcast, watch};

/// Console lines kept for late subscribers.
pub const CONSOLE_HISTORY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }
}

/// Bounded ring of recent console lines.
#[derive(Debug)]
pub struct ConsoleLog {
    lines: Mutex<VecDeque<String>>,
    cap: usize,
}

impl ConsoleLog {
    pub fn new(cap: usize) -> Self {
        Self { lines: Mutex::new(VecDeque::with_capacity(cap)), cap: cap.max(1) }
    }

    pub fn push(&self, line: String) {
        let mut lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        while lines.len() >= self.cap {
            lines.pop_front();
        }
        lines.push_back(line);
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner).iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

/// Every stream the session publishes. State, status and battery replay their
/// latest value to new subscribers; console lines fan out live and are kept in `console_log`.
#[derive(Debug)]
pub(crate) struct LinkEvents {
    pub state: watch::Sender<ConnectionState>,
    /// Bumped once per successful connect, before the state flips to `Connected`.
    pub session: watch::Sender<u64>,
    pub status: watch::Sender<String>,
    pub battery: watch::Sender<Option<BatteryInfo>>,
    pub console: broadcast::Sender<String>,
    pub console_log: ConsoleLog,
}

impl LinkEvents {
    pub fn new() -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (session, _) = watch::channel(0);
        let (status, _) = watch::channel(String::new());
        let (battery, _) = watch::channel(None);
        let (console, _) = broadcast::channel(CONSOLE_HISTORY);
        Self { state, session, status, battery, console, console_log: ConsoleLog::new(CONSOLE_HISTORY) }
    }

    pub fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    pub fn new_session(&self) -> u64 {
        self.session.send_modify(|n| *n += 1);
        *self.session.borrow()
    }

    pub fn set_status(&self, msg: impl Into<String>) {
        self.status.send_replace(msg.into());
    }

    pub fn battery(&self, info: BatteryInfo) {
        self.battery.send_replace(Some(info));
    }

    pub fn console(&self, line: String) {
        self.console_log.push(line.clone());
        // no live subscribers is fine
        let _ = self.console.send(line);
    }
}

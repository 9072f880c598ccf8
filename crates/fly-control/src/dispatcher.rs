//! Periodic setpoint stream.
//!
//! While the link is connected and the dispatcher is armed, the latest cached
//! `CommandFrame` is encoded and queued every `period_ms`, changed or not.
//! Emergency stop disarms, zeroes the cache and fires a short burst of stop frames.
//! A connect that happens after the stop re-arms.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use fly_link::{ConnectionState, UdpLink};
use fly_proto::commander::{stop_packet, CommandFrame};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::joystick::{stick_to_attitude, throttle_to_thrust, StickPosition};
use crate::ControlConfig;

struct Shared {
    link: Arc<UdpLink>,
    cfg: ControlConfig,
    frame: Mutex<CommandFrame>,
    armed: watch::Sender<bool>,
    /// Link session the last emergency stop happened in.
    stopped_in: AtomicU64,
    ticks: AtomicU64,
}

impl Shared {
    fn frame(&self) -> CommandFrame {
        *self.frame.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update(&self, f: impl FnOnce(&mut CommandFrame)) {
        let mut frame = self.frame.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut *frame);
    }
}

pub struct ControlDispatcher {
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ControlDispatcher {
    pub fn new(link: Arc<UdpLink>, cfg: ControlConfig) -> Self {
        let (armed, _) = watch::channel(true);
        Self {
            shared: Arc::new(Shared {
                link,
                cfg,
                frame: Mutex::new(CommandFrame::stop()),
                armed,
                stopped_in: AtomicU64::new(0),
                ticks: AtomicU64::new(0),
            }),
            task: Mutex::new(None),
        }
    }

    /// Spawns the supervisor. It ticks whenever the link is connected and the
    /// dispatcher is armed, and idles otherwise. Calling twice is a no-op.
    pub fn start(&self) {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }
        *task = Some(tokio::spawn(supervise(self.shared.clone())));
    }

    /// Stops the supervisor for good (shutdown). Use `emergency_stop` to halt motors.
    pub fn shutdown(&self) {
        if let Some(t) = self.task.lock().unwrap_or_else(PoisonError::into_inner).take() {
            t.abort();
        }
    }

    pub fn update_attitude(&self, stick: StickPosition) {
        let (roll, pitch) = stick_to_attitude(stick);
        self.shared.update(|f| {
            f.roll_deg = roll;
            f.pitch_deg = pitch;
        });
    }

    pub fn update_throttle(&self, throttle: f32) {
        let thrust = throttle_to_thrust(throttle);
        self.shared.update(|f| f.thrust = thrust);
    }

    pub fn set_yaw_rate(&self, yaw_rate_deg_s: f32) {
        self.shared.update(|f| f.yaw_rate_deg_s = yaw_rate_deg_s);
    }

    pub fn set_frame(&self, frame: CommandFrame) {
        self.shared.update(|f| *f = frame);
    }

    pub fn hover(&self) {
        self.set_frame(CommandFrame::hover(self.shared.cfg.hover_thrust));
    }

    pub fn frame(&self) -> CommandFrame {
        self.shared.frame()
    }

    pub fn is_armed(&self) -> bool {
        *self.shared.armed.borrow()
    }

    /// Setpoint frames queued by the periodic tick so far.
    pub fn ticks_sent(&self) -> u64 {
        self.shared.ticks.load(Ordering::SeqCst)
    }

    /// Re-enables the periodic stream after an emergency stop.
    pub fn resume(&self) {
        if !self.shared.armed.send_replace(true) {
            info!("control: resumed");
        }
    }

    /// Zeroes the cached command, halts the periodic stream and sends a burst
    /// of stop frames. Returns how many the link accepted.
    pub async fn emergency_stop(&self) -> u32 {
        self.set_frame(CommandFrame::stop());
        self.shared.stopped_in.store(self.shared.link.session_id(), Ordering::SeqCst);
        self.shared.armed.send_replace(false);
        warn!("control: emergency stop");

        let cfg = &self.shared.cfg;
        let gap = Duration::from_millis(cfg.stop_burst_gap_ms);
        let mut accepted = 0;
        for i in 0..cfg.stop_burst {
            if self.shared.link.send(stop_packet()) {
                accepted += 1;
            }
            if i + 1 < cfg.stop_burst {
                tokio::time::sleep(gap).await;
            }
        }
        accepted
    }
}

impl Drop for ControlDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn supervise(shared: Arc<Shared>) {
    let mut state = shared.link.subscribe_state();
    let mut sessions = shared.link.subscribe_sessions();
    let mut armed = shared.armed.subscribe();

    loop {
        let session = *sessions.borrow_and_update();
        // a connect newer than the last emergency stop re-arms
        if !*shared.armed.borrow() && session > shared.stopped_in.load(Ordering::SeqCst) {
            info!("control: re-armed by session {}", session);
            shared.armed.send_replace(true);
        }

        let connected = state.borrow_and_update().is_connected();
        if connected && *armed.borrow_and_update() {
            run_ticks(&shared, &mut state, &mut armed).await;
            continue;
        }

        tokio::select! {
            r = state.changed() => if r.is_err() { break },
            r = sessions.changed() => if r.is_err() { break },
            r = armed.changed() => if r.is_err() { break },
        }
    }
    debug!("control: supervisor stopped");
}

/// Returns as soon as the link leaves `Connected` or the dispatcher is disarmed.
async fn run_ticks(
    shared: &Shared,
    state: &mut watch::Receiver<ConnectionState>,
    armed: &mut watch::Receiver<bool>,
) {
    let period = Duration::from_millis(shared.cfg.period_ms.max(1));
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!("control: streaming setpoints every {:?}", period);

    loop {
        tokio::select! {
            biased;
            r = state.changed() => {
                if r.is_err() || !state.borrow().is_connected() {
                    break;
                }
            }
            r = armed.changed() => {
                if r.is_err() || !*armed.borrow() {
                    break;
                }
            }
            _ = interval.tick() => {
                if shared.link.send(shared.frame().to_packet()) {
                    shared.ticks.fetch_add(1, Ordering::SeqCst);
                }
            }
        }
    }
    info!("control: setpoint stream halted");
}

use log::info;
use std::sync::{Arc, Mutex};
use tokio::{
    task::JoinHandle,
    time::{Duration, Instant, interval},
};

use crate::{channel::BusHandle, message::TimerMessage};

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_millis(1000);
pub const CONNECTION_TIMEOUT: Duration = Duration::from_millis(3000);
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Master-side liveness tracking for the Audience context. There is no
/// connection-oriented transport underneath, so "connected" means a
/// heartbeat was observed recently.
#[derive(Debug)]
pub struct ConnectionMonitor {
    handle: BusHandle,
    last_heartbeat: Arc<Mutex<Option<Instant>>>,
    change_rx: tokio::sync::watch::Receiver<Option<Instant>>,
    listen_join: JoinHandle<()>,
}

impl ConnectionMonitor {
    pub fn new(handle: BusHandle) -> Self {
        let last_heartbeat = Arc::new(Mutex::new(None));
        let (change_tx, change_rx) = tokio::sync::watch::channel(None);
        let mut rx = handle.subscribe();
        let seen = last_heartbeat.clone();
        let listen_join = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if matches!(message, TimerMessage::AudienceHeartbeat) {
                    let now = Instant::now();
                    *seen.lock().unwrap() = Some(now);
                    change_tx.send_replace(Some(now));
                }
            }
        });
        Self {
            handle,
            last_heartbeat,
            change_rx,
            listen_join,
        }
    }

    /// True iff a heartbeat arrived within the last [`CONNECTION_TIMEOUT`].
    /// False before the first heartbeat is ever observed.
    pub fn is_connected(&self) -> bool {
        self.is_connected_at(Instant::now())
    }

    fn is_connected_at(&self, now: Instant) -> bool {
        match *self.last_heartbeat.lock().unwrap() {
            Some(seen) => now.duration_since(seen) < CONNECTION_TIMEOUT,
            None => false,
        }
    }

    /// Notified at least once per heartbeat arrival. The monitor does not
    /// schedule timeout-expiry notifications itself; combine this with a
    /// periodic re-poll of [`is_connected`](Self::is_connected) to observe
    /// silent disconnection.
    pub fn changes(&self) -> tokio::sync::watch::Receiver<Option<Instant>> {
        self.change_rx.clone()
    }

    /// Resolves `true` as soon as the audience is connected, `false` once
    /// `timeout` elapses. Sends one `MASTER_PING` to prompt an immediate
    /// heartbeat from an already-open Audience context.
    pub async fn wait_for_audience(&self, timeout: Duration) -> bool {
        if self.is_connected() {
            return true;
        }

        self.handle.send(&TimerMessage::MasterPing);

        let deadline = Instant::now() + timeout;
        let mut poll = interval(WAIT_POLL_INTERVAL);
        poll.tick().await;
        loop {
            poll.tick().await;
            if self.is_connected() {
                return true;
            }
            if Instant::now() >= deadline {
                info!(
                    "[{}] no audience detected within {timeout:?}",
                    self.handle.channel_name()
                );
                return false;
            }
        }
    }
}

impl Drop for ConnectionMonitor {
    fn drop(&mut self) {
        self.listen_join.abort();
    }
}

/// Audience-side heartbeat emitter: one beat immediately on start, then one
/// every [`HEARTBEAT_INTERVAL`], until stopped or dropped.
#[derive(Debug)]
pub struct HeartbeatSender {
    handle: BusHandle,
    join: Option<JoinHandle<()>>,
}

impl HeartbeatSender {
    pub fn new(handle: BusHandle) -> Self {
        Self { handle, join: None }
    }

    pub fn is_running(&self) -> bool {
        self.join.is_some()
    }

    pub fn start(&mut self) {
        if self.join.is_some() {
            return;
        }
        info!("[{}] starting audience heartbeat", self.handle.channel_name());
        let handle = self.handle.clone();
        self.join = Some(tokio::spawn(async move {
            let mut beat = interval(HEARTBEAT_INTERVAL);
            loop {
                beat.tick().await;
                handle.send(&TimerMessage::AudienceHeartbeat);
            }
        }));
    }

    pub fn stop(&mut self) {
        if let Some(join) = self.join.take() {
            info!("[{}] stopping audience heartbeat", self.handle.channel_name());
            join.abort();
        }
    }
}

impl Drop for HeartbeatSender {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::channel::MessageBus;

    #[tokio::test(start_paused = true)]
    async fn test_connection_decay() {
        let bus = MessageBus::new();
        let master = bus.open("duel");
        let audience = bus.open("duel");

        let monitor = ConnectionMonitor::new(master);
        assert!(!monitor.is_connected());

        let mut heartbeat = HeartbeatSender::new(audience);
        heartbeat.start();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(monitor.is_connected());

        // Heartbeats keep the connection alive indefinitely
        tokio::time::sleep(Duration::from_millis(5000)).await;
        assert!(monitor.is_connected());

        // Silence decays after the timeout window
        heartbeat.stop();
        tokio::time::sleep(Duration::from_millis(3100)).await;
        assert!(!monitor.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_start_is_idempotent() {
        let bus = MessageBus::new();
        let master = bus.open("duel");
        let audience = bus.open("duel");
        let mut rx = master.subscribe();

        let mut heartbeat = HeartbeatSender::new(audience);
        heartbeat.start();
        heartbeat.start();
        assert!(heartbeat.is_running());

        tokio::time::sleep(Duration::from_millis(2050)).await;
        heartbeat.stop();
        heartbeat.stop();

        // One immediate beat plus one per interval, not doubled
        let mut beats = 0;
        while let Ok(message) = rx.try_recv() {
            assert_eq!(message, TimerMessage::AudienceHeartbeat);
            beats += 1;
        }
        assert_eq!(beats, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_changes_notified_per_heartbeat() {
        let bus = MessageBus::new();
        let master = bus.open("duel");
        let audience = bus.open("duel");

        let monitor = ConnectionMonitor::new(master);
        let mut changes = monitor.changes();
        assert!(changes.borrow().is_none());

        audience.send(&TimerMessage::AudienceHeartbeat);
        changes.changed().await.unwrap();
        assert!(changes.borrow().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_audience_times_out() {
        let bus = MessageBus::new();
        let monitor = ConnectionMonitor::new(bus.open("duel"));
        assert!(!monitor.wait_for_audience(Duration::from_millis(500)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_audience_sees_heartbeat() {
        let bus = MessageBus::new();
        let master = bus.open("duel");
        let audience = bus.open("duel");

        let monitor = ConnectionMonitor::new(master);
        let waiter = tokio::spawn(async move {
            monitor.wait_for_audience(Duration::from_millis(2000)).await
        });

        tokio::time::sleep(Duration::from_millis(300)).await;
        let mut heartbeat = HeartbeatSender::new(audience);
        heartbeat.start();

        assert!(waiter.await.unwrap());
    }
}

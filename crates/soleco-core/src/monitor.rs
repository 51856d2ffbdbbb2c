// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of SolEco Bridge.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::device::DeviceClient;
use crate::error::FetchError;
use crate::metrics::{REGISTRY, Value, decode_all};

/// Consecutive fetch failures tolerated before the device is reported
/// unavailable. A sustained outage still surfaces within three poll
/// intervals.
const FAILURE_THRESHOLD: u32 = 3;

/// Receives a payload-free nudge whenever the published snapshot changed.
/// Subscribers re-read [`DeviceMonitor::snapshot`]; nothing is pushed.
pub trait ChangeListener: Send + Sync {
    fn snapshot_changed(&self);
}

/// Last-known decoded state of the device.
///
/// Handed out behind `Arc` and replaced wholesale on every update, so a
/// reader never observes a half-written value map.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub values: BTreeMap<&'static str, Option<Value>>,
    pub available: bool,
    pub night_mode: bool,
    pub last_success: Option<DateTime<Utc>>,
}

impl Snapshot {
    fn initial() -> Self {
        Self {
            values: REGISTRY.iter().map(|spec| (spec.name, None)).collect(),
            available: false,
            night_mode: false,
            last_success: None,
        }
    }
}

struct MonitorState {
    consecutive_failures: u32,
    night_mode: bool,
}

/// Polls the device, tracks availability and publishes snapshots.
///
/// A device that has never answered reports unavailable from the start;
/// the first successful poll flips it.
pub struct DeviceMonitor {
    client: DeviceClient,
    state: Mutex<MonitorState>,
    snapshot: RwLock<Arc<Snapshot>>,
    listeners: RwLock<Vec<Arc<dyn ChangeListener>>>,
    poll_in_flight: AtomicBool,
}

impl std::fmt::Debug for DeviceMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceMonitor")
            .field("client", &self.client)
            .field("listeners", &self.listeners.read().len())
            .finish_non_exhaustive()
    }
}

impl DeviceMonitor {
    #[must_use]
    pub fn new(client: DeviceClient) -> Self {
        Self {
            client,
            state: Mutex::new(MonitorState {
                consecutive_failures: 0,
                night_mode: false,
            }),
            snapshot: RwLock::new(Arc::new(Snapshot::initial())),
            listeners: RwLock::new(Vec::new()),
            poll_in_flight: AtomicBool::new(false),
        }
    }

    /// Current snapshot. Cheap; clones an `Arc`.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.snapshot.read())
    }

    #[must_use]
    pub fn is_available(&self) -> bool {
        self.snapshot.read().available
    }

    #[must_use]
    pub fn is_night_mode(&self) -> bool {
        self.snapshot.read().night_mode
    }

    /// Register a subscriber for snapshot-change nudges.
    pub fn subscribe(&self, listener: Arc<dyn ChangeListener>) {
        self.listeners.write().push(listener);
    }

    /// Run one poll cycle: fetch a status line, decode it and publish.
    ///
    /// A no-op while night mode is active. A trigger arriving while a
    /// previous cycle is still in flight is ignored, so the socket is
    /// never used concurrently.
    pub async fn poll(&self) {
        if self.state.lock().night_mode {
            debug!("night mode active, skipping poll");
            return;
        }
        if self.poll_in_flight.swap(true, Ordering::Acquire) {
            debug!("previous poll still in flight, ignoring trigger");
            return;
        }

        let result = self.client.fetch_line().await;
        self.apply_poll_result(result);
        self.poll_in_flight.store(false, Ordering::Release);
    }

    /// Suspend or resume polling. Idempotent.
    ///
    /// Entering night mode marks the device unavailable immediately while
    /// keeping the last known values; leaving it lets the next scheduled
    /// poll run normally rather than forcing one here.
    pub fn set_night_mode(&self, night_mode: bool) {
        {
            let mut state = self.state.lock();
            if state.night_mode == night_mode {
                return;
            }
            state.night_mode = night_mode;
        }

        if night_mode {
            info!("entering night mode, polling paused until morning");
        } else {
            info!("leaving night mode, polling resumes on the next tick");
        }

        let mut next = Snapshot::clone(&self.snapshot());
        next.night_mode = night_mode;
        if night_mode {
            next.available = false;
        }
        self.publish(next);
        self.notify();
    }

    fn apply_poll_result(&self, result: Result<String, FetchError>) {
        match result {
            Ok(line) => {
                debug!(line = %line, "decoding status line");
                let values = decode_all(&line, &REGISTRY);
                self.state.lock().consecutive_failures = 0;
                self.publish(Snapshot {
                    values,
                    available: true,
                    night_mode: false,
                    last_success: Some(Utc::now()),
                });
            }
            Err(e) => {
                let failures = {
                    let mut state = self.state.lock();
                    state.consecutive_failures += 1;
                    state.consecutive_failures
                };
                if failures <= FAILURE_THRESHOLD {
                    warn!(error = %e, attempt = failures, "device fetch failed");
                } else {
                    error!(error = %e, attempt = failures, "repeated device fetch failures");
                }
                // Stale values are retained; only availability decays.
                if failures >= FAILURE_THRESHOLD && self.is_available() {
                    let mut next = Snapshot::clone(&self.snapshot());
                    next.available = false;
                    self.publish(next);
                }
            }
        }
        // One nudge per completed cycle, success or failure.
        self.notify();
    }

    fn publish(&self, snapshot: Snapshot) {
        *self.snapshot.write() = Arc::new(snapshot);
    }

    fn notify(&self) {
        for listener in self.listeners.read().iter() {
            listener.snapshot_changed();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::net::SocketAddr;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    const STATUS_LINE: &str = "R:1 F:1 U:24 230V 1500mA 250W 50Hz 35C 60:5C 120us 415Wh";

    /// Fake device that answers one connection per script entry:
    /// `Some(line)` serves the line, `None` closes without sending
    /// anything (which the client reports as an empty response).
    async fn scripted_device(script: Vec<Option<&'static str>>) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind fake device");
        let addr = listener.local_addr().expect("no local addr");

        tokio::spawn(async move {
            for step in script {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                if let Some(line) = step {
                    let _ = socket.write_all(line.as_bytes()).await;
                    let _ = socket.write_all(b"\n").await;
                }
            }
        });

        addr
    }

    fn monitor_for(addr: SocketAddr) -> DeviceMonitor {
        DeviceMonitor::new(DeviceClient::new(
            addr.ip().to_string(),
            addr.port(),
            Duration::from_millis(500),
        ))
    }

    /// Monitor pointed at a port nothing listens on.
    async fn unreachable_monitor() -> DeviceMonitor {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        monitor_for(addr)
    }

    #[derive(Default)]
    struct CountingListener(AtomicUsize);

    impl CountingListener {
        fn count(&self) -> usize {
            self.0.load(Ordering::SeqCst)
        }
    }

    impl ChangeListener for CountingListener {
        fn snapshot_changed(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    // -----------------------------------------------------------------------
    // Initial state and the happy path
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn starts_unavailable_with_all_values_absent() {
        let monitor = unreachable_monitor().await;
        let snapshot = monitor.snapshot();

        assert!(!snapshot.available);
        assert!(!snapshot.night_mode);
        assert!(snapshot.last_success.is_none());
        assert_eq!(snapshot.values.len(), REGISTRY.len());
        assert!(snapshot.values.values().all(Option::is_none));
    }

    #[tokio::test]
    async fn successful_poll_publishes_values_and_availability() {
        let addr = scripted_device(vec![Some(STATUS_LINE)]).await;
        let monitor = monitor_for(addr);

        monitor.poll().await;

        let snapshot = monitor.snapshot();
        assert!(snapshot.available);
        assert!(snapshot.last_success.is_some());
        assert_eq!(snapshot.values["voltage"], Some(Value::Int(230)));
        assert_eq!(
            snapshot.values["relay"],
            Some(Value::Text("1".to_owned()))
        );
    }

    // -----------------------------------------------------------------------
    // Failure counting and availability decay
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn two_failures_leave_availability_untouched() {
        let addr = scripted_device(vec![Some(STATUS_LINE), None, None]).await;
        let monitor = monitor_for(addr);

        monitor.poll().await;
        monitor.poll().await;
        monitor.poll().await;

        assert!(monitor.is_available(), "two failures must not flip it");
    }

    #[tokio::test]
    async fn third_failure_marks_unavailable_but_keeps_values() {
        let addr = scripted_device(vec![Some(STATUS_LINE), None, None, None]).await;
        let monitor = monitor_for(addr);

        for _ in 0..4 {
            monitor.poll().await;
        }

        let snapshot = monitor.snapshot();
        assert!(!snapshot.available);
        // Stale data is kept, not cleared.
        assert_eq!(snapshot.values["voltage"], Some(Value::Int(230)));
    }

    #[tokio::test]
    async fn success_resets_the_failure_count() {
        // Two failures, a success, two more failures: the counter restarted,
        // so the threshold is never reached.
        let addr = scripted_device(vec![
            Some(STATUS_LINE),
            None,
            None,
            Some(STATUS_LINE),
            None,
            None,
        ])
        .await;
        let monitor = monitor_for(addr);

        for _ in 0..6 {
            monitor.poll().await;
        }

        assert!(monitor.is_available());
    }

    #[tokio::test]
    async fn single_success_recovers_from_outage() {
        let addr = scripted_device(vec![None, None, None, Some(STATUS_LINE)]).await;
        let monitor = monitor_for(addr);

        for _ in 0..3 {
            monitor.poll().await;
        }
        assert!(!monitor.is_available());

        monitor.poll().await;
        assert!(monitor.is_available());
        assert_eq!(
            monitor.snapshot().values["day_energy"],
            Some(Value::Int(415))
        );
    }

    #[tokio::test]
    async fn empty_responses_count_toward_the_threshold() {
        // `None` script steps produce EmptyResponse, not socket errors;
        // they still decay availability like any other failure.
        let addr = scripted_device(vec![None, None, None]).await;
        let monitor = monitor_for(addr);

        monitor.poll().await;
        monitor.poll().await;
        assert!(!monitor.is_available(), "still the fail-safe default");

        monitor.poll().await;
        assert!(!monitor.is_available());
    }

    // -----------------------------------------------------------------------
    // Night mode
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn night_mode_pauses_polling_and_keeps_last_values() {
        let addr = scripted_device(vec![Some(STATUS_LINE), Some("R:0 0V 0Wh")]).await;
        let monitor = monitor_for(addr);

        monitor.poll().await;
        monitor.set_night_mode(true);

        let before = monitor.snapshot();
        assert!(!before.available);
        assert!(before.night_mode);
        assert_eq!(before.values["voltage"], Some(Value::Int(230)));

        // Paused polls consume nothing from the script and change nothing.
        monitor.poll().await;
        monitor.poll().await;
        let after = monitor.snapshot();
        assert_eq!(after.values["voltage"], Some(Value::Int(230)));
        assert!(!after.available);

        // Leaving night mode does not poll by itself.
        monitor.set_night_mode(false);
        assert!(!monitor.is_available());

        // The next scheduled poll runs the normal path again.
        monitor.poll().await;
        assert!(monitor.is_available());
        assert_eq!(monitor.snapshot().values["voltage"], Some(Value::Int(0)));
    }

    #[tokio::test]
    async fn night_mode_failure_count_is_frozen() {
        // Two failures, then a long paused stretch: the pause must not
        // push the counter over the threshold.
        let addr = scripted_device(vec![Some(STATUS_LINE), None, None]).await;
        let monitor = monitor_for(addr);

        for _ in 0..3 {
            monitor.poll().await;
        }
        assert!(monitor.is_available());

        monitor.set_night_mode(true);
        for _ in 0..5 {
            monitor.poll().await;
        }
        monitor.set_night_mode(false);

        // One more failure would only be the third strike if the paused
        // polls had counted.
        assert!(monitor.is_available());
    }

    // -----------------------------------------------------------------------
    // Change notifications
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn each_active_poll_notifies_exactly_once() {
        let addr = scripted_device(vec![Some(STATUS_LINE), None]).await;
        let monitor = monitor_for(addr);
        let listener = Arc::new(CountingListener::default());
        monitor.subscribe(Arc::clone(&listener) as Arc<dyn ChangeListener>);

        monitor.poll().await;
        assert_eq!(listener.count(), 1);

        monitor.poll().await;
        assert_eq!(listener.count(), 2, "failed polls notify too");
    }

    #[tokio::test]
    async fn paused_polls_do_not_notify() {
        let monitor = unreachable_monitor().await;
        let listener = Arc::new(CountingListener::default());
        monitor.subscribe(Arc::clone(&listener) as Arc<dyn ChangeListener>);

        monitor.set_night_mode(true);
        assert_eq!(listener.count(), 1);

        monitor.poll().await;
        monitor.poll().await;
        assert_eq!(listener.count(), 1);
    }

    #[tokio::test]
    async fn set_night_mode_is_idempotent() {
        let monitor = unreachable_monitor().await;
        let listener = Arc::new(CountingListener::default());
        monitor.subscribe(Arc::clone(&listener) as Arc<dyn ChangeListener>);

        monitor.set_night_mode(true);
        monitor.set_night_mode(true);
        assert_eq!(listener.count(), 1, "repeated transition must not re-emit");

        monitor.set_night_mode(false);
        monitor.set_night_mode(false);
        assert_eq!(listener.count(), 2);
    }
}

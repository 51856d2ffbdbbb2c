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

use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveTime};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use soleco_core::DeviceMonitor;

use crate::config::BridgeConfig;

/// Decides whether polling should pause for the night.
///
/// With `pause_at_night` disabled, or enabled without a configured
/// `[night]` window, the gate never pauses. The missing-window hint is
/// logged a single time.
#[derive(Debug)]
pub struct NightGate {
    pause_at_night: bool,
    window: Option<(NaiveTime, NaiveTime)>,
    missing_window_warned: bool,
}

impl NightGate {
    #[must_use]
    pub fn new(pause_at_night: bool, window: Option<(NaiveTime, NaiveTime)>) -> Self {
        Self {
            pause_at_night,
            window,
            missing_window_warned: false,
        }
    }

    /// Whether `now` falls inside the configured night window.
    pub fn is_night(&mut self, now: NaiveTime) -> bool {
        if !self.pause_at_night {
            return false;
        }
        let Some((start, end)) = self.window else {
            if !self.missing_window_warned {
                warn!(
                    "pause_at_night is enabled but no [night] window is configured; \
                     polling will continue around the clock"
                );
                self.missing_window_warned = true;
            }
            return false;
        };
        if start <= end {
            now >= start && now < end
        } else {
            // Window crosses midnight, e.g. 21:30 to 06:00.
            now >= start || now < end
        }
    }
}

/// Spawns the background task that drives the monitor on a fixed interval.
///
/// The first tick fires immediately, so the snapshot fills right after
/// startup instead of one interval later. `poll()` blocks only this task;
/// the serving path reads snapshots without ever waiting on the socket.
pub fn spawn_poll_task(monitor: Arc<DeviceMonitor>, config: &BridgeConfig) -> JoinHandle<()> {
    let interval = Duration::from_secs(config.poll.interval_secs);
    let window = config.night.as_ref().and_then(|n| n.window().ok());
    let mut gate = NightGate::new(config.poll.pause_at_night, window);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        info!(interval_secs = interval.as_secs(), "poll task started");

        loop {
            ticker.tick().await;

            if gate.is_night(Local::now().time()) {
                monitor.set_night_mode(true);
                continue;
            }
            monitor.set_night_mode(false);
            monitor.poll().await;
        }
    })
}

//! Periodic "still working" line while a long task runs.

use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{select, Sender};

use crate::tasks::LogSink;

/// Logs a liveness line on a fixed interval until dropped.
///
/// The line is independent of actual progress; it only tells the user the
/// task has not hung.
pub struct Heartbeat {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Heartbeat {
    pub fn start(interval: Duration, label: &str, log: LogSink) -> Self {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);
        let ticker = crossbeam_channel::tick(interval);
        let message = format!("{label}: sigo trabajando... (esto es normal)");

        let spawned = std::thread::Builder::new()
            .name("task-heartbeat".into())
            .spawn(move || loop {
                select! {
                    recv(ticker) -> _ => log.line(&message),
                    recv(stop_rx) -> _ => break,
                }
            });

        match spawned {
            Ok(handle) => Self {
                stop: Some(stop_tx),
                handle: Some(handle),
            },
            Err(e) => {
                tracing::warn!("Heartbeat thread could not start: {}", e);
                Self::disabled()
            }
        }
    }

    pub fn disabled() -> Self {
        Self {
            stop: None,
            handle: None,
        }
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        // Disconnecting the stop channel wakes the select.
        self.stop.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

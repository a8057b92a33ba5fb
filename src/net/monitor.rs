//! Connectivity monitoring.
//!
//! Platform hints arrive over a channel and flip the state immediately, but
//! the platform's word is not final: an ONLINE hint is followed by a probe
//! of the server's health endpoint, and a periodic probe corrects drift
//! either way. Captive portals routinely report online while nothing works.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

/// Connectivity as last observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
  Online,
  Offline,
}

/// A connectivity observation with its timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnStatus {
  pub state: ConnState,
  pub checked_at: DateTime<Utc>,
}

impl ConnStatus {
  fn now(state: ConnState) -> Self {
    Self {
      state,
      checked_at: Utc::now(),
    }
  }

  pub fn is_online(&self) -> bool {
    self.state == ConnState::Online
  }
}

/// Periodically probes the health endpoint and publishes the result over a
/// watch channel. Generic over the probe so tests can substitute stubs.
pub struct NetworkMonitor<P> {
  probe: P,
  interval: Duration,
  status_tx: watch::Sender<ConnStatus>,
  hint_rx: mpsc::Receiver<ConnState>,
}

impl<P, Fut> NetworkMonitor<P>
where
  P: Fn() -> Fut,
  Fut: Future<Output = bool>,
{
  /// Build a monitor. Returns the monitor itself, a receiver for status
  /// updates and a sender for platform hints.
  pub fn new(
    probe: P,
    interval: Duration,
  ) -> (Self, watch::Receiver<ConnStatus>, mpsc::Sender<ConnState>) {
    // Assume offline until the first probe says otherwise
    let (status_tx, status_rx) = watch::channel(ConnStatus::now(ConnState::Offline));
    let (hint_tx, hint_rx) = mpsc::channel(16);

    let monitor = Self {
      probe,
      interval,
      status_tx,
      hint_rx,
    };

    (monitor, status_rx, hint_tx)
  }

  /// Run until every hint sender and every status receiver is gone.
  pub async fn run(mut self) {
    let mut ticker = tokio::time::interval(self.interval);

    loop {
      tokio::select! {
        _ = ticker.tick() => {
          self.check().await;
        }
        hint = self.hint_rx.recv() => {
          match hint {
            Some(ConnState::Offline) => {
              debug!("Platform reports offline");
              self.publish(ConnState::Offline);
            }
            Some(ConnState::Online) => {
              debug!("Platform reports online, probing to confirm");
              self.publish(ConnState::Online);
              self.check().await;
            }
            None => break,
          }
        }
      }

      if self.status_tx.is_closed() {
        break;
      }
    }
  }

  async fn check(&self) {
    let state = if (self.probe)().await {
      ConnState::Online
    } else {
      ConnState::Offline
    };
    self.publish(state);
  }

  fn publish(&self, state: ConnState) {
    let previous = *self.status_tx.borrow();
    if previous.state != state {
      info!(
        "Connectivity changed: {:?} -> {:?} (last check {})",
        previous.state, state, previous.checked_at
      );
    }
    self.status_tx.send_replace(ConnStatus::now(state));
  }
}

//! # Downstream Update Notifications
//!
//! Approved current changes travel to the consumer over a bounded
//! `tokio::sync::mpsc` channel. If the consumer can't take the update within
//! a short wait it is dropped: the next position update produces a fresh one,
//! so there is no retry.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::SendTimeoutError};

/// Errors delivering an update downstream.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NotifyError {
    /// Consumer didn't accept the update within the ready timeout
    #[error("consumer not ready after {0:?}")]
    NotReady(Duration),

    /// Consumer side of the channel is gone
    #[error("consumer disconnected")]
    Closed,
}

/// Current vector sent to the consumer.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CurrentUpdate {
    /// Speed, m/s
    pub magnitude: f64,
    /// Horizontal angle, radians (`atan(north / east)`)
    pub heading: f64,
    /// Always 0.0; OSCAR currents are horizontal
    pub vertical_angle: f64,
}

impl CurrentUpdate {
    pub fn horizontal(magnitude: f64, heading: f64) -> Self {
        Self {
            magnitude,
            heading,
            vertical_angle: 0.0,
        }
    }
}

/// Sending half of the update channel with a bounded readiness wait.
#[derive(Clone, Debug)]
pub struct UpdateSender {
    tx: mpsc::Sender<CurrentUpdate>,
    ready_timeout: Duration,
}

/// Create an update channel holding at most `capacity` pending updates.
pub fn channel(
    capacity: usize,
    ready_timeout: Duration,
) -> (UpdateSender, mpsc::Receiver<CurrentUpdate>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (UpdateSender { tx, ready_timeout }, rx)
}

impl UpdateSender {
    /// Hand `update` to the consumer, waiting at most the ready timeout.
    pub async fn send(&self, update: CurrentUpdate) -> Result<(), NotifyError> {
        self.tx
            .send_timeout(update, self.ready_timeout)
            .await
            .map_err(|e| match e {
                SendTimeoutError::Timeout(_) => NotifyError::NotReady(self.ready_timeout),
                SendTimeoutError::Closed(_) => NotifyError::Closed,
            })
    }
}

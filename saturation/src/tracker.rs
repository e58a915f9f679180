use log::{debug, info, trace, warn};
use metrics::counter;
use nano_common::{
    crypto::{Address, Hash},
    time::{RunClock, TimestampNanos},
    websocket::{Notification, NotificationError, NotificationStream, SubscriptionRequest, Topic},
};
use std::{collections::HashSet, time::Duration};
use strum::Display;

use crate::{config::CountingMode, error::BenchmarkError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum TrackerState {
    Idle,
    Subscribed,
    Counting,
    Complete,
}

/// Counters and timestamps of a completed tracking run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackingReport {
    pub subscribed_at: TimestampNanos,
    pub first_confirmation_at: Option<TimestampNanos>,
    pub completed_at: TimestampNanos,
    pub confirmed: usize,
    pub duplicates: usize,
    pub unexpected: usize,
    pub dropped_elections: usize,
    pub confirmed_hashes: HashSet<Hash>,
}

/// Counts confirmations of the generated blocks on the node notification
/// feed. Owns the stream and every counter, only one task drives it.
pub struct ConfirmationTracker {
    stream: Box<dyn NotificationStream>,
    expected: HashSet<Hash>,
    target: usize,
    mode: CountingMode,
    clock: RunClock,
    state: TrackerState,
    topics: Vec<Topic>,

    confirmed: usize,
    confirmed_hashes: HashSet<Hash>,
    duplicates: usize,
    unexpected: usize,
    dropped_elections: usize,

    subscribed_at: Option<TimestampNanos>,
    first_confirmation_at: Option<TimestampNanos>,
    completed_at: Option<TimestampNanos>,
}

impl ConfirmationTracker {
    pub fn new(
        stream: Box<dyn NotificationStream>,
        expected: impl IntoIterator<Item = Hash>,
        mode: CountingMode,
        clock: RunClock,
    ) -> Self {
        let expected: HashSet<Hash> = expected.into_iter().collect();
        Self {
            stream,
            target: expected.len(),
            expected,
            mode,
            clock,
            state: TrackerState::Idle,
            topics: Vec::new(),
            confirmed: 0,
            confirmed_hashes: HashSet::new(),
            duplicates: 0,
            unexpected: 0,
            dropped_elections: 0,
            subscribed_at: None,
            first_confirmation_at: None,
            completed_at: None,
        }
    }

    pub fn state(&self) -> TrackerState {
        self.state
    }

    pub fn confirmed(&self) -> usize {
        self.confirmed
    }

    /// Subscribe to confirmations of `accounts` and wait for the node to
    /// acknowledge each subscription. Returns when the last one was active.
    pub async fn subscribe(
        &mut self,
        accounts: Vec<Address>,
        track_dropped: bool,
        ack_timeout: Duration,
    ) -> Result<TimestampNanos, BenchmarkError> {
        let mut requests = vec![SubscriptionRequest::subscribe(Topic::Confirmation, accounts)];
        if track_dropped {
            requests.push(SubscriptionRequest::subscribe(Topic::StoppedElection, Vec::new()));
        }

        for request in requests {
            self.stream.send(&request).await.map_err(|e| {
                BenchmarkError::Connectivity(format!("cannot subscribe to {}: {}", request.topic, e))
            })?;
            tokio::time::timeout(ack_timeout, self.wait_ack())
                .await
                .map_err(|_| {
                    BenchmarkError::Connectivity(format!(
                        "no acknowledgment of the {} subscription within {:?}",
                        request.topic, ack_timeout
                    ))
                })??;
            debug!("Subscribed to {}", request.topic);
            self.topics.push(request.topic);
        }

        let now = self.clock.now();
        self.subscribed_at = Some(now);
        self.state = TrackerState::Subscribed;
        info!("Confirmation subscription active for {} blocks", self.target);
        Ok(now)
    }

    async fn wait_ack(&mut self) -> Result<(), BenchmarkError> {
        loop {
            match self.next().await? {
                Notification::Ack(action) if action == "subscribe" => return Ok(()),
                notification => {
                    self.handle(notification);
                }
            }
        }
    }

    async fn next(&mut self) -> Result<Notification, BenchmarkError> {
        loop {
            match self.stream.next_notification().await {
                Ok(Some(notification)) => return Ok(notification),
                Ok(None) | Err(NotificationError::Closed) => {
                    return Err(BenchmarkError::Connectivity(format!(
                        "notification stream closed after {} of {} confirmations",
                        self.confirmed, self.target
                    )))
                }
                Err(NotificationError::InvalidMessage(reason)) => {
                    warn!("Skipping invalid notification: {}", reason);
                }
                Err(e) => return Err(BenchmarkError::Connectivity(e.to_string())),
            }
        }
    }

    /// Apply one notification. Returns true once every expected block is
    /// confirmed.
    pub fn handle(&mut self, notification: Notification) -> bool {
        let event = match notification {
            Notification::Ack(action) => {
                trace!("Ack for {}", action);
                return self.is_complete();
            }
            Notification::Event(event) => event,
        };

        let hash = event.message.hash;
        match event.topic() {
            Some(Topic::Confirmation) => self.on_confirmation(hash),
            Some(Topic::StoppedElection) => {
                if self.expected.contains(&hash) {
                    self.dropped_elections += 1;
                    debug!("Election of {} stopped", hash);
                }
            }
            None => trace!("Discarding {} event", event.topic),
        }
        self.is_complete()
    }

    fn on_confirmation(&mut self, hash: Hash) {
        if self.is_complete() {
            return;
        }

        let expected = self.expected.contains(&hash);
        if !expected {
            self.unexpected += 1;
        }
        let first = expected && self.confirmed_hashes.insert(hash);
        if expected && !first {
            self.duplicates += 1;
        }

        let counted = match self.mode {
            CountingMode::Aggregate => true,
            CountingMode::Distinct => first,
        };
        if !counted {
            return;
        }

        let now = self.clock.now();
        self.confirmed += 1;
        counter!("nano_saturation_confirmations").increment(1u64);
        if self.first_confirmation_at.is_none() {
            self.first_confirmation_at = Some(now);
            self.state = TrackerState::Counting;
        }
        if self.confirmed >= self.target {
            self.completed_at = Some(now);
            self.state = TrackerState::Complete;
            info!("All {} confirmations received", self.target);
        } else if log::log_enabled!(log::Level::Debug) && self.confirmed % 500 == 0 {
            debug!("{}/{} confirmations", self.confirmed, self.target);
        }
    }

    fn is_complete(&self) -> bool {
        self.state == TrackerState::Complete
    }

    /// Consume notifications until every expected block is confirmed, then
    /// unsubscribe and close the stream.
    pub async fn run(mut self) -> Result<TrackingReport, BenchmarkError> {
        let subscribed_at = self.subscribed_at.ok_or_else(|| {
            BenchmarkError::Configuration("confirmation tracking started before subscribing".to_string())
        })?;

        if self.target == 0 {
            self.completed_at = Some(self.clock.now());
            self.state = TrackerState::Complete;
        }
        while !self.is_complete() {
            let notification = self.next().await?;
            self.handle(notification);
        }

        for topic in self.topics.drain(..) {
            if let Err(e) = self.stream.send(&SubscriptionRequest::unsubscribe(topic)).await {
                debug!("Unsubscribe from {} failed: {}", topic, e);
            }
        }
        if let Err(e) = self.stream.close().await {
            debug!("Closing the notification stream failed: {}", e);
        }

        if self.unexpected > 0 || self.duplicates > 0 {
            info!(
                "Ignored {} duplicate and {} unexpected confirmations",
                self.duplicates, self.unexpected
            );
        }

        Ok(TrackingReport {
            subscribed_at,
            first_confirmation_at: self.first_confirmation_at,
            completed_at: self.completed_at.unwrap_or(subscribed_at),
            confirmed: self.confirmed,
            duplicates: self.duplicates,
            unexpected: self.unexpected,
            dropped_elections: self.dropped_elections,
            confirmed_hashes: self.confirmed_hashes,
        })
    }
}

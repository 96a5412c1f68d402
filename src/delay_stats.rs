use std::time::Duration;
use tokio::time::Instant;
use crate::ipc::MqttMessage;
use crate::model::parse_message_descriptor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleOutcome {
    Buffered(usize),
    Complete
}

/// Buffers received readings until the sample is full or the window closes.
#[derive(Debug)]
pub struct DelaySampler {
    limit: usize,
    window: Duration,
    started: Instant,
    samples: Vec<MqttMessage>
}

#[derive(Debug, Clone, PartialEq)]
pub struct DelayReport {
    pub received: usize,
    pub delays: Vec<i64>,
    pub average_ms: i64,
    pub min_ms: i64,
    pub max_ms: i64
}

impl DelaySampler {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self::started_at(limit, window, Instant::now())
    }

    pub fn started_at(limit: usize, window: Duration, started: Instant) -> Self {
        DelaySampler {
            limit,
            window,
            started,
            samples: Vec::with_capacity(limit)
        }
    }

    pub fn received(&self) -> usize {
        self.samples.len()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn window_elapsed(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.started) > self.window
    }

    pub fn record(&mut self, msg: MqttMessage) -> SampleOutcome {
        self.record_at(msg, Instant::now())
    }

    pub fn record_at(&mut self, msg: MqttMessage, now: Instant) -> SampleOutcome {
        if self.is_full() || self.window_elapsed(now) {
            return SampleOutcome::Complete;
        }
        self.samples.push(msg);
        if self.is_full() {
            SampleOutcome::Complete
        } else {
            SampleOutcome::Buffered(self.samples.len())
        }
    }

    fn is_full(&self) -> bool {
        self.samples.len() >= self.limit
    }

    /// Per-message delays for every buffered payload that decodes as a reading.
    /// Returns `None` when nothing usable was buffered.
    pub fn report(&self) -> Option<DelayReport> {
        let mut delays = Vec::with_capacity(self.samples.len());
        for msg in self.samples.iter() {
            match parse_message_descriptor(&msg.payload) {
                Some(descriptor) => match msg.received_at.checked_sub(descriptor.timestamp) {
                    Some(delay) => {
                        info!("Delay: {}", delay);
                        delays.push(delay);
                    }
                    None => {
                        warn!("Skipping out of range timestamp {} on {}", descriptor.timestamp, msg.topic);
                    }
                },
                None => {
                    warn!("Skipping undecodable payload on {}: {}", msg.topic, msg.payload_text());
                }
            }
        }
        let min_ms = *delays.iter().min()?;
        let max_ms = *delays.iter().max()?;
        // the mean of i64 values always fits back into an i64
        let total: i128 = delays.iter().map(|d| *d as i128).sum();
        let average_ms = (total / delays.len() as i128) as i64;
        Some(DelayReport {
            received: self.samples.len(),
            delays,
            average_ms,
            min_ms,
            max_ms
        })
    }
}

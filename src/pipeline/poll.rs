// src/pipeline/poll.rs

//! Polling worker.
//!
//! Drives one poll-and-diff cycle per timer tick: fetch HTML, parse, load
//! the current snapshot, detect changes, deduplicate, persist events and
//! notifications, persist the new snapshot. Strictly single-flight: a tick
//! arriving while a poll is running is skipped outright, never queued.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::{Instant, MissedTickBehavior};

use crate::error::{AppError, Result};
use crate::models::{Config, ScheduleSnapshot};
use crate::pipeline::{ChangeDetector, DedupFilter, NotificationComposer, ScheduleParser};
use crate::storage::SnapshotStore;
use crate::utils::http;

/// Summary of one poll-and-diff cycle.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PollSummary {
    /// Tick was skipped because a poll was already in flight
    pub skipped: bool,
    /// Change events detected against the previous snapshot
    pub changes_detected: usize,
    /// Events discarded as duplicates of recently recorded ones
    pub duplicates_skipped: usize,
    /// Notifications created from accepted events
    pub notifications_created: usize,
    /// Cycle duration in milliseconds
    pub duration_ms: u64,
}

impl PollSummary {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

/// Worker orchestrating the fetch → parse → diff → notify pipeline.
pub struct PollingWorker {
    config: Arc<Config>,
    client: reqwest::Client,
    store: Arc<dyn SnapshotStore>,
    parser: ScheduleParser,
    detector: ChangeDetector,
    dedup: DedupFilter,
    composer: NotificationComposer,
    // Sole mutual exclusion for polls: Idle (false) / Polling (true),
    // transitioned with a single compare-exchange.
    in_flight: AtomicBool,
}

impl PollingWorker {
    /// Create a worker bound to a store.
    pub fn new(config: Arc<Config>, store: Arc<dyn SnapshotStore>) -> Result<Self> {
        let client = http::create_client(&config.source)?;
        let parser = ScheduleParser::new(&config.labels)?;
        let dedup = DedupFilter::new(config.poller.dedup_bucket_secs);
        Ok(Self {
            config,
            client,
            store,
            parser,
            detector: ChangeDetector::new(),
            dedup,
            composer: NotificationComposer::new(),
            in_flight: AtomicBool::new(false),
        })
    }

    /// Run the polling loop on the configured cadence until the task is
    /// dropped.
    pub async fn run(&self) {
        let mut ticker =
            tokio::time::interval(Duration::from_secs(self.config.poller.interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match self.poll_once().await {
                Ok(summary) if summary.skipped => {}
                Ok(summary) => log::info!(
                    "poll complete: {} change(s), {} duplicate(s) skipped, {} notification(s), {} ms",
                    summary.changes_detected,
                    summary.duplicates_skipped,
                    summary.notifications_created,
                    summary.duration_ms
                ),
                // Failures never escape a tick; the next tick proceeds
                // against the unchanged current snapshot.
                Err(_) => {}
            }
        }
    }

    /// Perform exactly one poll-and-diff cycle.
    ///
    /// Returns a skipped summary if a poll is already in flight.
    pub async fn poll_once(&self) -> Result<PollSummary> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::debug!("poll tick skipped: previous poll still running");
            return Ok(PollSummary::skipped());
        }

        let started = Instant::now();
        let result = self.run_cycle().await;
        self.in_flight.store(false, Ordering::Release);

        if let Err(error) = &result {
            log::error!(
                "poll failed at {} after {} ms: {}",
                Utc::now().to_rfc3339(),
                started.elapsed().as_millis(),
                error
            );
        }
        result
    }

    async fn run_cycle(&self) -> Result<PollSummary> {
        let html = self.fetch_schedule().await?;
        self.process_at(&html, Utc::now()).await
    }

    /// Fetch the schedule page with bounded retries and exponential backoff.
    async fn fetch_schedule(&self) -> Result<String> {
        let url = &self.config.source.schedule_url;
        let mut backoff = Duration::from_millis(self.config.source.retry_backoff_ms);
        let attempts = self.config.source.fetch_retries.max(1);

        let mut last_error = AppError::fetch(url.clone(), "no fetch attempt made");
        for attempt in 1..=attempts {
            match self.fetch_once(url).await {
                Ok(html) => return Ok(html),
                // An explicit rate-limit signal is surfaced immediately so
                // callers can back off longer than the retry schedule.
                Err(error @ AppError::RateLimited { .. }) => return Err(error),
                Err(error) => {
                    log::warn!("fetch attempt {attempt}/{attempts} failed: {error}");
                    last_error = error;
                    if attempt < attempts {
                        tokio::time::sleep(backoff).await;
                        backoff *= 2;
                    }
                }
            }
        }
        Err(last_error)
    }

    async fn fetch_once(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?;
        let response = http::check_status(url, response)?;
        Ok(response.text().await?)
    }

    /// Diff the parsed page against the stored snapshot and persist the
    /// results.
    async fn process_at(&self, html: &str, now: DateTime<Utc>) -> Result<PollSummary> {
        let started = Instant::now();

        let records = self.parser.parse(html);
        let previous = self.store.latest_snapshot().await?;
        let snapshot = ScheduleSnapshot::at(now, records);

        let mut summary = PollSummary::default();

        match previous {
            Some(previous) => {
                let events = self
                    .detector
                    .detect(&previous.records, &snapshot.records, now);
                summary.changes_detected = events.len();

                if !events.is_empty() {
                    let window = chrono::Duration::seconds(self.dedup.bucket_secs());
                    let recent = self.store.events_since(now - window).await?;

                    let mut accepted = Vec::new();
                    for event in events {
                        if self.dedup.is_duplicate(&event, &recent) {
                            summary.duplicates_skipped += 1;
                            log::debug!(
                                "duplicate {} event for court {} suppressed",
                                event.change_type.as_str(),
                                event.court_number
                            );
                        } else {
                            accepted.push(event);
                        }
                    }

                    let notifications: Vec<_> =
                        accepted.iter().map(|e| self.composer.compose(e)).collect();
                    summary.notifications_created = notifications.len();

                    self.store.append_events(&accepted).await?;
                    self.store.append_notifications(&notifications).await?;
                }
            }
            None => {
                // First-run baseline: persist the snapshot, emit nothing.
                log::info!(
                    "no previous snapshot; recording baseline with {} record(s)",
                    snapshot.count
                );
            }
        }

        self.store.put_snapshot(&snapshot).await?;
        summary.duration_ms = started.elapsed().as_millis() as u64;
        Ok(summary)
    }
}

//! Live event and log watches
//!
//! A watch is a pull-based iterator over a job's events or logs. Each poll
//! fetches a fresh status snapshot and yields the entries beyond what has
//! already been seen, one at a time. Between polls the watch sleeps for the
//! refresh interval.
//!
//! Termination:
//! - events: the watch ends right after yielding a terminal event, even if
//!   more events arrived in the same poll
//! - logs: the events list is scanned once per poll; if it contains a
//!   terminal event the watch ends after that poll's logs are yielded
//!
//! Cancellation is checked before every poll and during the sleep. A
//! cancelled watch yields one `Err(JobError::Cancelled)` and ends. Any other
//! error is also yielded once and ends the watch.

use std::collections::VecDeque;
use std::time::Duration;

use hpcjob_protocol::{Event, LogEntry};
use tracing::debug;

use crate::signal::CancelToken;

use super::{Job, JobError};

/// Job attributes shown above a live watch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHeader {
    pub id: String,
    pub hpc: String,
    pub maintainer: String,
}

/// Shared polling state of a watch
struct Poller<'a> {
    job: &'a Job,
    interval: Duration,
    cancel: CancelToken,
    polls: usize,
    done: bool,
}

impl<'a> Poller<'a> {
    fn new(job: &'a Job, interval: Duration, cancel: CancelToken) -> Self {
        Self {
            job,
            interval,
            cancel,
            polls: 0,
            done: false,
        }
    }

    /// Sleep (after the first poll) and fetch a status snapshot
    fn poll(&mut self) -> Result<hpcjob_protocol::JobStatus, JobError> {
        if self.polls > 0 && !self.cancel.sleep(self.interval) {
            return Err(JobError::Cancelled);
        }
        if self.cancel.is_cancelled() {
            return Err(JobError::Cancelled);
        }
        let status = self.job.status()?;
        self.polls += 1;
        debug!(
            job_id = %status.record.id,
            poll = self.polls,
            events = status.events.len(),
            logs = status.logs.len(),
            "polled job status"
        );
        Ok(status)
    }

    /// Mark the watch finished and hand the error back
    fn fail(&mut self, err: JobError) -> JobError {
        self.done = true;
        err
    }
}

/// Live watch over a job's events
pub struct EventWatch<'a> {
    poller: Poller<'a>,
    seen: usize,
    pending: VecDeque<Event>,
}

impl<'a> EventWatch<'a> {
    pub(super) fn new(job: &'a Job, interval: Duration, cancel: CancelToken) -> Self {
        Self {
            poller: Poller::new(job, interval, cancel),
            seen: 0,
            pending: VecDeque::new(),
        }
    }

    /// Number of status snapshots fetched so far
    pub fn polls(&self) -> usize {
        self.poller.polls
    }

    /// Number of events seen so far
    pub fn seen(&self) -> usize {
        self.seen
    }
}

impl Iterator for EventWatch<'_> {
    type Item = Result<Event, JobError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.poller.done {
                return None;
            }

            if let Some(event) = self.pending.pop_front() {
                if event.is_terminal() {
                    self.poller.done = true;
                    self.pending.clear();
                }
                return Some(Ok(event));
            }

            match self.poller.poll() {
                Ok(status) => {
                    let total = status.events.len();
                    if total > self.seen {
                        self.pending.extend(status.events.into_iter().skip(self.seen));
                        self.seen = total;
                    }
                }
                Err(err) => return Some(Err(self.poller.fail(err))),
            }
        }
    }
}

/// Live watch over a job's logs
pub struct LogWatch<'a> {
    poller: Poller<'a>,
    seen: usize,
    pending: VecDeque<LogEntry>,
    /// The last poll showed a terminal event; end once `pending` drains
    finishing: bool,
}

impl<'a> LogWatch<'a> {
    pub(super) fn new(job: &'a Job, interval: Duration, cancel: CancelToken) -> Self {
        Self {
            poller: Poller::new(job, interval, cancel),
            seen: 0,
            pending: VecDeque::new(),
            finishing: false,
        }
    }

    /// Number of status snapshots fetched so far
    pub fn polls(&self) -> usize {
        self.poller.polls
    }

    /// Number of log lines seen so far
    pub fn seen(&self) -> usize {
        self.seen
    }
}

impl Iterator for LogWatch<'_> {
    type Item = Result<LogEntry, JobError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.poller.done {
                return None;
            }

            if let Some(entry) = self.pending.pop_front() {
                return Some(Ok(entry));
            }

            if self.finishing {
                self.poller.done = true;
                return None;
            }

            match self.poller.poll() {
                Ok(status) => {
                    self.finishing = status.is_terminal();
                    let total = status.logs.len();
                    if total > self.seen {
                        self.pending.extend(status.logs.into_iter().skip(self.seen));
                        self.seen = total;
                    }
                }
                Err(err) => return Some(Err(self.poller.fail(err))),
            }
        }
    }
}

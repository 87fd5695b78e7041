//! Buffered, append-only data logger.
//!
//! Records are queued in a fixed-capacity ring and drained to a
//! [`LogStorage`] in exact append order. Safety-relevant records (boot,
//! pump transitions, faults) force an immediate flush; samples are batched
//! until `max_buffered_samples` accumulate or the oldest buffered record is
//! `max_buffer_age_ticks` old.
//!
//! ## Failure policy
//!
//! A failed flush is retried once after `retry_backoff_ms`. When the retry
//! also fails the logger is marked degraded and sheds the oldest half of
//! its buffered samples. Critical records are never shed; once the buffer
//! holds nothing else, new records are refused with [`LogError::Overflow`].
//! The last [`ESSENTIAL_RESERVE`] slots only take essential records (see
//! [`LogRecord::is_essential`]), so the record of a lockout or shutdown stop
//! is buffered even after a long outage has filled the rest.
//! At most one failing flush attempt is made per tick, so a dead medium
//! costs a single bounded backoff per cycle. The next successful flush
//! clears the degraded flag.

pub mod record;

use embedded_hal::delay::DelayNs;
use heapless::Deque;
use log::{error, info, warn};

use crate::app::ports::{LogStorage, StorageError};
use crate::clock::Tick;
use crate::config::LoggerConfig;
use crate::error::LogError;

pub use record::{FaultCode, LogRecord, ParseError, RecordKind, RecordPayload};

/// Records held in RAM between flushes.
pub const LOG_BUFFER_CAP: usize = 32;

/// Slots held back for essential records.
pub const ESSENTIAL_RESERVE: usize = 2;

/// Lifetime counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoggerStats {
    /// Records handed to storage.
    pub written: u32,
    /// Samples discarded while degraded or to make room.
    pub dropped_samples: u32,
    /// Records refused because the buffer was full of critical records.
    pub rejected: u32,
    /// Flush attempts that failed after their retry.
    pub failed_flushes: u32,
}

pub struct DataLogger {
    config: LoggerConfig,
    buffer: Deque<LogRecord, LOG_BUFFER_CAP>,
    last_timestamp: Option<Tick>,
    /// Lines appended but not yet confirmed durable.
    pending_sync: bool,
    degraded: bool,
    failed_at: Option<Tick>,
    stats: LoggerStats,
}

impl DataLogger {
    pub fn new(config: LoggerConfig) -> Self {
        Self {
            config,
            buffer: Deque::new(),
            last_timestamp: None,
            pending_sync: false,
            degraded: false,
            failed_at: None,
            stats: LoggerStats::default(),
        }
    }

    /// Queue one record and flush if policy requires.
    ///
    /// A returned error after the record was queued (`WriteFailed`,
    /// `Degraded`) means it is still buffered and will be retried; only
    /// `OutOfOrder` and `Overflow` mean the record was refused.
    pub fn append(
        &mut self,
        record: LogRecord,
        storage: &mut impl LogStorage,
        delay: &mut impl DelayNs,
    ) -> Result<(), LogError> {
        if self.last_timestamp.is_some_and(|last| record.timestamp < last) {
            return Err(LogError::OutOfOrder);
        }
        self.make_room(&record)?;
        if self.buffer.push_back(record).is_err() {
            return Err(LogError::Overflow);
        }
        self.last_timestamp = Some(record.timestamp);

        if self.needs_flush(record.timestamp) {
            self.flush_at(record.timestamp, storage, delay)
        } else {
            Ok(())
        }
    }

    /// Age-based flush for ticks on which nothing was appended.
    pub fn poll(
        &mut self,
        now: Tick,
        storage: &mut impl LogStorage,
        delay: &mut impl DelayNs,
    ) -> Result<(), LogError> {
        if self.needs_flush(now) {
            self.flush_at(now, storage, delay)
        } else {
            Ok(())
        }
    }

    /// Drain everything now (shutdown, tests). Ignores the per-tick attempt
    /// limit.
    pub fn flush(
        &mut self,
        storage: &mut impl LogStorage,
        delay: &mut impl DelayNs,
    ) -> Result<(), LogError> {
        self.failed_at = None;
        let now = self.last_timestamp.unwrap_or(Tick::ZERO);
        self.flush_at(now, storage, delay)
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn stats(&self) -> LoggerStats {
        self.stats
    }

    fn buffered_samples(&self) -> usize {
        self.buffer.iter().filter(|r| !r.kind().is_critical()).count()
    }

    fn needs_flush(&self, now: Tick) -> bool {
        if self.pending_sync {
            return true;
        }
        let Some(oldest) = self.buffer.front() else {
            return false;
        };
        self.buffer.iter().any(|r| r.kind().is_critical())
            || self.buffered_samples() >= usize::from(self.config.max_buffered_samples)
            || now.since(oldest.timestamp) >= u64::from(self.config.max_buffer_age_ticks)
    }

    fn flush_at(
        &mut self,
        now: Tick,
        storage: &mut impl LogStorage,
        delay: &mut impl DelayNs,
    ) -> Result<(), LogError> {
        if self.failed_at == Some(now) {
            return Err(LogError::WriteFailed);
        }

        if let Err(e) = self.drain(storage) {
            warn!(
                "LOG: flush failed ({e}), retrying in {} ms",
                self.config.retry_backoff_ms
            );
            delay.delay_ms(self.config.retry_backoff_ms);
            if let Err(e) = self.drain(storage) {
                return Err(self.degrade(now, e));
            }
        }

        self.failed_at = None;
        if self.degraded {
            self.degraded = false;
            info!("LOG: storage recovered, degraded status cleared");
        }
        Ok(())
    }

    /// Write buffered records front to back, then sync. A record leaves the
    /// buffer only once storage accepted its line.
    fn drain(&mut self, storage: &mut impl LogStorage) -> Result<(), StorageError> {
        while let Some(record) = self.buffer.front() {
            match record.encode_line() {
                Ok(line) => storage.append(line.as_bytes())?,
                Err(_) => error!("LOG: record at tick {} does not encode, dropped", record.timestamp),
            }
            self.buffer.pop_front();
            self.stats.written = self.stats.written.saturating_add(1);
            self.pending_sync = true;
        }
        if self.pending_sync {
            storage.flush()?;
            self.pending_sync = false;
        }
        Ok(())
    }

    fn degrade(&mut self, now: Tick, cause: StorageError) -> LogError {
        self.failed_at = Some(now);
        self.stats.failed_flushes = self.stats.failed_flushes.saturating_add(1);
        let samples = self.buffered_samples();
        let shed = self.shed_oldest_samples(samples.div_ceil(2));
        if !self.degraded {
            error!("LOG: storage failing ({cause}), logger degraded");
        }
        self.degraded = true;
        if shed > 0 {
            warn!("LOG: shed {shed} buffered samples");
        }
        LogError::Degraded
    }

    fn make_room(&mut self, record: &LogRecord) -> Result<(), LogError> {
        let limit = if record.is_essential() {
            LOG_BUFFER_CAP
        } else {
            LOG_BUFFER_CAP - ESSENTIAL_RESERVE
        };
        let excess = (self.buffer.len() + 1).saturating_sub(limit);
        if excess == 0 {
            return Ok(());
        }
        if self.buffered_samples() >= excess {
            self.shed_oldest_samples(excess);
            return Ok(());
        }
        self.degraded = true;
        self.stats.rejected = self.stats.rejected.saturating_add(1);
        error!("LOG: buffer full of unflushed critical records");
        Err(LogError::Overflow)
    }

    /// Remove up to `count` of the oldest samples, keeping every other
    /// record in order. Returns how many were removed.
    fn shed_oldest_samples(&mut self, count: usize) -> usize {
        let mut shed = 0;
        for _ in 0..self.buffer.len() {
            let Some(record) = self.buffer.pop_front() else {
                break;
            };
            if shed < count && !record.kind().is_critical() {
                shed += 1;
            } else {
                // Capacity was just freed by the pop.
                let _ = self.buffer.push_back(record);
            }
        }
        self.stats.dropped_samples = self.stats.dropped_samples.saturating_add(shed as u32);
        shed
    }
}

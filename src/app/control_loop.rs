//! The control loop: the hexagonal core of the sampler.
//!
//! [`ControlLoop`] owns every stateful component (clock, reader, detector,
//! pump, logger, fault monitor, FSM) and runs one cooperative, fixed-order
//! cycle per [`tick`](ControlLoop::tick). All I/O flows through port traits
//! passed in at the call site, so the whole loop runs against mocks.
//!
//! ```text
//!  SensorPort ──▶ ┌──────────────────────────────────┐ ──▶ LogStorage
//!                 │           ControlLoop            │
//! ActuatorPort ◀──│ Reader · Detector · FSM · Pump   │
//!                 │ Logger · FaultMonitor            │
//!                 └──────────────────────────────────┘
//! ```
//!
//! Cycle order: read → detect → FSM decides → apply pump command → tick
//! pump → observe health → record → act on escalation → age-flush log →
//! observe storage.
//!
//! A sensor fault is recorded when its streak starts or its kind changes,
//! not on every faulty tick; the streak itself is carried by the lockout
//! record if it escalates.

use embedded_hal::delay::DelayNs;
use heapless::Vec;
use log::{debug, error, info, warn};

use crate::clock::{Tick, TickCounter, TickSource};
use crate::config::SystemConfig;
use crate::control::detector::ThresholdDetector;
use crate::datalog::{DataLogger, FaultCode, LogRecord, LoggerStats, RecordPayload};
use crate::drivers::pump::{PumpActuator, PumpState, StopReason};
use crate::error::{self, LogError, PumpError, SensorFault, SystemFault};
use crate::fsm::context::{CycleContext, PumpCommand};
use crate::fsm::states::build_state_table;
use crate::fsm::{Fsm, StateId};
use crate::safety::{FaultMonitor, HealthReport};
use crate::sensors::{SensorReader, SensorSample};

use super::ports::{ActuatorPort, LogStorage, SensorPort};

/// Upper bound on records one cycle produces.
const MAX_RECORDS_PER_TICK: usize = 10;

/// Outcome of one control cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickReport {
    pub tick: Tick,
    pub state: StateId,
    pub pump: PumpState,
    pub reading: Result<SensorSample, SensorFault>,
    /// Set only on the cycle a fault escalated.
    pub escalated: Option<SystemFault>,
}

pub struct ControlLoop {
    config: SystemConfig,
    clock: TickCounter,
    reader: SensorReader,
    detector: ThresholdDetector,
    pump: PumpActuator,
    logger: DataLogger,
    monitor: FaultMonitor,
    fsm: Fsm,
    ctx: CycleContext,
    /// Last valid calibrated level, reported in pump records.
    last_level: f32,
    /// Sensor fault of the previous tick, if it failed.
    last_sensor_fault: Option<SensorFault>,
}

impl ControlLoop {
    /// Build the loop from a configuration, rejecting invalid ones.
    ///
    /// Does **not** start the FSM. Call [`start`](Self::start) next.
    pub fn new(config: SystemConfig) -> error::Result<Self> {
        config.validate()?;
        Ok(Self {
            clock: TickCounter::new(),
            reader: SensorReader::new(&config),
            detector: ThresholdDetector::new(config.threshold),
            pump: PumpActuator::new(&config),
            logger: DataLogger::new(config.logger),
            monitor: FaultMonitor::new(&config),
            fsm: Fsm::new(build_state_table(), StateId::Monitoring),
            ctx: CycleContext::new(),
            last_level: 0.0,
            last_sensor_fault: None,
            config,
        })
    }

    /// Enter the initial state and write the session's boot marker.
    pub fn start(&mut self, storage: &mut impl LogStorage, delay: &mut impl DelayNs) {
        self.fsm.start(&mut self.ctx);
        self.append(LogRecord::new(self.clock.now(), RecordPayload::Boot), storage, delay);
        info!(
            "ControlLoop started: rising {:.1} mm, falling {:.1} mm, hold {} ticks",
            self.config.threshold.rising_mm,
            self.config.threshold.falling_mm,
            self.config.threshold.min_hold_ticks
        );
    }

    /// Run one full control cycle.
    ///
    /// The `hw` parameter satisfies **both** [`SensorPort`] and
    /// [`ActuatorPort`], which avoids a double mutable borrow while
    /// keeping the port boundary explicit.
    pub fn tick(
        &mut self,
        hw: &mut (impl SensorPort + ActuatorPort),
        storage: &mut impl LogStorage,
        delay: &mut impl DelayNs,
    ) -> TickReport {
        let now = self.clock.advance();
        let mut records: Vec<RecordPayload, MAX_RECORDS_PER_TICK> = Vec::new();
        let mut transitions: Vec<RecordPayload, 2> = Vec::new();

        // 1. Sense
        let reading = self.reader.read(&self.clock, hw);
        if let Ok(sample) = &reading {
            self.last_level = sample.level_mm;
        }

        // 2. Detect
        let event = self.detector.feed(reading.as_ref());

        // 3. Decide
        self.ctx
            .begin_cycle(now, event, self.pump.state(), self.monitor.latched());
        self.fsm.tick(&mut self.ctx);

        // 4. Act
        let mut start_outcome = None;
        match self.ctx.command {
            PumpCommand::Hold => {}
            PumpCommand::Start => {
                let result = self.pump.start(hw);
                match result {
                    Ok(()) => {
                        let level = self
                            .ctx
                            .pending
                            .take()
                            .map_or(self.last_level, |c| c.triggering_level);
                        self.fsm.force_transition(StateId::Sampling, &mut self.ctx);
                        let _ = transitions.push(RecordPayload::PumpStart { level_mm: level });
                    }
                    Err(PumpError::Cooling) => debug!("CTRL: start deferred, pump cooling"),
                    Err(e) => warn!("CTRL: pump start refused: {e}"),
                }
                start_outcome = Some(result);
            }
            PumpCommand::Stop(reason) => {
                if self.pump.stop(reason, hw) {
                    self.fsm.force_transition(StateId::Cooldown, &mut self.ctx);
                    let _ = transitions.push(RecordPayload::PumpStop {
                        level_mm: self.last_level,
                        reason,
                    });
                }
            }
        }

        // 5. Pump tick: run limit, cooldown, output re-assert
        let was_running = self.pump.state().is_running();
        let pump_state = self.pump.tick(hw);
        if was_running && !pump_state.is_running() {
            let reason = self.pump.last_stop().unwrap_or(StopReason::MaxRunTime);
            self.fsm.force_transition(StateId::Cooldown, &mut self.ctx);
            let _ = transitions.push(RecordPayload::PumpStop {
                level_mm: self.last_level,
                reason,
            });
        }
        let drive_fault = self.pump.take_drive_fault();

        // 6. Observe health
        let assessment = self.monitor.observe(&HealthReport {
            sensor: reading.map(|_| ()),
            pump_start: start_outcome,
            drive_fault: drive_fault.is_some(),
        });

        // 7. Record
        if let Ok(sample) = &reading {
            if now.as_u64() % u64::from(self.config.sample_interval_ticks) == 0 {
                let _ = records.push(RecordPayload::Sample {
                    raw: sample.raw_value,
                    level_mm: sample.level_mm,
                });
            }
        }
        for t in transitions {
            let _ = records.push(t);
        }
        let sensor_fault = reading.err();
        if let Some(fault) = sensor_fault.filter(|f| self.last_sensor_fault != Some(*f)) {
            let code = match fault {
                SensorFault::OutOfRange => FaultCode::SensorOutOfRange,
                SensorFault::Stale => FaultCode::SensorStale,
            };
            let _ = records.push(RecordPayload::Fault {
                code,
                streak: self.monitor.sensor_streak(),
            });
        }
        self.last_sensor_fault = sensor_fault;
        match start_outcome {
            Some(Err(PumpError::DriveFailed(_))) => {
                let _ = records.push(RecordPayload::Fault {
                    code: FaultCode::DriveFault,
                    streak: self.monitor.pump_streak(),
                });
            }
            Some(Err(PumpError::Locked | PumpError::AlreadyRunning)) => {
                let _ = records.push(RecordPayload::Fault {
                    code: FaultCode::PumpRejected,
                    streak: self.monitor.pump_streak(),
                });
            }
            _ => {}
        }
        if let Some(e) = drive_fault {
            warn!("CTRL: pump output fault: {e}");
            let _ = records.push(RecordPayload::Fault {
                code: FaultCode::DriveFault,
                streak: self.monitor.pump_streak(),
            });
        }
        // 8. Act on escalation
        if let Some(fault) = assessment.escalate {
            error!("CTRL: {fault}, locking pump out");
            if self.pump.fault_lock(hw) {
                let _ = records.push(RecordPayload::PumpStop {
                    level_mm: self.last_level,
                    reason: StopReason::Lockout,
                });
            }
            let (code, streak) = match fault {
                SystemFault::SensorFailure => {
                    (FaultCode::LockoutSensor, self.monitor.sensor_streak())
                }
                SystemFault::PumpStuck => (FaultCode::LockoutPump, self.monitor.pump_streak()),
            };
            let _ = records.push(RecordPayload::Fault { code, streak });
            self.ctx.latched = Some(fault);
            self.fsm.force_transition(StateId::SafeIdle, &mut self.ctx);
        }

        for payload in records {
            self.append(LogRecord::new(now, payload), storage, delay);
        }

        // 9. Age-flush
        if let Err(e) = self.logger.poll(now, storage, delay) {
            debug!("CTRL: age flush failed: {e}");
        }

        // 10. Storage health, after this tick's writes
        if self.monitor.observe_storage(self.logger.is_degraded()) {
            let payload = RecordPayload::Fault {
                code: FaultCode::LogDegraded,
                streak: self.logger.stats().failed_flushes,
            };
            self.append(LogRecord::new(now, payload), storage, delay);
        }

        TickReport {
            tick: now,
            state: self.fsm.current_state(),
            pump: self.pump.state(),
            reading,
            escalated: assessment.escalate,
        }
    }

    /// Orderly shutdown: force the pump off, record the stop if it was
    /// running, then drain the log buffer.
    pub fn shutdown(
        &mut self,
        hw: &mut impl ActuatorPort,
        storage: &mut impl LogStorage,
        delay: &mut impl DelayNs,
    ) -> Result<(), LogError> {
        let now = self.clock.now();
        info!("ControlLoop shutting down at tick {now}");
        if self.pump.stop(StopReason::Shutdown, hw) {
            self.fsm.force_transition(StateId::Cooldown, &mut self.ctx);
            let payload = RecordPayload::PumpStop {
                level_mm: self.last_level,
                reason: StopReason::Shutdown,
            };
            self.append(LogRecord::new(now, payload), storage, delay);
        } else if let Err(e) = hw.stop_pump() {
            warn!("CTRL: pump output off at shutdown failed ({e})");
        }
        self.logger.flush(storage, delay)
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn state(&self) -> StateId {
        self.fsm.current_state()
    }

    pub fn pump_state(&self) -> PumpState {
        self.pump.state()
    }

    pub fn now(&self) -> Tick {
        self.clock.now()
    }

    pub fn latched_fault(&self) -> Option<SystemFault> {
        self.monitor.latched()
    }

    pub fn logger_stats(&self) -> LoggerStats {
        self.logger.stats()
    }

    pub fn is_logger_degraded(&self) -> bool {
        self.logger.is_degraded()
    }

    pub fn pump_activations(&self) -> u32 {
        self.pump.activations()
    }

    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    fn append(
        &mut self,
        record: LogRecord,
        storage: &mut impl LogStorage,
        delay: &mut impl DelayNs,
    ) {
        let kind = record.kind().as_str();
        match self.logger.append(record, storage, delay) {
            Ok(()) => {}
            Err(e @ (LogError::OutOfOrder | LogError::Overflow)) => {
                error!("CTRL: {kind} record at tick {} dropped: {e}", record.timestamp)
            }
            Err(e) => warn!("CTRL: {kind} record at tick {} held in buffer: {e}", record.timestamp),
        }
    }
}

//! Integration tests for the sense → detect → FSM → pump → log pipeline.
//!
//! Every scenario drives a real [`ControlLoop`] tick by tick against
//! [`MockRig`] and [`MemStorage`], then reads the session log back through
//! `LogRecord::parse_line`.

use fluidsampler::app::control_loop::{ControlLoop, TickReport};
use fluidsampler::clock::Tick;
use fluidsampler::datalog::{FaultCode, LogRecord, RecordKind, RecordPayload};
use fluidsampler::drivers::pump::{PumpState, StopReason};
use fluidsampler::error::{Error, SystemFault};
use fluidsampler::fsm::StateId;

use crate::mock_hw::{MemStorage, MockRig, NoDelay, PumpCall, test_config};

struct Bench {
    control: ControlLoop,
    rig: MockRig,
    storage: MemStorage,
}

impl Bench {
    fn new() -> Self {
        Self::with_config(test_config())
    }

    fn with_config(config: fluidsampler::config::SystemConfig) -> Self {
        let mut control = ControlLoop::new(config).expect("test config is valid");
        let mut storage = MemStorage::new();
        control.start(&mut storage, &mut NoDelay);
        Self {
            control,
            rig: MockRig::new(),
            storage,
        }
    }

    fn tick(&mut self) -> TickReport {
        self.control
            .tick(&mut self.rig, &mut self.storage, &mut NoDelay)
    }

    /// Run one tick per level.
    fn run_levels(&mut self, levels: &[f32]) -> Vec<TickReport> {
        levels
            .iter()
            .map(|&mm| {
                self.rig.set_level(mm);
                self.tick()
            })
            .collect()
    }

    fn finish(&mut self) -> Vec<LogRecord> {
        self.control
            .shutdown(&mut self.rig, &mut self.storage, &mut NoDelay)
            .expect("storage is online");
        self.storage.records()
    }
}

fn of_kind(records: &[LogRecord], kind: RecordKind) -> Vec<LogRecord> {
    records.iter().copied().filter(|r| r.kind() == kind).collect()
}

fn assert_ordered(records: &[LogRecord]) {
    for pair in records.windows(2) {
        assert!(
            pair[0].timestamp <= pair[1].timestamp,
            "log out of order: {:?} before {:?}",
            pair[0],
            pair[1]
        );
    }
}

// ── Construction ──────────────────────────────────────────────

#[test]
fn invalid_config_is_rejected() {
    let mut config = test_config();
    config.threshold.falling_mm = config.threshold.rising_mm;
    assert!(matches!(ControlLoop::new(config), Err(Error::Config(_))));
}

#[test]
fn boot_marker_is_first_line() {
    let mut bench = Bench::new();
    assert_eq!(bench.storage.lines.len(), 1, "boot record flushes immediately");
    assert!(bench.storage.lines[0].starts_with("0,BOOT,v"));

    bench.run_levels(&[10.0; 3]);
    let records = bench.finish();
    assert_eq!(records[0].kind(), RecordKind::Boot);
    assert_eq!(of_kind(&records, RecordKind::Boot).len(), 1);
    assert_eq!(of_kind(&records, RecordKind::Sample).len(), 3);
}

// ── Sampling cycle ────────────────────────────────────────────

#[test]
fn crossing_runs_pump_until_level_recovers() {
    let mut bench = Bench::new();
    let reports = bench.run_levels(&[45.0, 55.0, 55.0, 45.0, 38.0, 38.0, 38.0, 38.0]);

    assert_eq!(reports[1].state, StateId::Monitoring, "hold not yet met");
    assert_eq!(reports[2].state, StateId::Sampling);
    assert!(reports[2].pump.is_running());
    assert_eq!(reports[4].state, StateId::Cooldown);
    assert_eq!(reports[4].pump, PumpState::Cooldown { remaining_ticks: 2 });
    assert_eq!(reports[6].pump, PumpState::Idle);
    assert_eq!(reports[7].state, StateId::Monitoring);
    assert!(!bench.rig.pump_on());
    assert_eq!(bench.control.pump_activations(), 1);

    let records = bench.finish();
    assert_ordered(&records);
    assert_eq!(
        of_kind(&records, RecordKind::PumpStart),
        vec![LogRecord::new(Tick(3), RecordPayload::PumpStart { level_mm: 55.0 })]
    );
    assert_eq!(
        of_kind(&records, RecordKind::PumpStop),
        vec![LogRecord::new(
            Tick(5),
            RecordPayload::PumpStop {
                level_mm: 38.0,
                reason: StopReason::LevelRecovered
            }
        )]
    );

    // The crossing tick's sample precedes its pump transition.
    let tick3: Vec<RecordKind> = records
        .iter()
        .filter(|r| r.timestamp == Tick(3))
        .map(LogRecord::kind)
        .collect();
    assert_eq!(tick3, vec![RecordKind::Sample, RecordKind::PumpStart]);
}

#[test]
fn log_lines_use_the_documented_format() {
    let mut bench = Bench::new();
    bench.run_levels(&[55.0, 55.0]);
    bench.finish();
    assert_eq!(
        &bench.storage.lines[1..],
        &[
            "1,SAMPLE,1550,55.0\n".to_owned(),
            "2,SAMPLE,1550,55.0\n".to_owned(),
            "2,PUMP_START,55.0\n".to_owned(),
            "2,PUMP_STOP,55.0,SHUTDOWN\n".to_owned(),
        ]
    );
}

#[test]
fn pump_cut_off_at_max_run_time() {
    let mut bench = Bench::new();
    let reports = bench.run_levels(&[60.0; 10]);

    // Start on tick 2; the run limit stops it four ticks later.
    assert_eq!(reports[5].tick, Tick(6));
    assert_eq!(reports[5].state, StateId::Cooldown);
    assert_eq!(bench.rig.calls.last(), Some(&PumpCall::Stop));
    assert_eq!(reports[9].state, StateId::Monitoring);
    // Level never fell to the re-arm point, so no second activation.
    assert_eq!(bench.control.pump_activations(), 1);

    let records = bench.finish();
    let start = of_kind(&records, RecordKind::PumpStart)[0];
    let stop = of_kind(&records, RecordKind::PumpStop)[0];
    assert!(matches!(
        stop.payload,
        RecordPayload::PumpStop { reason: StopReason::MaxRunTime, .. }
    ));
    assert!(stop.timestamp.since(start.timestamp) <= u64::from(test_config().pump_run_ticks));
}

#[test]
fn crossing_during_cooldown_waits_for_idle() {
    let mut bench = Bench::new();
    // Stop at tick 5, re-cross at tick 7 while the pump is still resting.
    bench.run_levels(&[45.0, 55.0, 55.0, 45.0, 38.0, 55.0, 55.0, 55.0, 55.0]);

    let records = bench.finish();
    let starts: Vec<Tick> = of_kind(&records, RecordKind::PumpStart)
        .iter()
        .map(|r| r.timestamp)
        .collect();
    assert_eq!(starts, vec![Tick(3), Tick(8)]);
    assert!(starts[1].since(Tick(5)) >= u64::from(test_config().pump_cooldown_ticks));

    // A cooldown refusal is routine, not a fault.
    assert!(of_kind(&records, RecordKind::Fault).is_empty());
    assert_eq!(bench.control.latched_fault(), None);
}

#[test]
fn shutdown_while_running_stops_pump_and_logs_it() {
    let mut bench = Bench::new();
    bench.run_levels(&[60.0; 3]);
    assert!(bench.control.pump_state().is_running());
    assert!(bench.rig.pump_on());

    let records = bench.finish();
    assert!(!bench.rig.pump_on(), "pump left energised after shutdown");
    assert_eq!(bench.rig.calls.last(), Some(&PumpCall::Stop));
    assert!(!bench.control.pump_state().is_running());
    assert_eq!(
        records.last(),
        Some(&LogRecord::new(
            Tick(3),
            RecordPayload::PumpStop {
                level_mm: 60.0,
                reason: StopReason::Shutdown
            }
        ))
    );
}

#[test]
fn shutdown_while_idle_logs_no_stop() {
    let mut bench = Bench::new();
    bench.run_levels(&[20.0; 3]);
    let records = bench.finish();
    assert!(of_kind(&records, RecordKind::PumpStop).is_empty());
    assert_eq!(bench.rig.calls.last(), Some(&PumpCall::Stop));
}

#[test]
fn priming_then_running_duty() {
    let mut bench = Bench::new();
    bench.run_levels(&[60.0; 4]);
    let drives: Vec<PumpCall> = bench
        .rig
        .calls
        .iter()
        .copied()
        .filter(|c| matches!(c, PumpCall::Drive(_)))
        .collect();
    // Tick 2 starts and primes at full duty; tick 3 on runs at 80%.
    assert_eq!(
        drives,
        vec![
            PumpCall::Drive(100),
            PumpCall::Drive(100),
            PumpCall::Drive(80),
            PumpCall::Drive(80),
        ]
    );
}

// ── Fault escalation ──────────────────────────────────────────

#[test]
fn sensor_streak_locks_pump_out() {
    let mut config = test_config();
    config.pump_run_ticks = 10;
    let mut bench = Bench::with_config(config);

    bench.run_levels(&[60.0, 60.0]);
    assert!(bench.control.pump_state().is_running());

    bench.rig.sensor_offline();
    let outage: Vec<TickReport> = (0..4).map(|_| bench.tick()).collect();
    assert_eq!(outage[2].escalated, None, "limit is tolerated");
    let locked = outage[3];
    assert_eq!(locked.tick, Tick(6));
    assert_eq!(locked.escalated, Some(SystemFault::SensorFailure));
    assert_eq!(locked.state, StateId::SafeIdle);
    assert_eq!(locked.pump, PumpState::FaultLocked);
    assert!(!bench.rig.pump_on());

    // Sensor comes back and the level re-crosses: still no pump.
    let drives_at_lock = bench.rig.drive_calls();
    let after = bench.run_levels(&[30.0, 60.0, 60.0, 60.0]);
    assert!(after.iter().all(|r| r.state == StateId::SafeIdle));
    assert!(after.iter().all(|r| r.escalated.is_none()));
    assert_eq!(bench.rig.drive_calls(), drives_at_lock);
    assert_eq!(bench.control.latched_fault(), Some(SystemFault::SensorFailure));

    let records = bench.finish();
    assert_ordered(&records);
    assert!(
        of_kind(&records, RecordKind::PumpStart)
            .iter()
            .all(|r| r.timestamp < Tick(6))
    );
    let at_lock: Vec<RecordPayload> = records
        .iter()
        .filter(|r| r.timestamp == Tick(6))
        .map(|r| r.payload)
        .collect();
    assert_eq!(
        at_lock,
        vec![
            RecordPayload::PumpStop { level_mm: 60.0, reason: StopReason::Lockout },
            RecordPayload::Fault { code: FaultCode::LockoutSensor, streak: 4 },
        ]
    );
    // The outage is recorded once, when it starts.
    let stale: Vec<LogRecord> = records
        .iter()
        .copied()
        .filter(|r| matches!(r.payload, RecordPayload::Fault { code: FaultCode::SensorStale, .. }))
        .collect();
    assert_eq!(
        stale,
        vec![LogRecord::new(
            Tick(3),
            RecordPayload::Fault { code: FaultCode::SensorStale, streak: 1 }
        )]
    );
    // Sensing and logging continue after lockout.
    assert!(
        of_kind(&records, RecordKind::Sample)
            .iter()
            .any(|r| r.timestamp > Tick(6))
    );
}

#[test]
fn short_sensor_glitch_does_not_escalate() {
    let mut bench = Bench::new();
    bench.run_levels(&[20.0, 20.0]);
    bench.rig.sensor_offline();
    for _ in 0..3 {
        bench.tick();
    }
    bench.run_levels(&[20.0]);
    bench.rig.sensor_offline();
    for _ in 0..3 {
        assert_eq!(bench.tick().escalated, None);
    }
    assert_eq!(bench.control.state(), StateId::Monitoring);

    let records = bench.finish();
    let stale = of_kind(&records, RecordKind::Fault);
    let at: Vec<Tick> = stale.iter().map(|r| r.timestamp).collect();
    assert_eq!(at, vec![Tick(3), Tick(7)], "one record per outage");
    assert!(stale.iter().all(|r| r.payload
        == RecordPayload::Fault {
            code: FaultCode::SensorStale,
            streak: 1
        }));
}

#[test]
fn failing_drive_escalates_to_pump_stuck() {
    let mut bench = Bench::new();
    bench.rig.fail_drive = true;

    let reports = bench.run_levels(&[60.0; 7]);
    assert!(reports[..6].iter().all(|r| r.escalated.is_none()));
    assert_eq!(reports[6].escalated, Some(SystemFault::PumpStuck));
    assert_eq!(reports[6].state, StateId::SafeIdle);

    // Even with a healthy bridge the lock holds.
    bench.rig.fail_drive = false;
    bench.run_levels(&[30.0, 60.0, 60.0, 60.0]);
    assert_eq!(bench.control.pump_activations(), 0);
    assert_eq!(bench.rig.drive_calls(), 0);

    let records = bench.finish();
    assert!(of_kind(&records, RecordKind::PumpStart).is_empty());
    let drive_faults = records
        .iter()
        .filter(|r| matches!(r.payload, RecordPayload::Fault { code: FaultCode::DriveFault, .. }))
        .count();
    assert_eq!(drive_faults, 6);
    assert!(records.iter().any(|r| r.payload
        == RecordPayload::Fault {
            code: FaultCode::LockoutPump,
            streak: 6
        }));
}

// ── Storage failure ───────────────────────────────────────────

#[test]
fn lockout_record_survives_long_storage_outage() {
    let mut bench = Bench::new();
    bench.storage.offline = true;

    // Intermittent sensor: every outage stays within the streak limit.
    for _ in 0..40 {
        bench.rig.sensor_offline();
        for _ in 0..3 {
            assert_eq!(bench.tick().escalated, None);
        }
        bench.run_levels(&[20.0]);
    }
    bench.rig.sensor_offline();
    let escalated: Vec<TickReport> = (0..5).map(|_| bench.tick()).collect();
    assert_eq!(escalated[3].escalated, Some(SystemFault::SensorFailure));
    assert!(bench.control.logger_stats().rejected > 0, "buffer saturated");

    bench.storage.offline = false;
    let records = bench.finish();
    assert_ordered(&records);
    let lockout: Vec<LogRecord> = records
        .iter()
        .copied()
        .filter(|r| matches!(r.payload, RecordPayload::Fault { code: FaultCode::LockoutSensor, .. }))
        .collect();
    assert_eq!(
        lockout,
        vec![LogRecord::new(
            escalated[3].tick,
            RecordPayload::Fault { code: FaultCode::LockoutSensor, streak: 4 }
        )]
    );
}

#[test]
fn storage_outage_degrades_then_recovers() {
    let mut bench = Bench::new();
    bench.run_levels(&[20.0; 4]);
    assert_eq!(bench.storage.lines.len(), 5, "boot plus one full sample batch");

    bench.storage.offline = true;
    bench.run_levels(&[20.0; 4]);
    assert!(bench.control.is_logger_degraded());
    bench.run_levels(&[20.0; 3]);

    bench.storage.offline = false;
    bench.run_levels(&[20.0; 3]);
    assert!(!bench.control.is_logger_degraded());
    assert_eq!(bench.control.latched_fault(), None);
    assert_eq!(bench.control.state(), StateId::Monitoring);

    let stats = bench.control.logger_stats();
    assert!(stats.failed_flushes >= 1);
    assert!(stats.dropped_samples > 0);

    let records = bench.finish();
    assert_ordered(&records);
    let degraded: Vec<LogRecord> = records
        .iter()
        .copied()
        .filter(|r| matches!(r.payload, RecordPayload::Fault { code: FaultCode::LogDegraded, .. }))
        .collect();
    assert_eq!(
        degraded,
        vec![LogRecord::new(
            Tick(8),
            RecordPayload::Fault { code: FaultCode::LogDegraded, streak: 1 }
        )]
    );
    // Everything after recovery made it out.
    assert!(
        of_kind(&records, RecordKind::Sample)
            .iter()
            .any(|r| r.timestamp == Tick(14))
    );
}

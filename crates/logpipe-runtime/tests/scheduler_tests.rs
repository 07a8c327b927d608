//! Scheduler behavior tests
//!
//! Exercises the scheduler end to end with the recording and failing test
//! sinks: lifecycle, admission under backpressure, fault isolation and
//! shutdown.

use std::sync::Arc;
use std::time::Duration;

use logpipe_core::testing::{FailingSink, Gate, RecordingSink, SinkEvent, TestPacket};
use logpipe_runtime::{
    LogpipeResult, OverflowPolicy, ProtocolCommand, Scheduler, SchedulerAction, SchedulerBuilder,
    SchedulerCommand, SchedulerConfig, SchedulerError, SinkError, StopOutcome,
};
use parking_lot::Mutex;

const WAIT: Duration = Duration::from_secs(5);

// ----------------------------------------------------------------------------
// Test Utilities
// ----------------------------------------------------------------------------

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

fn write(id: u64, size: usize) -> SchedulerCommand<TestPacket> {
    SchedulerCommand::write_packet(TestPacket::new(id, size))
}

fn start_scheduler(
    sink: RecordingSink,
    config: SchedulerConfig,
) -> LogpipeResult<Scheduler<RecordingSink>> {
    init_tracing();
    SchedulerBuilder::new(sink)
        .with_config(config)
        .with_caption("test")
        .build_and_start()
}

/// Occupy the worker with packet 0 so later commands stay queued
fn block_worker(scheduler: &Scheduler<RecordingSink>, gate: &Gate) {
    assert!(scheduler.schedule(write(0, 1)));
    assert!(gate.wait_for_waiter(WAIT), "worker never reached the gate");
}

// ----------------------------------------------------------------------------
// Lifecycle
// ----------------------------------------------------------------------------

#[test]
fn test_lifecycle_is_idempotent() -> LogpipeResult<()> {
    let sink = RecordingSink::new();
    let journal = sink.journal();
    let scheduler = start_scheduler(sink, SchedulerConfig::testing())?;

    // Second start is a no-op
    scheduler.start()?;
    assert!(scheduler.is_running());

    assert!(scheduler.schedule(SchedulerCommand::connect()));
    assert!(scheduler.schedule(write(1, 10)));
    assert!(scheduler.schedule(SchedulerCommand::disconnect()));

    assert_eq!(scheduler.stop(WAIT), StopOutcome::Stopped);
    assert_eq!(scheduler.stop(WAIT), StopOutcome::AlreadyStopped);
    assert!(!scheduler.is_running());
    assert!(matches!(scheduler.start(), Err(SchedulerError::AlreadyStopped)));

    // Stop drains everything that was admitted
    assert_eq!(
        journal.events(),
        vec![SinkEvent::Connect, SinkEvent::Write(1), SinkEvent::Disconnect]
    );

    // Nothing is admitted after stop
    assert!(!scheduler.schedule(write(2, 10)));
    assert_eq!(scheduler.stats().rejected(), 1);
    Ok(())
}

#[test]
fn test_drop_drains_backlog() -> LogpipeResult<()> {
    let sink = RecordingSink::new().with_write_delay(Duration::from_millis(1));
    let journal = sink.journal();
    let scheduler = start_scheduler(sink, SchedulerConfig::testing())?;

    for id in 0..20 {
        assert!(scheduler.schedule(write(id, 8)));
    }
    drop(scheduler);

    assert_eq!(journal.written(), (0..20).collect::<Vec<_>>());
    Ok(())
}

// ----------------------------------------------------------------------------
// Admission
// ----------------------------------------------------------------------------

#[test]
fn test_backpressure_evicts_oldest_packet() -> LogpipeResult<()> {
    let gate = Gate::new();
    let sink = RecordingSink::new().with_gate(gate.clone());
    let journal = sink.journal();
    let scheduler = start_scheduler(sink, SchedulerConfig::testing().with_capacity(100))?;
    block_worker(&scheduler, &gate);

    assert!(scheduler.schedule(write(1, 60)));
    assert!(scheduler.schedule(write(2, 60)));

    // The first 60-byte packet was trimmed to admit the second
    assert_eq!(scheduler.backlog(), (1, 60));
    assert_eq!(scheduler.stats().evicted(), 1);
    assert_eq!(scheduler.stats().evicted_bytes(), 60);

    gate.open();
    assert_eq!(scheduler.stop(WAIT), StopOutcome::Stopped);
    assert_eq!(journal.written(), vec![0, 2]);
    Ok(())
}

#[test]
fn test_control_commands_survive_trim() -> LogpipeResult<()> {
    let gate = Gate::new();
    let sink = RecordingSink::new().with_gate(gate.clone());
    let journal = sink.journal();
    let scheduler = start_scheduler(sink, SchedulerConfig::testing().with_capacity(100))?;
    block_worker(&scheduler, &gate);

    assert!(scheduler.schedule(write(1, 50)));
    assert!(scheduler.schedule(SchedulerCommand::dispatch(ProtocolCommand::new(9))));
    assert!(scheduler.schedule(write(2, 50)));
    assert!(scheduler.schedule(write(3, 50)));

    gate.open();
    assert_eq!(scheduler.stop(WAIT), StopOutcome::Stopped);
    assert_eq!(
        journal.events(),
        vec![
            SinkEvent::Write(0),
            SinkEvent::Dispatch(9),
            SinkEvent::Write(2),
            SinkEvent::Write(3),
        ]
    );
    Ok(())
}

#[test]
fn test_overflow_policies() -> LogpipeResult<()> {
    for policy in [OverflowPolicy::AdmitAnyway, OverflowPolicy::DropIncoming] {
        let gate = Gate::new();
        let sink = RecordingSink::new().with_gate(gate.clone());
        let config = SchedulerConfig {
            item_overhead: 10,
            ..SchedulerConfig::testing()
                .with_capacity(100)
                .with_overflow_policy(policy)
        };
        let scheduler = start_scheduler(sink, config)?;
        block_worker(&scheduler, &gate);

        // Nine control commands fill 90 bytes that trimming cannot free
        for action in 0..9 {
            assert!(scheduler.schedule(SchedulerCommand::dispatch(ProtocolCommand::new(action))));
        }
        let admitted = scheduler.schedule(write(1, 40));

        match policy {
            OverflowPolicy::AdmitAnyway => {
                assert!(admitted);
                assert_eq!(scheduler.backlog(), (10, 140));
            }
            OverflowPolicy::DropIncoming => {
                assert!(!admitted);
                assert_eq!(scheduler.stats().dropped(), 1);
                assert_eq!(scheduler.backlog(), (9, 90));
            }
        }

        gate.open();
        assert_eq!(scheduler.stop(WAIT), StopOutcome::Stopped);
    }
    Ok(())
}

#[test]
fn test_drop_incoming_keeps_backlog_when_trim_cannot_help() -> LogpipeResult<()> {
    for policy in [OverflowPolicy::AdmitAnyway, OverflowPolicy::DropIncoming] {
        let gate = Gate::new();
        let sink = RecordingSink::new().with_gate(gate.clone());
        let journal = sink.journal();
        let config = SchedulerConfig {
            item_overhead: 10,
            ..SchedulerConfig::testing()
                .with_capacity(100)
                .with_overflow_policy(policy)
        };
        let scheduler = start_scheduler(sink, config)?;
        block_worker(&scheduler, &gate);

        // 60 bytes of controls and one evictable 30-byte packet
        for action in 0..6 {
            assert!(scheduler.schedule(SchedulerCommand::dispatch(ProtocolCommand::new(action))));
        }
        assert!(scheduler.schedule(write(1, 20)));
        assert_eq!(scheduler.backlog(), (7, 90));

        // Needs 40 bytes freed, only 30 are evictable
        let admitted = scheduler.schedule(write(2, 40));

        match policy {
            OverflowPolicy::AdmitAnyway => {
                assert!(admitted);
                assert_eq!(scheduler.backlog(), (7, 110));
                assert_eq!(scheduler.stats().evicted(), 1);
                assert_eq!(scheduler.stats().dropped(), 0);
            }
            OverflowPolicy::DropIncoming => {
                assert!(!admitted);
                assert_eq!(scheduler.backlog(), (7, 90));
                assert_eq!(scheduler.stats().evicted(), 0);
                assert_eq!(scheduler.stats().dropped(), 1);
            }
        }

        gate.open();
        assert_eq!(scheduler.stop(WAIT), StopOutcome::Stopped);

        let expected = match policy {
            OverflowPolicy::AdmitAnyway => vec![0, 2],
            OverflowPolicy::DropIncoming => vec![0, 1],
        };
        assert_eq!(journal.written(), expected);
    }
    Ok(())
}

#[test]
fn test_clear_on_disconnect() -> LogpipeResult<()> {
    let gate = Gate::new();
    let sink = RecordingSink::new().with_gate(gate.clone());
    let journal = sink.journal();
    let config = SchedulerConfig::testing().with_clear_on_disconnect(true);
    let scheduler = start_scheduler(sink, config)?;
    block_worker(&scheduler, &gate);

    assert!(scheduler.schedule(write(1, 10)));
    assert!(scheduler.schedule(write(2, 10)));
    assert!(scheduler.schedule(SchedulerCommand::disconnect()));
    assert_eq!(scheduler.backlog(), (1, 0));
    assert_eq!(scheduler.stats().cleared(), 2);

    gate.open();
    assert_eq!(scheduler.stop(WAIT), StopOutcome::Stopped);
    assert_eq!(
        journal.events(),
        vec![SinkEvent::Write(0), SinkEvent::Disconnect]
    );
    Ok(())
}

#[test]
fn test_explicit_clear() -> LogpipeResult<()> {
    let gate = Gate::new();
    let sink = RecordingSink::new().with_gate(gate.clone());
    let scheduler = start_scheduler(sink, SchedulerConfig::testing())?;
    block_worker(&scheduler, &gate);

    for id in 1..=3 {
        assert!(scheduler.schedule(write(id, 10)));
    }
    assert_eq!(scheduler.clear(), 3);
    assert_eq!(scheduler.backlog(), (0, 0));
    assert_eq!(scheduler.stats().lost(), 3);

    gate.open();
    assert_eq!(scheduler.stop(WAIT), StopOutcome::Stopped);
    Ok(())
}

// ----------------------------------------------------------------------------
// Fault Isolation
// ----------------------------------------------------------------------------

#[test]
fn test_sink_error_does_not_stop_worker() -> LogpipeResult<()> {
    init_tracing();
    let failures = Arc::new(Mutex::new(Vec::new()));
    let sink = RecordingSink::new().fail_on(2);
    let journal = sink.journal();

    let scheduler = {
        let failures = Arc::clone(&failures);
        SchedulerBuilder::new(sink)
            .with_config(SchedulerConfig::testing())
            .with_error_listener(move |failure| {
                failures.lock().push((failure.action, failure.error.to_string()));
            })
            .build_and_start()?
    };

    assert!(scheduler.schedule(write(1, 10)));
    assert!(scheduler.schedule(write(2, 10)));
    assert!(scheduler.schedule(write(3, 10)));

    assert!(journal.wait_for(2, WAIT));
    assert!(scheduler.is_running());
    assert_eq!(journal.written(), vec![1, 3]);

    assert_eq!(scheduler.stop(WAIT), StopOutcome::Stopped);
    assert_eq!(scheduler.stats().executed(), 2);
    assert_eq!(scheduler.stats().failed(), 1);
    assert_eq!(
        failures.lock().as_slice(),
        &[(
            SchedulerAction::WritePacket,
            "Protocol error: rejected packet 2".to_string()
        )]
    );
    Ok(())
}

#[test]
fn test_sink_panic_is_contained() -> LogpipeResult<()> {
    init_tracing();
    let panicked = Arc::new(Mutex::new(None));
    let sink = RecordingSink::new().panic_on(2);
    let journal = sink.journal();

    let scheduler = {
        let panicked = Arc::clone(&panicked);
        SchedulerBuilder::new(sink)
            .with_config(SchedulerConfig::testing())
            .with_error_listener(move |failure| {
                if let SinkError::Panicked { message, .. } = failure.error {
                    *panicked.lock() = Some(message.clone());
                }
            })
            .build_and_start()?
    };

    for id in 1..=3 {
        assert!(scheduler.schedule(write(id, 10)));
    }

    assert_eq!(scheduler.stop(WAIT), StopOutcome::Stopped);
    assert_eq!(journal.written(), vec![1, 3]);
    assert_eq!(
        panicked.lock().as_deref(),
        Some("test sink panicked on packet 2")
    );
    Ok(())
}

#[test]
fn test_failed_sink_discards_backlog_on_shutdown() -> LogpipeResult<()> {
    init_tracing();
    let gate = Gate::new();
    let sink = FailingSink::new(1).with_gate(gate.clone());
    let attempts = sink.attempts();
    let scheduler = SchedulerBuilder::new(sink)
        .with_config(SchedulerConfig::testing())
        .build_and_start()?;

    assert!(scheduler.schedule(write(0, 1)));
    assert!(gate.wait_for_waiter(WAIT));
    for id in 1..=5 {
        assert!(scheduler.schedule(write(id, 10)));
    }

    // Shutdown begins while the worker is held at the gate
    assert_eq!(
        scheduler.stop(Duration::from_millis(20)),
        StopOutcome::TimedOut
    );
    assert!(!scheduler.schedule(write(6, 10)));

    gate.open();
    assert_eq!(scheduler.stop(WAIT), StopOutcome::Stopped);

    // The blocked packet failed after stop began, so the backlog is discarded
    assert_eq!(attempts.written(), vec![0]);
    assert_eq!(scheduler.stats().cleared(), 5);
    assert_eq!(scheduler.stats().failed(), 1);
    Ok(())
}

#[test]
fn test_failed_sink_discards_rest_of_batch_on_shutdown() -> LogpipeResult<()> {
    init_tracing();
    let first = Gate::new();
    let second = Gate::new();
    let sink = FailingSink::new(1)
        .with_gate_on(0, first.clone())
        .with_gate_on(1, second.clone());
    let attempts = sink.attempts();
    let config = SchedulerConfig::testing();
    assert_eq!(config.batch_size, 4);
    let scheduler = SchedulerBuilder::new(sink)
        .with_config(config)
        .build_and_start()?;

    assert!(scheduler.schedule(write(0, 1)));
    assert!(first.wait_for_waiter(WAIT));
    for id in 1..=4 {
        assert!(scheduler.schedule(write(id, 10)));
    }

    // Packet 0 fails while running; the worker then takes [1, 2, 3, 4] as one batch
    first.open();
    assert!(second.wait_for_waiter(WAIT));
    assert_eq!(scheduler.backlog(), (0, 0));

    // Shutdown begins while packet 1 is in flight
    assert_eq!(
        scheduler.stop(Duration::from_millis(20)),
        StopOutcome::TimedOut
    );

    second.open();
    assert_eq!(scheduler.stop(WAIT), StopOutcome::Stopped);

    assert_eq!(attempts.written(), vec![0, 1]);
    assert_eq!(scheduler.stats().cleared(), 3);
    assert_eq!(scheduler.stats().failed(), 2);
    Ok(())
}

// ----------------------------------------------------------------------------
// Shutdown
// ----------------------------------------------------------------------------

#[test]
fn test_stop_times_out_on_busy_sink() -> LogpipeResult<()> {
    let gate = Gate::new();
    let sink = RecordingSink::new().with_gate(gate.clone());
    let journal = sink.journal();
    let scheduler = start_scheduler(sink, SchedulerConfig::testing())?;
    block_worker(&scheduler, &gate);
    assert!(scheduler.schedule(write(1, 10)));

    assert_eq!(
        scheduler.stop(Duration::from_millis(50)),
        StopOutcome::TimedOut
    );
    assert!(!scheduler.is_running());

    // The worker resumes draining once the sink is released
    gate.open();
    assert_eq!(scheduler.stop(WAIT), StopOutcome::Stopped);
    assert_eq!(journal.written(), vec![0, 1]);
    Ok(())
}

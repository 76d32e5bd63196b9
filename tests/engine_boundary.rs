use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
};

use rescue_grid::{
    config::SimConfig,
    engine::EngineBuilder,
    scheduler::CycleError,
    world::{Phase, ResourceKind, TriggerError},
};

#[test]
fn snapshots_never_see_half_applied_acts() {
    let engine = EngineBuilder::new(SimConfig::karachi())
        .with_seed(12)
        .build()
        .unwrap();
    engine.trigger_disaster("earthquake", 1.0, None).unwrap();

    let done = Arc::new(AtomicBool::new(false));
    let readers: Vec<_> = (0..3)
        .map(|_| {
            let engine = engine.clone();
            let done = done.clone();
            thread::spawn(move || {
                let mut seen = 0;
                loop {
                    let finished = done.load(Ordering::SeqCst);
                    let snapshot = engine.snapshot();
                    // Fleets go out and come back inside one allocation act.
                    assert_eq!(
                        snapshot.resources[&ResourceKind::Ambulance],
                        snapshot.initial_resources[&ResourceKind::Ambulance]
                    );
                    assert_eq!(
                        snapshot.victims + snapshot.victims_saved,
                        snapshot.stats.total_victims_initial + snapshot.stats.secondary_victims
                    );
                    seen += 1;
                    if finished {
                        break seen;
                    }
                }
            })
        })
        .collect();

    for _ in 0..50 {
        engine.run_cycle().unwrap();
    }
    done.store(true, Ordering::SeqCst);
    for reader in readers {
        assert!(reader.join().expect("reader thread") > 0);
    }
    assert_eq!(engine.cycle_count(), 50);
}

#[test]
fn concurrent_cycles_are_serialised() {
    let engine = EngineBuilder::new(SimConfig::karachi())
        .with_seed(13)
        .build()
        .unwrap();
    engine.trigger_disaster("wildfire", 0.5, None).unwrap();

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let engine = engine.clone();
            thread::spawn(move || {
                (0..10)
                    .map(|_| engine.run_cycle().unwrap().cycle)
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut cycles: Vec<u64> = workers
        .into_iter()
        .flat_map(|worker| worker.join().unwrap())
        .collect();
    cycles.sort_unstable();
    assert_eq!(cycles, (1..=40).collect::<Vec<_>>());
}

#[test]
fn pause_holds_the_world_still() {
    let engine = EngineBuilder::new(SimConfig::karachi()).build().unwrap();
    engine.trigger_disaster("flood", 0.9, None).unwrap();
    engine.run_cycle().unwrap();
    let before = engine.snapshot();

    assert!(engine.pause());
    for _ in 0..3 {
        let result = engine.run_cycle().unwrap();
        assert!(result.paused);
        assert_eq!(result.cycle, 1);
        assert!(result.messages.is_empty());
    }
    assert_eq!(engine.snapshot().victims, before.victims);

    assert!(!engine.resume());
    assert_eq!(engine.run_cycle().unwrap().cycle, 2);
}

#[test]
fn boundary_errors() {
    let engine = EngineBuilder::new(SimConfig::karachi()).build().unwrap();
    assert!(matches!(
        engine.trigger_disaster("volcano", 0.5, None),
        Err(TriggerError::InvalidScenario(_))
    ));
    assert!(matches!(
        engine.trigger_disaster("earthquake", f64::NAN, None),
        Err(TriggerError::InvalidIntensity(_))
    ));
    assert!(matches!(
        engine.trigger_disaster("earthquake", 0.05, None),
        Err(TriggerError::InvalidIntensity(_))
    ));
    assert_eq!(engine.snapshot().phase, Phase::Idle);

    // A healthy run never trips the fault latch.
    engine.trigger_disaster("Earthquake", 0.1, None).unwrap();
    for _ in 0..20 {
        let outcome = engine.run_cycle();
        assert!(!matches!(outcome, Err(CycleError::Halted(_))));
        outcome.unwrap();
    }
}

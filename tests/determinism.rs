use rescue_grid::{config::SimConfig, engine::EngineBuilder, world::ResourceKind};

/// Serialised cycle results for a fixed sequence of boundary calls.
fn record(seed: u64) -> Vec<serde_json::Value> {
    let engine = EngineBuilder::new(SimConfig::karachi())
        .with_seed(seed)
        .build()
        .expect("engine builds");
    engine
        .trigger_disaster("flood", 0.7, None)
        .expect("trigger accepted");
    (0..60)
        .map(|_| {
            let result = engine.run_cycle().expect("cycle completes");
            serde_json::to_value(&result).expect("result serialises")
        })
        .collect()
}

#[test]
fn same_seed_same_history() {
    assert_eq!(record(77), record(77));
}

#[test]
fn different_seeds_diverge() {
    let baseline = record(1);
    assert!((2..6).any(|seed| record(seed) != baseline));
}

#[test]
fn reset_replays_the_seed() {
    let engine = EngineBuilder::new(SimConfig::karachi())
        .with_seed(31)
        .build()
        .unwrap();

    let mut runs = Vec::new();
    for _ in 0..2 {
        engine.trigger_disaster("earthquake", 0.6, None).unwrap();
        let first = engine.snapshot();
        for _ in 0..10 {
            engine.run_cycle().unwrap();
        }
        let last = engine.snapshot();
        runs.push((
            first.resources[&ResourceKind::Ambulance],
            first.edges.iter().filter(|edge| edge.blocked).count(),
            last.victims,
            serde_json::to_value(engine.unit_positions()).unwrap(),
        ));
        engine.reset();
    }
    assert_eq!(runs[0], runs[1]);
}

//! Rounding a precomputed fractional flow with each mechanism, and the
//! full `get_delegations` pipeline.
#![allow(clippy::expect_used)]

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use liquid_bench::{SizeTier, generate_instance};
use liquid_core::{
    Deadline, FractionalFlowSolver, MaxFlowSolver, Mechanism, RoundingConfig, get_delegations,
};

fn bench_rounding(c: &mut Criterion) {
    let mut group = c.benchmark_group("rounding");
    let config = RoundingConfig::default();

    for (name, tier) in [
        ("S", SizeTier::Small),
        ("M", SizeTier::Medium),
        ("L", SizeTier::Large),
    ] {
        let graph = generate_instance(&tier.config(42));
        let flow = MaxFlowSolver::default()
            .solve(&graph, &Deadline::none())
            .expect("generated instances are feasible");
        group.throughput(Throughput::Elements(graph.node_count() as u64));

        for mechanism in Mechanism::ALL {
            group.bench_with_input(
                BenchmarkId::new(mechanism.name(), name),
                &(&graph, &flow),
                |b, (graph, flow)| {
                    b.iter(|| {
                        mechanism
                            .round(graph, flow, &config, &Deadline::none())
                            .expect("rounds")
                    });
                },
            );
        }
    }

    group.finish();
}

fn bench_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("get_delegations");
    group.sample_size(20);
    let config = RoundingConfig::default();
    let solver = MaxFlowSolver::from_config(&config);

    for (name, tier) in [("S", SizeTier::Small), ("M", SizeTier::Medium)] {
        let graph = generate_instance(&tier.config(7));
        group.throughput(Throughput::Elements(graph.node_count() as u64));
        group.bench_with_input(BenchmarkId::new("one-plus-ln", name), &graph, |b, graph| {
            b.iter(|| get_delegations(graph, Mechanism::OnePlusLn, &solver, &config).expect("rounds"));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_rounding, bench_pipeline);
criterion_main!(benches);

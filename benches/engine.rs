//! Engine benchmarks: scenario computation across portfolio sizes and branches.

use chrono::Utc;
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use etfbalance::{AdditionalCash, Holding, PriceBook, PriceQuote, RebalanceEngine, Ticker};

/// Generate `n` holdings with deterministic quantities, prices and equal target weights.
///
/// Quantities and prices come from a simple deterministic RNG.
fn generate_portfolio(n: usize) -> (Vec<Holding>, PriceBook) {
    let now = Utc::now();
    let weight = 100.0 / n as f64;
    let mut rng_state: u32 = 42;
    let mut prices = PriceBook::default();

    let holdings = (0..n)
        .map(|i| {
            // xorshift32
            rng_state ^= rng_state << 13;
            rng_state ^= rng_state >> 17;
            rng_state ^= rng_state << 5;

            let ticker = Ticker::new(&format!("E{i:03}")).expect("generated ticker is non-empty");
            let price = 10.0 + (rng_state % 50_000) as f64 / 100.0; // $10 - $510
            prices.insert(ticker.clone(), PriceQuote::new(price, "USD", now));
            Holding::new(ticker, (rng_state % 1_000) as u64, weight)
        })
        .collect();

    (holdings, prices)
}

/// Benchmark: drifted portfolio through the adjustment branch
fn bench_adjustment(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine/adjustment");
    let engine = RebalanceEngine::default();

    for n in [3, 20, 200] {
        let (holdings, prices) = generate_portfolio(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| {
                black_box(engine.compute(
                    &holdings,
                    &prices,
                    1_000_000.0,
                    1300.0,
                    AdditionalCash::Percent(10.0),
                ))
            });
        });
    }

    group.finish();
}

/// Benchmark: empty portfolio funded with a fixed amount
fn bench_fresh_allocation(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine/fresh_allocation");
    let engine = RebalanceEngine::default();

    for n in [3, 20, 200] {
        let (mut holdings, prices) = generate_portfolio(n);
        for h in &mut holdings {
            h.quantity = 0;
        }
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| {
                black_box(engine.compute(
                    &holdings,
                    &prices,
                    0.0,
                    1300.0,
                    AdditionalCash::Fixed(100_000_000.0),
                ))
            });
        });
    }

    group.finish();
}

/// Benchmark: pre-check only
fn bench_needs_rebalancing(c: &mut Criterion) {
    let engine = RebalanceEngine::default();
    let (holdings, prices) = generate_portfolio(20);

    c.bench_function("engine/needs_rebalancing_20", |b| {
        b.iter(|| {
            black_box(engine.needs_rebalancing(
                &holdings,
                &prices,
                1_000_000.0,
                1300.0,
                AdditionalCash::None,
            ))
        });
    });
}

criterion_group!(
    benches,
    bench_adjustment,
    bench_fresh_allocation,
    bench_needs_rebalancing
);
criterion_main!(benches);

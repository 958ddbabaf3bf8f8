use std::sync::Arc;

use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use diffbot_core::Encoder;
use diffbot_traits::{ManualClock, MonotonicClock};

// Jittered pulse gaps around a nominal period (µs)
fn synth_gaps(n: usize, period_us: u64, jitter_us: u64, seed: u32) -> Vec<u64> {
    // tiny PRNG
    let mut state = seed.max(1);
    let mut next = || {
        let mut x = state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        state = x;
        u64::from(x)
    };
    (0..n)
        .map(|_| period_us - jitter_us + next() % (2 * jitter_us + 1))
        .collect()
}

fn sample_size(g: &mut criterion::BenchmarkGroup<'_, criterion::measurement::WallTime>) {
    // BENCH_SAMPLE_SIZE=10 cargo bench -p diffbot_core --bench encoder
    match std::env::var("BENCH_SAMPLE_SIZE").ok().and_then(|s| s.parse::<usize>().ok()) {
        Some(n) => g.sample_size(n.max(10)),
        None => g.sample_size(50),
    };
}

pub fn bench_record_pulse(c: &mut Criterion) {
    let mut g = c.benchmark_group("encoder_record");
    sample_size(&mut g);

    let enc = Encoder::new(Arc::new(MonotonicClock::new()));
    enc.attach(17);
    g.bench_function("record_pulse", |b| b.iter(|| enc.record_pulse()));

    let detached = Encoder::new(Arc::new(MonotonicClock::new()));
    g.bench_function("record_pulse_detached", |b| b.iter(|| detached.record_pulse()));
    g.finish();
}

pub fn bench_speed(c: &mut Criterion) {
    let mut g = c.benchmark_group("encoder_speed");
    sample_size(&mut g);

    let gaps = synth_gaps(64, 5_000, 400, 0xC0FFEE);
    g.bench_function("speed_full_window", |b| {
        b.iter_batched(
            || {
                let clock = ManualClock::new();
                let enc = Encoder::new(Arc::new(clock.clone()));
                enc.attach(17);
                for gap in &gaps {
                    clock.advance_us(*gap);
                    enc.record_pulse();
                }
                enc
            },
            |enc| black_box(enc.speed()),
            BatchSize::SmallInput,
        );
    });

    // Reader racing a live writer thread
    let enc = Arc::new(Encoder::new(Arc::new(MonotonicClock::new())));
    enc.attach(17);
    let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let writer = {
        let enc = Arc::clone(&enc);
        let stop = Arc::clone(&stop);
        std::thread::spawn(move || {
            while !stop.load(std::sync::atomic::Ordering::Relaxed) {
                enc.record_pulse();
                std::hint::spin_loop();
            }
        })
    };
    g.bench_function("speed_contended", |b| b.iter(|| black_box(enc.speed())));
    stop.store(true, std::sync::atomic::Ordering::Relaxed);
    let _ = writer.join();
    g.finish();
}

criterion_group!(benches, bench_record_pulse, bench_speed);
criterion_main!(benches);

// Per-call latency benchmark for the engine.
// Sandbox calls build a fresh runtime each time, so their cost is mostly setup.
// Target: sandbox p50 < 20ms, p95 < 50ms; python p50 < 150ms.

use execbox::{ContextExtensions, Engine, EngineConfig, Language};
use std::time::{Duration, Instant};

const ITERATIONS: usize = 100;
const WARMUP_ITERATIONS: usize = 10;

/// Latency percentiles
struct LatencyStats {
    p50: Duration,
    p95: Duration,
    p99: Duration,
    min: Duration,
    max: Duration,
    mean: Duration,
}

impl LatencyStats {
    fn from_samples(mut samples: Vec<Duration>) -> Self {
        samples.sort();
        let len = samples.len();

        let p50_idx = (len as f64 * 0.50) as usize;
        let p95_idx = (len as f64 * 0.95) as usize;
        let p99_idx = (len as f64 * 0.99) as usize;

        let sum: Duration = samples.iter().sum();
        let mean = sum / len as u32;

        Self {
            p50: samples[p50_idx],
            p95: samples[p95_idx.min(len - 1)],
            p99: samples[p99_idx.min(len - 1)],
            min: samples[0],
            max: samples[len - 1],
            mean,
        }
    }

    fn print(&self, label: &str) {
        println!("\n{}", label);
        println!("  p50: {:?}", self.p50);
        println!("  p95: {:?}", self.p95);
        println!("  p99: {:?}", self.p99);
        println!("  min: {:?}", self.min);
        println!("  max: {:?}", self.max);
        println!("  mean: {:?}", self.mean);
    }
}

struct BenchmarkResult {
    scenario: String,
    stats: Option<LatencyStats>,
    passed: bool,
    reason: Option<String>,
}

impl BenchmarkResult {
    fn print(&self) {
        println!("\n=== {} ===", self.scenario);
        if let Some(stats) = &self.stats {
            stats.print("Latency");
        }
        match &self.reason {
            None => println!("PASS"),
            Some(reason) if self.passed => println!("SKIP: {}", reason),
            Some(reason) => println!("FAIL: {}", reason),
        }
    }
}

fn measure(engine: &Engine, language: Language, code: &str) -> Option<LatencyStats> {
    let extensions = ContextExtensions::new();

    for _ in 0..WARMUP_ITERATIONS {
        if !engine.execute_language(code, language, &extensions).success() {
            return None;
        }
    }

    let samples = (0..ITERATIONS)
        .map(|_| {
            let start = Instant::now();
            let _ = engine.execute_language(code, language, &extensions);
            start.elapsed()
        })
        .collect();
    Some(LatencyStats::from_samples(samples))
}

fn scenario(
    engine: &Engine,
    name: &str,
    language: Language,
    code: &str,
    p50_budget: Duration,
    p95_budget: Duration,
) -> BenchmarkResult {
    let Some(stats) = measure(engine, language, code) else {
        return BenchmarkResult {
            scenario: name.to_string(),
            stats: None,
            passed: true,
            reason: Some(format!("{} toolchain unavailable", language)),
        };
    };

    let passed = stats.p50 < p50_budget && stats.p95 < p95_budget;
    let reason = (!passed).then(|| {
        format!(
            "p50={:?} (target <{:?}), p95={:?} (target <{:?})",
            stats.p50, p50_budget, stats.p95, p95_budget
        )
    });

    BenchmarkResult {
        scenario: name.to_string(),
        stats: Some(stats),
        passed,
        reason,
    }
}

fn main() {
    println!("=== execbox Latency Benchmark ===");
    println!("Iterations: {} (after {} warmup)", ITERATIONS, WARMUP_ITERATIONS);

    let engine = match Engine::new(EngineConfig::default()) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Failed to build engine: {}", e);
            std::process::exit(1);
        }
    };

    let results = vec![
        scenario(
            &engine,
            "Sandbox expression",
            Language::JavaScript,
            "[1, 2, 3].map(x => x * 2)",
            Duration::from_millis(20),
            Duration::from_millis(50),
        ),
        scenario(
            &engine,
            "Sandbox async with console",
            Language::JavaScript,
            "console.log('hi'); (async () => 42)()",
            Duration::from_millis(20),
            Duration::from_millis(50),
        ),
        scenario(
            &engine,
            "Python hello world",
            Language::Python,
            "print('Hello, World!')",
            Duration::from_millis(150),
            Duration::from_millis(300),
        ),
    ];

    for result in &results {
        result.print();
    }

    let passed_count = results.iter().filter(|r| r.passed).count();
    let total_count = results.len();

    println!("\n=== Summary ===");
    println!("{}/{} scenarios passed", passed_count, total_count);

    if passed_count == total_count {
        println!("All latency budgets met");
        std::process::exit(0);
    } else {
        println!("Some latency budgets exceeded");
        std::process::exit(1);
    }
}

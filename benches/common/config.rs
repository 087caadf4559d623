use std::env;

/// Configuration for benchmarks, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct BenchConfig {
    /// Benchmark against Redis as well as the in-memory stores (from BENCH_REDIS, defaults to false)
    pub use_redis: bool,

    /// Redis URL (from REDIS_URL env var, defaults to localhost)
    pub redis_url: String,

    /// Simulated upstream latency in milliseconds (from UPSTREAM_LATENCY_MS env var, defaults to 50)
    pub upstream_latency_ms: u64,

    /// Sample size for benchmarks (from BENCH_SAMPLE_SIZE env var, defaults to 100)
    pub sample_size: usize,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            use_redis: env::var("BENCH_REDIS")
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            upstream_latency_ms: env::var("UPSTREAM_LATENCY_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(50),
            sample_size: env::var("BENCH_SAMPLE_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(100),
        }
    }
}

impl BenchConfig {
    pub fn new() -> Self {
        let config = Self::default();
        eprintln!("Benchmark Configuration:");
        eprintln!("  Redis: {} ({})", config.use_redis, config.redis_url);
        eprintln!("  Upstream Latency: {}ms", config.upstream_latency_ms);
        eprintln!("  Sample Size: {}", config.sample_size);
        config
    }
}

use std::time::{Duration, Instant};

use log::info;

/// Runs `op`, logs how long it took under `label`, and returns both the
/// result and the elapsed time.
pub fn measure<T, F>(label: &str, op: F) -> (T, Duration)
where
    F: FnOnce() -> T,
{
    let start = Instant::now();
    let output = op();
    let elapsed = start.elapsed();
    info!("{label} finished in {:.3}s", elapsed.as_secs_f64());
    (output, elapsed)
}

use std::sync::OnceLock;
use std::time::Instant;

fn epoch() -> Instant {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    *EPOCH.get_or_init(Instant::now)
}

/// Monotonic microseconds since the first call in this process. All deadline
/// arithmetic in the runtime is done on this clock; it never goes backwards.
pub fn now_micros() -> u64 {
    epoch().elapsed().as_micros() as u64
}

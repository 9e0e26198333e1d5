//! Wall-clock access, isolated in one place so every component reads "now"
//! the same way instead of each reimplementing `SystemTime` math.

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is set before the Unix epoch")
        .as_millis()
}

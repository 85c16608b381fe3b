//! Human-readable formatting helpers for log output.

use std::time::Duration;

/// Formats a duration as at most two units, e.g. "1m, 30s" or "245ms".
pub fn format_duration(duration: Duration) -> String {
    const UNITS: [(&str, u128); 5] = [
        ("d", 86_400_000),
        ("h", 3_600_000),
        ("m", 60_000),
        ("s", 1_000),
        ("ms", 1),
    ];

    let mut remaining = duration.as_millis();
    let mut parts = Vec::new();

    for (unit, unit_ms) in UNITS {
        let count = remaining / unit_ms;
        if count > 0 {
            parts.push(format!("{count}{unit}"));
            remaining -= count * unit_ms;
        }
        // Two units is enough precision for a log line.
        if parts.len() == 2 {
            break;
        }
    }

    if parts.is_empty() {
        "0s".to_string()
    } else {
        parts.join(", ")
    }
}

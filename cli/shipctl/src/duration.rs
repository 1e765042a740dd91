//! Command-line duration parsing: `90`, `90s`, `5m`, `1h`, `1m30s`.

use std::time::Duration;

/// Parse a duration argument. A bare number is seconds; anything else goes
/// through humantime (`1m30s`, `1h 15m`, `500ms`).
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    if let Ok(secs) = input.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(input).map_err(|e| format!("invalid duration {:?}: {}", input, e))
}

/// Render a duration in a form [`parse_duration`] accepts back.
pub fn format_duration(duration: Duration) -> String {
    humantime::format_duration(duration).to_string()
}

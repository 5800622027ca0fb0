//! Default-value expression evaluation ( step 4): `"today [+ N
//! days]"` expressions are evaluated at prompt-build time, not left as raw
//! strings for the model to interpret.

use chrono::{DateTime, Utc};
use regex::Regex;

/// Evaluate a raw default expression against `now`. Recognizes:
/// - `"today"` → `now`'s date, ISO 8601 (`YYYY-MM-DD`).
/// - `"today + N days"` / `"today+Nd"` (whitespace-insensitive) → offset.
/// - anything else is returned unevaluated (the planner sees the literal
///   expression as-is; most default expressions aren't date arithmetic).
pub fn evaluate(expr: &str, now: DateTime<Utc>) -> String {
    let trimmed = expr.trim();
    if trimmed.eq_ignore_ascii_case("today") {
        return now.format("%Y-%m-%d").to_string();
    }

    let re = Regex::new(r"(?i)^today\s*\+\s*(\d+)\s*day(s)?$").expect("static regex is valid");
    if let Some(caps) = re.captures(trimmed) {
        let days: i64 = caps[1].parse().unwrap_or(0);
        let shifted = now + chrono::Duration::days(days);
        return shifted.format("%Y-%m-%d").to_string();
    }

    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 27, 12, 0, 0).unwrap()
    }

    #[test]
    fn evaluates_bare_today() {
        assert_eq!(evaluate("today", fixed_now()), "2026-07-27");
    }

    #[test]
    fn evaluates_today_plus_offset() {
        assert_eq!(evaluate("today + 7 days", fixed_now()), "2026-08-03");
    }

    #[test]
    fn evaluates_today_plus_offset_compact_form() {
        assert_eq!(evaluate("Today+1 day", fixed_now()), "2026-07-28");
    }

    #[test]
    fn leaves_unrecognized_expressions_unevaluated() {
        assert_eq!(evaluate("Active", fixed_now()), "Active");
    }
}

// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cron expression parsing and occurrence computation.

use chrono::{DateTime, Utc};
use croner::Cron;
use threadline_core::ThreadlineError;

/// Parses a 5-field (or 6-field, with seconds) cron expression.
pub fn parse(expression: &str) -> Result<Cron, ThreadlineError> {
    expression
        .trim()
        .parse::<Cron>()
        .map_err(|e| ThreadlineError::Validation(format!("invalid cron expression `{expression}`: {e}")))
}

/// First occurrence strictly after `after`.
pub fn next_after(cron: &Cron, after: &DateTime<Utc>) -> Result<DateTime<Utc>, ThreadlineError> {
    cron.find_next_occurrence(after, false)
        .map_err(|e| ThreadlineError::Validation(format!("cron expression has no next occurrence: {e}")))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn daily_nine_am() {
        let cron = parse("0 9 * * *").unwrap();
        let after = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();
        assert_eq!(
            next_after(&cron, &after).unwrap(),
            Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
        );
        // Exactly at the occurrence moves to the next day.
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        assert_eq!(
            next_after(&cron, &at).unwrap(),
            Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            parse("every tuesday"),
            Err(ThreadlineError::Validation(_))
        ));
        assert!(parse("61 * * * *").is_err());
    }
}

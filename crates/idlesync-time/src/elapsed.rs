//! Elapsed-time math for combat and dungeon displays
//!
//! Combat and dungeon records are never predicted. The client only shows how
//! long they have been running on the server clock.

use std::time::Duration;

use idlesync_core::{CharacterSheet, ServerTime};

/// `adjusted_now - started_at`, zero if the start lies in the future
#[inline]
pub fn elapsed_since(started_at: ServerTime, adjusted_now: ServerTime) -> Duration {
    adjusted_now - started_at
}

/// Elapsed combat time, if a combat is running
pub fn combat_elapsed(sheet: &CharacterSheet, adjusted_now: ServerTime) -> Option<Duration> {
    sheet
        .combat
        .as_ref()
        .map(|c| elapsed_since(c.started_at, adjusted_now))
}

/// Elapsed dungeon time, if a dungeon run is active
pub fn dungeon_elapsed(sheet: &CharacterSheet, adjusted_now: ServerTime) -> Option<Duration> {
    sheet
        .dungeon
        .as_ref()
        .map(|d| elapsed_since(d.started_at, adjusted_now))
}

/// `m:ss` below an hour, `h:mm:ss` above
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use idlesync_core::{CombatRecord, DungeonRecord};

    #[test]
    fn test_elapsed_since() {
        let start = ServerTime::from_millis(10_000);
        assert_eq!(
            elapsed_since(start, ServerTime::from_millis(72_500)),
            Duration::from_millis(62_500)
        );
        // Start slightly ahead of our estimate of server now
        assert_eq!(elapsed_since(start, ServerTime::from_millis(9_000)), Duration::ZERO);
    }

    #[test]
    fn test_sheet_elapsed() {
        let mut sheet = CharacterSheet::default();
        let now = ServerTime::from_millis(100_000);
        assert_eq!(combat_elapsed(&sheet, now), None);
        assert_eq!(dungeon_elapsed(&sheet, now), None);

        sheet.combat = Some(CombatRecord {
            started_at: ServerTime::from_millis(40_000),
            opponent: Some("GOBLIN".into()),
            round: Some(3),
        });
        sheet.dungeon = Some(DungeonRecord {
            started_at: ServerTime::from_millis(90_000),
            dungeon_id: None,
            wave: None,
        });

        assert_eq!(combat_elapsed(&sheet, now), Some(Duration::from_secs(60)));
        assert_eq!(dungeon_elapsed(&sheet, now), Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::ZERO), "0:00");
        assert_eq!(format_elapsed(Duration::from_millis(65_900)), "1:05");
        assert_eq!(format_elapsed(Duration::from_secs(3_600 + 62)), "1:01:02");
        assert_eq!(format_elapsed(Duration::from_secs(30 * 3_600)), "30:00:00");
    }
}

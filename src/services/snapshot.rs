//! Snapshot policy - when to materialize state alongside the log.
//!
//! Snapshots bound replay cost on resume. One is taken every N events and
//! at the structural turning points of a session (phase boundaries and
//! convergence), so a restart lands close to where it left off.

/// Default cadence: one snapshot every hundred events.
pub const DEFAULT_SNAPSHOT_INTERVAL: i64 = 100;

/// Event kinds that always force a snapshot.
const FORCED_KINDS: [&str; 3] = ["phase_started", "phase_completed", "convergence_reached"];

/// Whether the event just persisted at `event_index` should trigger a
/// snapshot.
pub fn should_snapshot(event_index: i64, event_kind: &str, interval: i64) -> bool {
    let on_interval = interval > 0 && event_index % interval == 0;
    on_interval || FORCED_KINDS.contains(&event_kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_triggers() {
        assert!(should_snapshot(100, "turn_completed", 100));
        assert!(should_snapshot(200, "turn_completed", 100));
        assert!(!should_snapshot(150, "turn_completed", 100));
        assert!(!should_snapshot(1, "turn_completed", 100));
    }

    #[test]
    fn test_structural_kinds_always_trigger() {
        for kind in ["phase_started", "phase_completed", "convergence_reached"] {
            assert!(should_snapshot(7, kind, 100), "{kind} should snapshot");
        }
        assert!(!should_snapshot(7, "tests_passed", 100));
    }

    #[test]
    fn test_zero_interval_disables_cadence_but_not_structural() {
        assert!(!should_snapshot(100, "turn_completed", 0));
        assert!(should_snapshot(100, "phase_completed", 0));
    }
}

//! Last-write-wins conflict resolution
//!
//! Pure and deterministic so the policy is testable on its own and the same
//! decision is applied everywhere a local and a remote version meet.

use chrono::{DateTime, Utc};

/// Outcome of comparing a local record against a candidate remote version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Overwrite the local record with the remote version
    AcceptRemote,
    /// Keep the local record; drop the remote version for this cycle
    KeepLocal,
}

/// Decide whether a remote version may replace an existing local record.
///
/// An unsynced local record holds an edit that has not been pushed yet; it
/// always wins until acknowledged. Otherwise last-write-wins on the mutation
/// timestamps, with ties going to the incoming remote write.
pub fn resolve(
    local_synced: bool,
    local_updated_at: DateTime<Utc>,
    remote_updated_at: DateTime<Utc>,
) -> Resolution {
    if !local_synced {
        return Resolution::KeepLocal;
    }

    if remote_updated_at >= local_updated_at {
        Resolution::AcceptRemote
    } else {
        Resolution::KeepLocal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, secs).unwrap()
    }

    #[test]
    fn pending_local_edit_always_wins() {
        assert_eq!(resolve(false, ts(1), ts(2)), Resolution::KeepLocal);
        assert_eq!(resolve(false, ts(2), ts(1)), Resolution::KeepLocal);
        assert_eq!(resolve(false, ts(1), ts(1)), Resolution::KeepLocal);
    }

    #[test]
    fn newer_remote_wins_when_local_is_synced() {
        assert_eq!(resolve(true, ts(1), ts(2)), Resolution::AcceptRemote);
    }

    #[test]
    fn older_remote_is_dropped() {
        assert_eq!(resolve(true, ts(2), ts(1)), Resolution::KeepLocal);
    }

    #[test]
    fn tie_goes_to_the_remote_write() {
        assert_eq!(resolve(true, ts(1), ts(1)), Resolution::AcceptRemote);
    }
}

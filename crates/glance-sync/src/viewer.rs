//! Consumer-side decoding of a published snapshot for a small display.

use chrono::{DateTime, Utc};
use glance_vt::{parse_tail, StyledRun};

use crate::channel::SnapshotChannel;
use crate::error::SyncError;
use crate::snapshot::Snapshot;

/// Lines of output a space-constrained viewer shows.
pub const DEFAULT_TAIL_LINES: usize = 20;

/// What a secondary viewer renders for one snapshot.
#[derive(Clone, Debug, PartialEq)]
pub struct ViewerFrame {
    /// Styled runs for the last lines of output only.
    pub runs: Vec<StyledRun>,
    pub updated_at: DateTime<Utc>,
    pub working_directory: String,
    pub executing: bool,
}

impl ViewerFrame {
    pub fn from_snapshot(snapshot: &Snapshot, tail_lines: usize) -> Self {
        Self {
            runs: parse_tail(&snapshot.output_text, tail_lines),
            updated_at: snapshot.timestamp,
            working_directory: snapshot.working_directory.clone(),
            executing: snapshot.executing,
        }
    }

    /// Relative "last updated" indicator, e.g. `"updated 5m ago"`.
    pub fn updated_label(&self, now: DateTime<Utc>) -> String {
        let secs = (now - self.updated_at).num_seconds().max(0);
        match secs {
            0..=4 => "updated just now".to_string(),
            5..=59 => format!("updated {secs}s ago"),
            60..=3599 => format!("updated {}m ago", secs / 60),
            3600..=86_399 => format!("updated {}h ago", secs / 3600),
            _ => format!("updated {}d ago", secs / 86_400),
        }
    }
}

/// Load the current record and decode it for display.
///
/// `Ok(None)` means nothing has been published yet.
pub fn load_frame(channel: &SnapshotChannel, tail_lines: usize) -> Result<Option<ViewerFrame>, SyncError> {
    Ok(channel
        .load()?
        .map(|snapshot| ViewerFrame::from_snapshot(&snapshot, tail_lines)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wake::NoopWakeHint;
    use chrono::Duration;
    use glance_vt::plain_text;
    use tempfile::TempDir;

    #[test]
    fn test_frame_keeps_only_tail() {
        let text: String = (0..30).map(|i| format!("line {i}\n")).collect();
        let snapshot = Snapshot::new(text, "/srv", true);
        let frame = ViewerFrame::from_snapshot(&snapshot, DEFAULT_TAIL_LINES);

        let shown = plain_text(&frame.runs);
        assert_eq!(shown.lines().count(), 20);
        assert!(shown.starts_with("line 10\n"));
        assert!(shown.ends_with("line 29\n"));
        assert_eq!(frame.working_directory, "/srv");
        assert!(frame.executing);
    }

    #[test]
    fn test_frame_parses_styles() {
        let snapshot = Snapshot::new("\x1b[31mRed \x1b[0mPlain", "/", false);
        let frame = ViewerFrame::from_snapshot(&snapshot, 5);
        assert_eq!(frame.runs.len(), 2);
        assert!(frame.runs[0].style.fg.is_some());
        assert!(frame.runs[1].style.is_default());
    }

    #[test]
    fn test_updated_label() {
        let now = Utc::now();
        let frame = ViewerFrame::from_snapshot(&Snapshot::at("", "/", false, now), 1);
        assert_eq!(frame.updated_label(now), "updated just now");
        assert_eq!(frame.updated_label(now + Duration::seconds(42)), "updated 42s ago");
        assert_eq!(frame.updated_label(now + Duration::minutes(5)), "updated 5m ago");
        assert_eq!(frame.updated_label(now + Duration::hours(3)), "updated 3h ago");
        assert_eq!(frame.updated_label(now + Duration::days(2)), "updated 2d ago");
        // Clock skew never produces a negative age.
        assert_eq!(frame.updated_label(now - Duration::seconds(30)), "updated just now");
    }

    #[test]
    fn test_load_frame_absent() {
        let temp_dir = TempDir::new().unwrap();
        let channel = SnapshotChannel::new(temp_dir.path(), Box::new(NoopWakeHint));
        assert!(load_frame(&channel, DEFAULT_TAIL_LINES).unwrap().is_none());

        channel.publish(&Snapshot::new("a\nb\n", "/", false)).unwrap();
        let frame = load_frame(&channel, 1).unwrap().unwrap();
        assert_eq!(plain_text(&frame.runs), "b\n");
    }
}

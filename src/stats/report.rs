//! # Statistics Report
//!
//! Renders a delivery-statistics snapshot as a human-readable table and
//! writes the same data to a CSV file at shutdown.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use super::ChannelSummary;
use crate::error::Result;

/// CSV header for the exported statistics table
pub const REPORT_HEADER: &str = "topic,recv_total,unique,duplicates,missing,first_seq,last_seq";

/// Render the snapshot as an aligned, human-readable table
pub fn render_table(snapshot: &BTreeMap<String, ChannelSummary>) -> String {
    if snapshot.is_empty() {
        return "no messages observed".to_string();
    }

    let topic_width = snapshot
        .keys()
        .map(|t| t.len())
        .chain(std::iter::once("topic".len()))
        .max()
        .unwrap_or(5);

    let mut out = format!(
        "{:<width$}  {:>10}  {:>8}  {:>10}  {:>8}  {:>9}  {:>9}\n",
        "topic", "recv_total", "unique", "duplicates", "missing", "first_seq", "last_seq",
        width = topic_width
    );

    for (topic, s) in snapshot {
        out.push_str(&format!(
            "{:<width$}  {:>10}  {:>8}  {:>10}  {:>8}  {:>9}  {:>9}\n",
            topic,
            s.recv_total,
            s.unique,
            s.duplicates,
            s.missing,
            fmt_seq(s.min_seq),
            fmt_seq(s.max_seq),
            width = topic_width
        ));
    }

    out
}

/// Write the snapshot as a CSV file
///
/// # Errors
///
/// Returns error if the file cannot be written.
pub fn write_csv<P: AsRef<Path>>(path: P, snapshot: &BTreeMap<String, ChannelSummary>) -> Result<()> {
    let mut out = String::from(REPORT_HEADER);
    out.push('\n');

    for (topic, s) in snapshot {
        out.push_str(&format!(
            "{},{},{},{},{},{},{}\n",
            topic,
            s.recv_total,
            s.unique,
            s.duplicates,
            s.missing,
            fmt_seq(s.min_seq),
            fmt_seq(s.max_seq),
        ));
    }

    fs::write(path, out)?;
    Ok(())
}

fn fmt_seq(seq: Option<u64>) -> String {
    seq.map(|s| s.to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::StatCollector;
    use tempfile::tempdir;

    fn sample_snapshot() -> BTreeMap<String, ChannelSummary> {
        let stats = StatCollector::new();
        for seq in [1u64, 2, 2, 4] {
            stats.record("drone/lab/d01/telemetry/gps", Some(seq));
        }
        stats.record("drone/lab/d01/status/battery", None);
        stats.snapshot()
    }

    #[test]
    fn test_render_table_contains_all_topics() {
        let table = render_table(&sample_snapshot());
        assert!(table.contains("drone/lab/d01/telemetry/gps"));
        assert!(table.contains("drone/lab/d01/status/battery"));
        assert!(table.starts_with("topic"));
    }

    #[test]
    fn test_render_table_empty_snapshot() {
        let table = render_table(&BTreeMap::new());
        assert_eq!(table, "no messages observed");
    }

    #[test]
    fn test_write_csv_rows_and_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("delivery_stats.csv");

        write_csv(&path, &sample_snapshot()).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines[0], REPORT_HEADER);
        assert_eq!(lines.len(), 3);
        // BTreeMap ordering puts status/battery before telemetry/gps
        assert_eq!(lines[1], "drone/lab/d01/status/battery,1,0,0,0,,");
        assert_eq!(lines[2], "drone/lab/d01/telemetry/gps,4,3,1,1,1,4");
    }
}

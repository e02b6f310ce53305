use anyhow::Result;
use chrono::{DateTime, Utc};
use std::io::Write;
use std::time::Duration;

use crate::stats::HopStats;

/// Write the CSV header line
pub fn write_csv_header<W: Write>(mut writer: W) -> Result<()> {
    writeln!(
        writer,
        "timestamp,hop,ip,hostname,sent,lost,loss_pct,last_ms,avg_ms,min_ms,max_ms,\
         jitter_avg_ms,jitter_max_ms,p98_ms"
    )?;
    Ok(())
}

/// Append one timestamped row per hop from a persisted-view snapshot.
///
/// Hops that were never probed in this flush window are skipped; latency
/// cells stay empty until at least one RTT was measured, so the unset
/// min sentinel never leaks into output.
pub fn write_csv_rows<W: Write>(
    stats: &[HopStats],
    timestamp: DateTime<Utc>,
    mut writer: W,
) -> Result<()> {
    for tracker in stats {
        if tracker.sent == 0 {
            continue;
        }

        let (last, avg, min, max, jitter_avg, jitter_max, p98) = if tracker.received() > 0 {
            (
                fmt_ms(tracker.last_rtt),
                fmt_ms(tracker.avg_rtt()),
                fmt_ms(tracker.min_rtt),
                fmt_ms(tracker.max_rtt),
                fmt_ms(tracker.avg_jitter()),
                fmt_ms(tracker.max_jitter),
                fmt_ms_opt(tracker.rtt_percentile(0.98)),
            )
        } else {
            (
                String::new(),
                String::new(),
                String::new(),
                String::new(),
                String::new(),
                String::new(),
                String::new(),
            )
        };

        let ip = match tracker.addr {
            Some(ip) => ip.to_string(),
            None => "*".to_string(),
        };

        writeln!(
            writer,
            "{},{},{},{},{},{},{:.1},{},{},{},{},{},{},{}",
            timestamp.to_rfc3339(),
            tracker.ordinal,
            ip,
            escape_csv(&tracker.hostname),
            tracker.sent,
            tracker.lost,
            tracker.loss_pct(),
            last,
            avg,
            min,
            max,
            jitter_avg,
            jitter_max,
            p98
        )?;
    }

    Ok(())
}

fn fmt_ms(value: Duration) -> String {
    format!("{:.2}", value.as_secs_f64() * 1000.0)
}

/// Percentiles are zero when tracking is off or data is insufficient;
/// render those as an empty cell rather than a misleading 0.00
fn fmt_ms_opt(value: Duration) -> String {
    if value.is_zero() {
        String::new()
    } else {
        fmt_ms(value)
    }
}

/// Escape a string for CSV (quote if contains comma, quote, or newline)
fn escape_csv(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    #[test]
    fn test_escape_csv() {
        assert_eq!(escape_csv("simple"), "simple");
        assert_eq!(escape_csv("with,comma"), "\"with,comma\"");
        assert_eq!(escape_csv("with\"quote"), "\"with\"\"quote\"");
    }

    #[test]
    fn test_header_columns_match_rows() {
        let mut header = Vec::new();
        write_csv_header(&mut header).unwrap();
        let header = String::from_utf8(header).unwrap();
        let columns = header.trim().split(',').count();

        let mut stats = HopStats::new(1, Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))), false);
        stats.record_rtt(Duration::from_millis(12));

        let mut rows = Vec::new();
        write_csv_rows(&[stats], Utc::now(), &mut rows).unwrap();
        let rows = String::from_utf8(rows).unwrap();
        assert_eq!(rows.trim().split(',').count(), columns);
    }

    #[test]
    fn test_unprobed_hop_skipped() {
        let stats = HopStats::new(3, None, false);
        let mut out = Vec::new();
        write_csv_rows(&[stats], Utc::now(), &mut out).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_all_lost_hop_has_empty_latency_cells() {
        let mut stats = HopStats::new(2, None, false);
        stats.record_lost();
        stats.record_lost();

        let mut out = Vec::new();
        write_csv_rows(&[stats], Utc::now(), &mut out).unwrap();
        let line = String::from_utf8(out).unwrap();
        let cells: Vec<&str> = line.trim().split(',').collect();

        assert_eq!(cells[1], "2");
        assert_eq!(cells[2], "*");
        assert_eq!(cells[4], "2"); // sent
        assert_eq!(cells[5], "2"); // lost
        assert_eq!(cells[6], "100.0");
        // All latency cells empty; the Duration::MAX sentinel never leaks
        assert!(cells[7..].iter().all(|c| c.is_empty()));
    }

    #[test]
    fn test_measured_hop_row_values() {
        let mut stats = HopStats::new(1, Some(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1))), false);
        stats.record_rtt(Duration::from_millis(10));
        stats.record_rtt(Duration::from_millis(20));

        let mut out = Vec::new();
        write_csv_rows(&[stats], Utc::now(), &mut out).unwrap();
        let line = String::from_utf8(out).unwrap();
        let cells: Vec<&str> = line.trim().split(',').collect();

        assert_eq!(cells[2], "192.0.2.1");
        assert_eq!(cells[7], "20.00"); // last
        assert_eq!(cells[8], "15.00"); // avg
        assert_eq!(cells[9], "10.00"); // min
        assert_eq!(cells[10], "20.00"); // max
    }
}

use anyhow::Result;
use std::io::Write;

use crate::stats::HopStats;

/// Export a stats snapshot as pretty-printed JSON
pub fn export_json<W: Write>(stats: &[HopStats], writer: W) -> Result<()> {
    serde_json::to_writer_pretty(writer, stats)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_export_json_snapshot() {
        let mut stats = HopStats::new(1, None, false);
        stats.record_rtt(Duration::from_millis(5));

        let mut out = Vec::new();
        export_json(&[stats], &mut out).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&out).unwrap();

        assert_eq!(json[0]["ordinal"], 1);
        assert_eq!(json[0]["sent"], 1);
    }
}

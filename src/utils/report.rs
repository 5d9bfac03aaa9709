// Handoff of chart data, the rollup table and run statistics to a reporting backend
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::utils::hierarchy::{ChartLevel, Scheme};
use crate::utils::rollup::{format_label_list, RollupRecord};
use crate::utils::stats::StatsTable;

/// Receives one sample's charts and table. Rendering lives behind this trait.
pub trait ChartSink: Send + Sync {
    fn submit_charts(&self, out_dir: &Path, scheme: Scheme, charts: &[ChartLevel]) -> Result<()>;

    fn submit_table(&self, out_dir: &Path, records: &[RollupRecord]) -> Result<()>;

    /// Called once per run with every sample's statistics.
    fn submit_stats(&self, out_dir: &Path, table: &StatsTable) -> Result<()>;
}

/// Default sink: plain TSV files next to each other in the key's directory.
#[derive(Debug, Default, Clone)]
pub struct TsvReportWriter;

impl TsvReportWriter {
    pub fn levels_path(out_dir: &Path, scheme: Scheme) -> PathBuf {
        out_dir.join(format!("{}_levels.tsv", scheme.name()))
    }

    pub fn table_path(out_dir: &Path) -> PathBuf {
        out_dir.join("rollup_table.tsv")
    }

    pub fn stats_path(out_dir: &Path) -> PathBuf {
        out_dir.join("stats.tsv")
    }
}

impl ChartSink for TsvReportWriter {
    fn submit_charts(&self, out_dir: &Path, scheme: Scheme, charts: &[ChartLevel]) -> Result<()> {
        let mut writer = BufWriter::new(File::create(Self::levels_path(out_dir, scheme))?);
        writeln!(writer, "title\tlabel\tvalue")?;
        for chart in charts {
            for (label, value) in chart.labels.iter().zip(&chart.values) {
                writeln!(writer, "{}\t{}\t{}", chart.title, label, value)?;
            }
        }
        writer.flush()?;
        Ok(())
    }

    fn submit_table(&self, out_dir: &Path, records: &[RollupRecord]) -> Result<()> {
        let mut writer = BufWriter::new(File::create(Self::table_path(out_dir))?);
        writeln!(writer, "id\tcount\tFOAM\tKEGG")?;
        for r in records {
            writeln!(
                writer,
                "{}\t{}\t{}\t{}",
                r.id,
                r.count,
                format_label_list(&r.foam),
                format_label_list(&r.kegg)
            )?;
        }
        writer.flush()?;
        Ok(())
    }

    fn submit_stats(&self, out_dir: &Path, table: &StatsTable) -> Result<()> {
        std::fs::write(Self::stats_path(out_dir), table.to_tsv())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_tsv_rows() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let charts = vec![ChartLevel {
            title: "Level 1".to_string(),
            labels: vec!["Energy".to_string(), "Transport".to_string()],
            values: vec![11, 5],
        }];
        TsvReportWriter.submit_charts(dir.path(), Scheme::Kegg, &charts)?;
        let text = std::fs::read_to_string(TsvReportWriter::levels_path(dir.path(), Scheme::Kegg))?;
        assert_eq!(text, "title\tlabel\tvalue\nLevel 1\tEnergy\t11\nLevel 1\tTransport\t5\n");
        Ok(())
    }

    #[test]
    fn test_stats_written_as_one_table() -> Result<()> {
        use crate::utils::stats::SampleStats;

        let dir = tempfile::tempdir()?;
        let mut sample = SampleStats::new("mic_soil");
        sample.push("N50", 1200);
        TsvReportWriter.submit_stats(dir.path(), &StatsTable { samples: vec![sample] })?;
        let text = std::fs::read_to_string(TsvReportWriter::stats_path(dir.path()))?;
        assert_eq!(text, "statistic\tmic_soil\nN50\t1200\n");
        Ok(())
    }
}

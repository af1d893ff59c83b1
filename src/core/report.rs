//! Reference/VCF mismatch reporting
//!
//! When `--check-ref` is active, every disagreement between a record's REF
//! column and the reference sequence is appended here as one TSV row.

use std::io::{self, Write};
use std::path::Path;

use crate::core::io::ByteSink;

/// Collects reference/VCF discrepancies into an optional report file
pub struct MismatchReport {
    sink: Option<ByteSink>,
    count: usize,
}

impl MismatchReport {
    /// A report that discards everything
    pub fn disabled() -> Self {
        Self {
            sink: None,
            count: 0,
        }
    }

    /// Open a report file and write the header row
    pub fn create<P: AsRef<Path>>(path: P, overwrite: bool) -> io::Result<Self> {
        let mut sink = ByteSink::create(path, overwrite, false, None)?;
        writeln!(sink, "LINENO\tREF_OFFSET")?;
        Ok(Self {
            sink: Some(sink),
            count: 0,
        })
    }

    /// Record a mismatch at `offset` bytes into the REF column of `lineno`.
    ///
    /// The first mismatch is also logged so runs without a report file still
    /// surface the problem once.
    pub fn log_mismatch(&mut self, lineno: usize, offset: usize) -> io::Result<()> {
        if self.count == 0 {
            log::warn!(
                "Reference differs from the variant file on line {} (and possibly others)",
                lineno
            );
        }
        self.count += 1;
        if let Some(sink) = self.sink.as_mut() {
            writeln!(sink, "{}\t{}", lineno, offset)?;
        }
        Ok(())
    }

    /// Number of mismatches seen so far
    pub fn mismatch_count(&self) -> usize {
        self.count
    }

    /// Flush and close the underlying file
    pub fn finish(self) -> io::Result<()> {
        if let Some(sink) = self.sink {
            sink.finish()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_rows() -> io::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("report.tsv");

        let mut report = MismatchReport::create(&path, true)?;
        report.log_mismatch(7, 0)?;
        report.log_mismatch(12, 3)?;
        assert_eq!(report.mismatch_count(), 2);
        report.finish()?;

        let content = std::fs::read_to_string(&path)?;
        assert_eq!(content, "LINENO\tREF_OFFSET\n7\t0\n12\t3\n");
        Ok(())
    }

    #[test]
    fn test_disabled_report_counts() {
        let mut report = MismatchReport::disabled();
        report.log_mismatch(3, 1).unwrap();
        assert_eq!(report.mismatch_count(), 1);
    }
}

//! Streaming VCF reader
//!
//! Line-oriented, zero-copy: `parse` hands the callback a transient
//! [`RecordView`] whose borrowed fields die with the next line. The reader
//! runs either over a buffered stream or over a byte range of a shared
//! memory map, which is how subgraph tasks each read their own slice of the
//! same file.

use memchr::memchr;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::Path;

use crate::core::error::{VcfParseError, VcfResult};
use crate::core::io::{MappedFile, DEFAULT_BUFFER_SIZE};
use crate::vcf::record::{RecordView, VcfField, FIXED_FIELD_COUNT};

/// Input source of a [`VcfReader`]
pub enum VcfSource {
    /// Buffered sequential stream
    Stream {
        reader: BufReader<File>,
        line: Vec<u8>,
        offset: usize,
    },
    /// Byte range of a shared memory map
    Mapped {
        map: MappedFile,
        start: usize,
        end: usize,
        pos: usize,
    },
}

/// Streaming, zero-copy VCF reader
pub struct VcfReader {
    source: VcfSource,
    lineno: usize,
    last_header_lineno: usize,
    first_data_offset: usize,
    sample_names: Vec<String>,
    sample_index: HashMap<String, usize>,
    parsed_field_count: usize,
    counter: usize,
}

impl VcfReader {
    /// Open a file as a buffered stream
    pub fn from_path<P: AsRef<Path>>(path: P, buffer_size: usize) -> VcfResult<Self> {
        let file = File::open(path.as_ref())?;
        let capacity = if buffer_size == 0 {
            DEFAULT_BUFFER_SIZE
        } else {
            buffer_size
        };
        Ok(Self::new(VcfSource::Stream {
            reader: BufReader::with_capacity(capacity, file),
            line: Vec::with_capacity(4096),
            offset: 0,
        }))
    }

    /// Read the whole file through a memory map
    pub fn from_mapped(map: MappedFile) -> Self {
        let end = map.len();
        Self::new(VcfSource::Mapped {
            map,
            start: 0,
            end,
            pos: 0,
        })
    }

    fn new(source: VcfSource) -> Self {
        Self {
            source,
            lineno: 0,
            last_header_lineno: 0,
            first_data_offset: 0,
            sample_names: Vec::new(),
            sample_index: HashMap::new(),
            parsed_field_count: FIXED_FIELD_COUNT,
            counter: 0,
        }
    }

    /// A reader over `[start, end)` of the same map, positioned so the first
    /// line it parses is numbered `start_lineno`. Sample metadata and the
    /// field ceiling carry over.
    pub fn clone_for_range(&self, start: usize, end: usize, start_lineno: usize) -> Option<Self> {
        let VcfSource::Mapped { map, .. } = &self.source else {
            return None;
        };
        Some(Self {
            source: VcfSource::Mapped {
                map: map.clone(),
                start,
                end,
                pos: start,
            },
            lineno: start_lineno - 1,
            last_header_lineno: start_lineno - 1,
            first_data_offset: start,
            sample_names: self.sample_names.clone(),
            sample_index: self.sample_index.clone(),
            parsed_field_count: self.parsed_field_count,
            counter: 0,
        })
    }

    fn next_line_owned(&mut self) -> VcfResult<Option<Vec<u8>>> {
        match &mut self.source {
            VcfSource::Stream { reader, offset, .. } => {
                let mut buf = Vec::new();
                let n = reader.read_until(b'\n', &mut buf)?;
                if n == 0 {
                    return Ok(None);
                }
                *offset += n;
                self.lineno += 1;
                trim_line(&mut buf);
                Ok(Some(buf))
            }
            VcfSource::Mapped { map, end, pos, .. } => {
                if *pos >= *end {
                    return Ok(None);
                }
                let bytes = map.as_bytes();
                let line_end = match memchr(b'\n', &bytes[*pos..*end]) {
                    Some(offset) => *pos + offset,
                    None => *end,
                };
                let mut buf = bytes[*pos..line_end].to_vec();
                *pos = (line_end + 1).min(*end);
                self.lineno += 1;
                trim_line(&mut buf);
                Ok(Some(buf))
            }
        }
    }

    /// Read the meta lines and the `#CHROM` column header.
    ///
    /// `##` lines are discarded; the column header yields the 1-based
    /// sample-name map (0 is reserved for REF). Afterwards the reader points
    /// at the first data line.
    pub fn read_header(&mut self) -> VcfResult<()> {
        let header = loop {
            match self.next_line_owned()? {
                None => {
                    return Err(VcfParseError::MissingColumnHeader {
                        line: String::new(),
                    })
                }
                Some(line) => {
                    if line.starts_with(b"##") {
                        continue;
                    }
                    break line;
                }
            }
        };

        if !header.starts_with(b"#CHROM") {
            return Err(VcfParseError::MissingColumnHeader {
                line: String::from_utf8_lossy(&header).into_owned(),
            });
        }

        for name in header.split(|&b| b == b'\t').skip(FIXED_FIELD_COUNT) {
            let name = String::from_utf8_lossy(name).into_owned();
            let sample_no = self.sample_names.len() + 1;
            if self.sample_index.insert(name.clone(), sample_no).is_some() {
                return Err(VcfParseError::DuplicateSampleName { name });
            }
            self.sample_names.push(name);
        }

        self.last_header_lineno = self.lineno;
        self.first_data_offset = self.current_offset();
        log::debug!(
            "Read {} header lines, {} samples",
            self.lineno,
            self.sample_names.len()
        );
        Ok(())
    }

    /// Rewind to the first data line
    pub fn reset(&mut self) -> VcfResult<()> {
        match &mut self.source {
            VcfSource::Stream { reader, offset, .. } => {
                reader.seek(SeekFrom::Start(self.first_data_offset as u64))?;
                *offset = self.first_data_offset;
            }
            VcfSource::Mapped { pos, .. } => {
                *pos = self.first_data_offset;
            }
        }
        self.lineno = self.last_header_lineno;
        self.counter = 0;
        Ok(())
    }

    /// Limit field splitting to the columns up to and including `last_field`
    pub fn set_parsed_fields(&mut self, last_field: VcfField) {
        self.parsed_field_count = match last_field {
            VcfField::All => FIXED_FIELD_COUNT + self.sample_names.len(),
            field => field.index() + 1,
        };
    }

    /// Ensure input is available; returns whether any bytes remain
    pub fn fill_buffer(&mut self) -> VcfResult<bool> {
        match &mut self.source {
            VcfSource::Stream { reader, .. } => Ok(!reader.fill_buf()?.is_empty()),
            VcfSource::Mapped { end, pos, .. } => Ok(pos < end),
        }
    }

    /// Parse records, handing each to `callback` as a transient view.
    ///
    /// The callback returns false to stop the scan. `parse` returns true
    /// when it stopped on the callback's request (more input may remain)
    /// and false at end of input. A truncated final line terminates cleanly.
    pub fn parse<F>(&mut self, mut callback: F) -> VcfResult<bool>
    where
        F: FnMut(&RecordView<'_>) -> VcfResult<bool>,
    {
        let max_fields = self.parsed_field_count;
        let expect_all = max_fields == FIXED_FIELD_COUNT + self.sample_names.len();
        let sample_count = self.sample_names.len();

        loop {
            // Read one line without copying in mapped mode.
            let (line_range, line_start, had_newline): ((usize, usize), usize, bool) =
                match &mut self.source {
                    VcfSource::Stream { reader, line, offset } => {
                        line.clear();
                        let n = reader.read_until(b'\n', line)?;
                        if n == 0 {
                            return Ok(false);
                        }
                        let line_start = *offset;
                        *offset += n;
                        let had_newline = line.last() == Some(&b'\n');
                        trim_line(line);
                        ((0, line.len()), line_start, had_newline)
                    }
                    VcfSource::Mapped { map, end, pos, .. } => {
                        if *pos >= *end {
                            return Ok(false);
                        }
                        let bytes = map.as_bytes();
                        let (line_end, had_newline) = match memchr(b'\n', &bytes[*pos..*end]) {
                            Some(offset) => (*pos + offset, true),
                            None => (*end, false),
                        };
                        let mut e = line_end;
                        if e > *pos && bytes[e - 1] == b'\r' {
                            e -= 1;
                        }
                        let range = (*pos, e);
                        let line_start = *pos;
                        *pos = (line_end + 1).min(*end);
                        (range, line_start, had_newline)
                    }
                };

            self.lineno += 1;

            let line: &[u8] = match &self.source {
                VcfSource::Stream { line, .. } => &line[line_range.0..line_range.1],
                VcfSource::Mapped { map, .. } => &map.as_bytes()[line_range.0..line_range.1],
            };

            if line.is_empty() {
                continue;
            }

            let view = match RecordView::parse(line, self.lineno, line_start, max_fields) {
                Ok(view) => view,
                // A final line cut off mid-record ends the scan.
                Err(VcfParseError::TooFewFields { .. }) if !had_newline => return Ok(false),
                Err(e) => return Err(e),
            };

            if expect_all && view.has_trailing_fields() {
                return Err(VcfParseError::TooManySamples {
                    lineno: self.lineno,
                    expected: sample_count,
                    found: sample_count + 1,
                });
            }

            self.counter += 1;
            if !callback(&view)? {
                return Ok(true);
            }
        }
    }

    /// Sample names in column order; index + 1 is the sample number
    pub fn sample_names(&self) -> &[String] {
        &self.sample_names
    }

    /// 1-based sample number for a name, 0 if unknown
    pub fn sample_no(&self, name: &str) -> usize {
        self.sample_index.get(name).copied().unwrap_or(0)
    }

    pub fn sample_count(&self) -> usize {
        self.sample_names.len()
    }

    /// Records parsed since the last reset
    pub fn counter_value(&self) -> usize {
        self.counter
    }

    /// 1-based line number of the `#CHROM` line
    pub fn last_header_lineno(&self) -> usize {
        self.last_header_lineno
    }

    /// Byte offset of the next unread line
    pub fn current_offset(&self) -> usize {
        match &self.source {
            VcfSource::Stream { offset, .. } => *offset,
            VcfSource::Mapped { pos, .. } => *pos,
        }
    }

    /// Byte offset of the first data line
    pub fn buffer_start(&self) -> usize {
        self.first_data_offset
    }

    /// One past the last readable byte offset
    pub fn buffer_end(&self) -> usize {
        match &self.source {
            VcfSource::Stream { offset, .. } => *offset,
            VcfSource::Mapped { end, .. } => *end,
        }
    }
}

fn trim_line(line: &mut Vec<u8>) {
    if line.last() == Some(&b'\n') {
        line.pop();
    }
    if line.last() == Some(&b'\r') {
        line.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SMALL_VCF: &str = "\
##fileformat=VCFv4.2\n\
##contig=<ID=chr1>\n\
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS1\tS2\n\
chr1\t2\t.\tC\tG\t.\tPASS\t.\tGT\t0|1\t1|1\n\
chr1\t4\t.\tT\tA,TT\t.\tPASS\t.\tGT\t0|0\t0|2\n";

    fn write_temp(content: &str) -> NamedTempFile {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(content.as_bytes()).unwrap();
        temp.flush().unwrap();
        temp
    }

    fn stream_reader(content: &str) -> (VcfReader, NamedTempFile) {
        let temp = write_temp(content);
        let reader = VcfReader::from_path(temp.path(), 0).unwrap();
        (reader, temp)
    }

    #[test]
    fn test_header_samples() {
        let (mut reader, _temp) = stream_reader(SMALL_VCF);
        reader.read_header().unwrap();

        assert_eq!(reader.sample_names(), ["S1", "S2"]);
        assert_eq!(reader.sample_no("S1"), 1);
        assert_eq!(reader.sample_no("S2"), 2);
        assert_eq!(reader.sample_no("missing"), 0);
        assert_eq!(reader.last_header_lineno(), 3);
    }

    #[test]
    fn test_parse_all_records() {
        let (mut reader, _temp) = stream_reader(SMALL_VCF);
        reader.read_header().unwrap();
        reader.set_parsed_fields(VcfField::All);

        let mut seen = Vec::new();
        let more = reader
            .parse(|view| {
                seen.push((view.lineno(), view.pos()?, view.alt_count()));
                Ok(true)
            })
            .unwrap();

        assert!(!more);
        assert_eq!(seen, [(4, 2, 1), (5, 4, 2)]);
        assert_eq!(reader.counter_value(), 2);
    }

    #[test]
    fn test_callback_stop_and_resume() {
        let (mut reader, _temp) = stream_reader(SMALL_VCF);
        reader.read_header().unwrap();

        let more = reader.parse(|_| Ok(false)).unwrap();
        assert!(more);

        let mut rest = 0;
        let more = reader
            .parse(|_| {
                rest += 1;
                Ok(true)
            })
            .unwrap();
        assert!(!more);
        assert_eq!(rest, 1);
    }

    #[test]
    fn test_reset() {
        let (mut reader, _temp) = stream_reader(SMALL_VCF);
        reader.read_header().unwrap();

        reader.parse(|_| Ok(true)).unwrap();
        assert_eq!(reader.counter_value(), 2);

        reader.reset().unwrap();
        assert_eq!(reader.counter_value(), 0);

        let mut first_pos = 0;
        reader
            .parse(|view| {
                first_pos = view.pos()?;
                Ok(false)
            })
            .unwrap();
        assert_eq!(first_pos, 2);
    }

    #[test]
    fn test_missing_column_header() {
        let (mut reader, _temp) = stream_reader("##meta\nchr1\t1\t.\tA\tG\t.\t.\t.\n");
        assert!(matches!(
            reader.read_header(),
            Err(VcfParseError::MissingColumnHeader { .. })
        ));
    }

    #[test]
    fn test_duplicate_sample_name() {
        let (mut reader, _temp) =
            stream_reader("#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS1\tS1\n");
        assert!(matches!(
            reader.read_header(),
            Err(VcfParseError::DuplicateSampleName { .. })
        ));
    }

    #[test]
    fn test_too_many_sample_columns() {
        let content = "\
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS1\n\
chr1\t2\t.\tC\tG\t.\t.\t.\tGT\t0|1\t1|1\n";
        let (mut reader, _temp) = stream_reader(content);
        reader.read_header().unwrap();
        reader.set_parsed_fields(VcfField::All);

        let res = reader.parse(|_| Ok(true));
        assert!(matches!(res, Err(VcfParseError::TooManySamples { .. })));
    }

    #[test]
    fn test_truncated_final_line_terminates_cleanly() {
        let content = "\
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS1\n\
chr1\t2\t.\tC\tG\t.\t.\t.\tGT\t0|1\n\
chr1\t4\t.\tT";
        let (mut reader, _temp) = stream_reader(content);
        reader.read_header().unwrap();

        let mut count = 0;
        let more = reader
            .parse(|_| {
                count += 1;
                Ok(true)
            })
            .unwrap();
        assert!(!more);
        assert_eq!(count, 1);
    }

    #[test]
    fn test_fill_buffer_reports_remaining_input() {
        let (mut reader, _temp) = stream_reader(SMALL_VCF);
        reader.read_header().unwrap();

        assert!(reader.fill_buffer().unwrap());
        reader.parse(|_| Ok(true)).unwrap();
        assert!(!reader.fill_buffer().unwrap());
    }

    #[test]
    fn test_mapped_range_reader() {
        let temp = write_temp(SMALL_VCF);
        let map = MappedFile::open(temp.path()).unwrap();
        let mut reader = VcfReader::from_mapped(map);
        reader.read_header().unwrap();
        reader.set_parsed_fields(VcfField::All);

        // Offset of the second data line: one newline past the first.
        let data_start = reader.buffer_start();
        let bytes = std::fs::read(temp.path()).unwrap();
        let second_start = data_start + memchr(b'\n', &bytes[data_start..]).unwrap() + 1;

        let mut ranged = reader
            .clone_for_range(second_start, reader.buffer_end(), 5)
            .unwrap();
        let mut seen = Vec::new();
        ranged
            .parse(|view| {
                seen.push((view.lineno(), view.pos()?));
                Ok(true)
            })
            .unwrap();
        assert_eq!(seen, [(5, 4)]);
    }
}

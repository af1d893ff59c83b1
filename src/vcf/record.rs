//! VCF record representations
//!
//! `RecordView` is the zero-copy transient view handed to parse callbacks;
//! its string fields are only valid until the next line is read.
//! `RecordBuf` is the owned, reusable node the variant buffer pools.

use memchr::memchr;
use std::cell::{Cell, RefCell};

use crate::core::error::{VcfParseError, VcfResult};

/// The fixed VCF columns, in file order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum VcfField {
    Chrom,
    Pos,
    Id,
    Ref,
    Alt,
    Qual,
    Filter,
    Info,
    Format,
    /// All fields including every sample column
    All,
}

impl VcfField {
    /// Zero-based column index of the field
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Number of columns up to and including FORMAT
pub const FIXED_FIELD_COUNT: usize = 9;

/// Zero-copy view of one data line.
///
/// Tab boundaries are found eagerly up to the reader's parsed-field ceiling;
/// POS and the ALT split are parsed on demand and memoised.
pub struct RecordView<'a> {
    line: &'a [u8],
    lineno: usize,
    source_offset: usize,
    bounds: Vec<(usize, usize)>,
    pos_cache: Cell<Option<usize>>,
    alt_bounds: RefCell<Option<Vec<(usize, usize)>>>,
}

impl<'a> RecordView<'a> {
    /// Split a data line into at most `max_fields` tab-delimited fields.
    ///
    /// `source_offset` is the byte offset of the line start in the source
    /// file; the subgraph finder records it at cut points.
    pub fn parse(
        line: &'a [u8],
        lineno: usize,
        source_offset: usize,
        max_fields: usize,
    ) -> VcfResult<Self> {
        let mut bounds = Vec::with_capacity(max_fields.min(32));
        let mut start = 0;
        while bounds.len() < max_fields {
            match memchr(b'\t', &line[start..]) {
                Some(offset) => {
                    bounds.push((start, start + offset));
                    start += offset + 1;
                }
                None => {
                    bounds.push((start, line.len()));
                    break;
                }
            }
        }

        // CHROM..INFO must always be present.
        if bounds.len() < 8.min(max_fields) {
            return Err(VcfParseError::TooFewFields {
                lineno,
                expected: 8.min(max_fields),
                found: bounds.len(),
            });
        }

        Ok(Self {
            line,
            lineno,
            source_offset,
            bounds,
            pos_cache: Cell::new(None),
            alt_bounds: RefCell::new(None),
        })
    }

    /// 1-based source line number
    pub fn lineno(&self) -> usize {
        self.lineno
    }

    /// Byte offset of the line start in the source file
    pub fn source_offset(&self) -> usize {
        self.source_offset
    }

    /// Number of fields split so far
    pub fn field_count(&self) -> usize {
        self.bounds.len()
    }

    /// Whether the line has more columns than were split
    pub fn has_trailing_fields(&self) -> bool {
        self.bounds
            .last()
            .map(|&(_, e)| e < self.line.len())
            .unwrap_or(false)
    }

    /// Raw bytes of field `index`
    pub fn field(&self, index: usize) -> Option<&'a [u8]> {
        self.bounds.get(index).map(|&(s, e)| &self.line[s..e])
    }

    /// POS, 1-based; parsed lazily and memoised
    pub fn pos(&self) -> VcfResult<usize> {
        if let Some(pos) = self.pos_cache.get() {
            return Ok(pos);
        }
        let raw = self.field(VcfField::Pos.index()).unwrap_or(b"");
        let mut pos: usize = 0;
        if raw.is_empty() || !raw.iter().all(u8::is_ascii_digit) {
            return Err(VcfParseError::InvalidPos {
                lineno: self.lineno,
                value: String::from_utf8_lossy(raw).into_owned(),
            });
        }
        for &b in raw {
            pos = pos * 10 + (b - b'0') as usize;
        }
        self.pos_cache.set(Some(pos));
        Ok(pos)
    }

    /// POS converted to a 0-based reference offset
    pub fn zero_based_pos(&self) -> VcfResult<usize> {
        Ok(self.pos()? - 1)
    }

    /// REF column bytes
    pub fn ref_allele(&self) -> &'a [u8] {
        self.field(VcfField::Ref.index()).unwrap_or(b"")
    }

    /// One past the last reference position the record spans, 0-based
    pub fn end_pos(&self) -> VcfResult<usize> {
        Ok(self.zero_based_pos()? + self.ref_allele().len())
    }

    fn split_alts(&self) {
        if self.alt_bounds.borrow().is_some() {
            return;
        }
        let mut alts = Vec::new();
        if let Some(&(field_start, field_end)) = self.bounds.get(VcfField::Alt.index()) {
            let raw = &self.line[field_start..field_end];
            if raw != b"." && !raw.is_empty() {
                let mut start = 0;
                loop {
                    match memchr(b',', &raw[start..]) {
                        Some(offset) => {
                            alts.push((field_start + start, field_start + start + offset));
                            start += offset + 1;
                        }
                        None => {
                            alts.push((field_start + start, field_end));
                            break;
                        }
                    }
                }
            }
        }
        *self.alt_bounds.borrow_mut() = Some(alts);
    }

    /// Number of ALT alleles (`.` counts as zero)
    pub fn alt_count(&self) -> usize {
        self.split_alts();
        self.alt_bounds.borrow().as_ref().map_or(0, Vec::len)
    }

    /// ALT allele bytes by 1-based allele index (0 denotes REF and has no bytes)
    pub fn alt(&self, alt_idx: u8) -> Option<&'a [u8]> {
        if alt_idx == 0 {
            return None;
        }
        self.split_alts();
        self.alt_bounds
            .borrow()
            .as_ref()
            .and_then(|alts| alts.get(alt_idx as usize - 1))
            .map(|&(s, e)| &self.line[s..e])
    }

    /// FORMAT column bytes, if parsed
    pub fn format(&self) -> Option<&'a [u8]> {
        self.field(VcfField::Format.index())
    }

    /// Raw sample column by 1-based sample number
    pub fn sample(&self, sample_no: usize) -> Option<&'a [u8]> {
        self.field(FIXED_FIELD_COUNT + sample_no - 1)
    }

    /// Number of sample columns split so far
    pub fn sample_count(&self) -> usize {
        self.bounds.len().saturating_sub(FIXED_FIELD_COUNT)
    }
}

/// Position of the GT subfield within a colon-delimited FORMAT descriptor
pub fn gt_subfield_index(format: &[u8]) -> Option<usize> {
    format
        .split(|&b| b == b':')
        .position(|field| field == b"GT")
}

/// Extract the `index`-th colon-delimited subfield of a sample column
pub fn subfield(sample: &[u8], index: usize) -> &[u8] {
    sample.split(|&b| b == b':').nth(index).unwrap_or(b"")
}

/// Decode a GT subfield into allele indices.
///
/// Decimal digits accumulate into an allele index; each `|` or `/` emits one
/// allele, plus the trailing one. A `/` anywhere clears the phased flag.
/// Returns whether the genotype is phased.
pub fn decode_gt(gt: &[u8], alleles: &mut Vec<u8>) -> bool {
    alleles.clear();
    let mut phased = true;
    let mut current: u8 = 0;
    for &b in gt {
        match b {
            b'0'..=b'9' => current = current * 10 + (b - b'0'),
            b'|' => {
                alleles.push(current);
                current = 0;
            }
            b'/' => {
                phased = false;
                alleles.push(current);
                current = 0;
            }
            _ => {}
        }
    }
    alleles.push(current);
    phased
}

/// Owned, reusable record.
///
/// Instances cycle through the variant buffer's pool; `copy_from` refills
/// every field without reallocating the inner buffers.
#[derive(Debug, Default)]
pub struct RecordBuf {
    lineno: usize,
    pos: usize,
    ref_allele: Vec<u8>,
    alts: Vec<Vec<u8>>,
    alt_len: usize,
    samples: Vec<Vec<u8>>,
    sample_len: usize,
    gt_index: Option<usize>,
    /// Index of this record within its subgraph; set by the consumer
    pub variant_index: usize,
}

impl RecordBuf {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refill this node from a transient view
    pub fn copy_from(&mut self, view: &RecordView<'_>) -> VcfResult<()> {
        self.lineno = view.lineno();
        self.pos = view.pos()?;
        self.variant_index = 0;

        self.ref_allele.clear();
        self.ref_allele.extend_from_slice(view.ref_allele());

        self.alt_len = view.alt_count();
        while self.alts.len() < self.alt_len {
            self.alts.push(Vec::new());
        }
        for i in 0..self.alt_len {
            self.alts[i].clear();
            self.alts[i].extend_from_slice(view.alt(i as u8 + 1).unwrap_or(b""));
        }

        self.gt_index = view.format().and_then(gt_subfield_index);

        self.sample_len = view.sample_count();
        while self.samples.len() < self.sample_len {
            self.samples.push(Vec::new());
        }
        for i in 0..self.sample_len {
            self.samples[i].clear();
            self.samples[i].extend_from_slice(view.sample(i + 1).unwrap_or(b""));
        }

        Ok(())
    }

    pub fn lineno(&self) -> usize {
        self.lineno
    }

    /// POS, 1-based
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// POS converted to a 0-based reference offset
    pub fn zero_based_pos(&self) -> usize {
        self.pos - 1
    }

    pub fn ref_allele(&self) -> &[u8] {
        &self.ref_allele
    }

    /// One past the last reference position the record spans, 0-based
    pub fn end_pos(&self) -> usize {
        self.zero_based_pos() + self.ref_allele.len()
    }

    pub fn alt_count(&self) -> usize {
        self.alt_len
    }

    /// ALT allele bytes by 1-based allele index
    pub fn alt(&self, alt_idx: u8) -> Option<&[u8]> {
        if alt_idx == 0 || alt_idx as usize > self.alt_len {
            return None;
        }
        Some(&self.alts[alt_idx as usize - 1])
    }

    pub fn sample_count(&self) -> usize {
        self.sample_len
    }

    /// Decode every sample's genotype, calling
    /// `f(sample_no, chr_idx, alt_idx, phased)` once per chromosome copy.
    ///
    /// `ploidy` is checked against the decoded arity; a disagreement is the
    /// hard error resolving the undefined mid-file ploidy change.
    pub fn for_each_genotype<F>(&self, ploidy: &[usize], mut f: F) -> VcfResult<()>
    where
        F: FnMut(usize, u8, u8, bool),
    {
        let gt_index = self.gt_index.ok_or(VcfParseError::MissingGenotypeField {
            lineno: self.lineno,
        })?;

        let mut alleles = Vec::with_capacity(2);
        for sample_no in 1..=self.sample_len {
            let gt = subfield(&self.samples[sample_no - 1], gt_index);
            let phased = decode_gt(gt, &mut alleles);

            let expected = ploidy[sample_no - 1];
            if alleles.len() != expected {
                return Err(VcfParseError::PloidyChanged {
                    lineno: self.lineno,
                    sample_no,
                    expected,
                    found: alleles.len(),
                });
            }

            for (chr_idx, &alt_idx) in alleles.iter().enumerate() {
                f(sample_no, chr_idx as u8, alt_idx, phased);
            }
        }
        Ok(())
    }
}

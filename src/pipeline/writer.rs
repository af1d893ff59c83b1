//! Aligned sequence emission
//!
//! The sequence writer owns every haplotype output stream and keeps them
//! byte-aligned to the reference coordinate system: position i of every
//! stream corresponds to reference coordinate i plus the insertion columns
//! accumulated so far. Nested variants are tracked on a stack of overlap
//! frames; leaving a frame pads every participating stream to the longest
//! emission inside it.

use std::collections::HashMap;
use std::io::Write;

use crate::core::error::{AlignError, Result};
use crate::core::io::ByteSink;
use crate::graph::alt_check::{classify_alt, emits_null_allele};
use crate::pipeline::HaplotypeId;
use crate::vcf::RecordBuf;

/// One output stream with its aligned byte counter
pub struct HaplotypeStream {
    id: HaplotypeId,
    written: usize,
    sink: ByteSink,
}

impl HaplotypeStream {
    pub fn new(id: HaplotypeId, sink: ByteSink) -> Self {
        Self {
            id,
            written: 0,
            sink,
        }
    }

    pub fn id(&self) -> HaplotypeId {
        self.id
    }

    /// Bytes emitted so far
    pub fn len(&self) -> usize {
        self.written
    }

    pub fn is_empty(&self) -> bool {
        self.written == 0
    }

    fn emit(&mut self, bytes: &[u8]) -> Result<()> {
        self.sink.write_all(bytes)?;
        self.written += bytes.len();
        Ok(())
    }

    fn pad(&mut self, byte: u8, mut amount: usize) -> Result<()> {
        let chunk = [byte; 64];
        while amount > 0 {
            let n = amount.min(chunk.len());
            self.sink.write_all(&chunk[..n])?;
            self.written += n;
            amount -= n;
        }
        Ok(())
    }

    /// Consume the stream, returning the sink for closing
    pub fn into_sink(self) -> ByteSink {
        self.sink
    }
}

/// One live overlap: a variant span and the streams committed inside it
struct Overlap {
    start: usize,
    end: usize,
    lineno: usize,
    /// Aligned output length when the frame was pushed
    entry_len: usize,
    /// Longest emission across this frame's span, in bytes
    heaviest: usize,
    /// Arena indices of streams committed to this frame's ALTs
    streams: Vec<usize>,
}

/// Emits aligned haplotype bytes for a stream of variants
pub struct SequenceWriter<'r> {
    reference: &'r [u8],
    null_allele: Vec<u8>,
    pad_byte: u8,
    streams: Vec<HaplotypeStream>,
    index: HashMap<HaplotypeId, usize>,
    /// Streams currently tracking REF, by arena index
    in_ref_pool: Vec<bool>,
    stack: Vec<Overlap>,
    /// Reference coordinate emitted to the REF pool so far
    ref_position: usize,
    /// Common length of every REF-pool stream
    aligned_len: usize,
    overlap_skips: usize,
}

impl<'r> SequenceWriter<'r> {
    pub fn new(reference: &'r [u8], null_allele: &[u8], streams: Vec<HaplotypeStream>) -> Self {
        let null_allele: Vec<u8> = if null_allele.is_empty() {
            b"-".to_vec()
        } else {
            null_allele.to_vec()
        };
        let index = streams
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id(), i))
            .collect();
        let count = streams.len();
        Self {
            reference,
            pad_byte: null_allele[0],
            null_allele,
            streams,
            index,
            in_ref_pool: vec![true; count],
            stack: Vec::new(),
            ref_position: 0,
            aligned_len: 0,
            overlap_skips: 0,
        }
    }

    /// Write `reference[start..end]` to every stream tracking REF.
    ///
    /// `start` must equal the coordinate already reached.
    pub fn output_reference(&mut self, start: usize, end: usize) -> Result<()> {
        if start != self.ref_position {
            return Err(AlignError::Invariant(format!(
                "reference emission at {} but writer is at {}",
                start, self.ref_position
            )));
        }
        self.emit_reference_to(end)
    }

    fn emit_reference_to(&mut self, end: usize) -> Result<()> {
        if end <= self.ref_position {
            return Ok(());
        }
        if end > self.reference.len() {
            return Err(AlignError::Invariant(format!(
                "variant span [{}..{}] exceeds reference length {}",
                self.ref_position,
                end,
                self.reference.len()
            )));
        }
        let span = &self.reference[self.ref_position..end];
        for (i, stream) in self.streams.iter_mut().enumerate() {
            if self.in_ref_pool[i] {
                stream.emit(span)?;
            }
        }
        self.aligned_len += span.len();
        self.ref_position = end;
        Ok(())
    }

    /// Pop every frame whose deadline is at or before `pos`
    fn process_overlap_stack(&mut self, pos: usize) -> Result<()> {
        while let Some(top) = self.stack.last() {
            if top.end > pos {
                break;
            }
            let frame = self.stack.pop().expect("stack non-empty");
            self.pop_frame(frame)?;
        }
        Ok(())
    }

    fn pop_frame(&mut self, frame: Overlap) -> Result<()> {
        debug_assert!(frame.start <= frame.end, "bad offset order");
        // REF-pool streams receive the rest of the frame's span first.
        self.emit_reference_to(frame.end)?;

        // Everything leaving the frame agrees on this length.
        let mut target = frame.entry_len + frame.heaviest;
        target = target.max(self.aligned_len);
        for &i in &frame.streams {
            target = target.max(self.streams[i].len());
        }

        let pool_pad = target - self.aligned_len;
        if pool_pad > 0 {
            for (i, stream) in self.streams.iter_mut().enumerate() {
                if self.in_ref_pool[i] {
                    stream.pad(self.pad_byte, pool_pad)?;
                }
            }
        }
        for &i in &frame.streams {
            let pad = target - self.streams[i].len();
            self.streams[i].pad(self.pad_byte, pad)?;
            self.in_ref_pool[i] = true;
        }
        self.aligned_len = target;
        Ok(())
    }

    /// Process one variant.
    ///
    /// `choices` lists the haplotypes taking a non-REF allele, with the ALT
    /// index already validated by the caller; every other stream stays on
    /// REF for this record.
    pub fn handle_variant(&mut self, record: &RecordBuf, choices: &[(HaplotypeId, u8)]) -> Result<()> {
        let pos = record.zero_based_pos();
        let end = record.end_pos();

        self.process_overlap_stack(pos)?;
        self.emit_reference_to(pos)?;

        if let Some(top) = self.stack.last() {
            if end > top.end {
                return Err(AlignError::Invariant(format!(
                    "line {} overlaps line {} without nesting",
                    record.lineno(),
                    top.lineno
                )));
            }
        }
        self.stack.push(Overlap {
            start: pos,
            end,
            lineno: record.lineno(),
            entry_len: self.aligned_len,
            heaviest: record.ref_allele().len(),
            streams: Vec::new(),
        });

        for &(id, alt_idx) in choices {
            if alt_idx == 0 {
                continue;
            }
            let Some(&stream_idx) = self.index.get(&id) else {
                continue;
            };
            if !self.in_ref_pool[stream_idx] {
                // Already committed inside an enclosing overlap.
                self.overlap_skips += 1;
                log::debug!(
                    "Sample {} copy {} already has an ALT overlapping line {}",
                    id.0,
                    id.1,
                    record.lineno()
                );
                continue;
            }
            let Some(alt) = record.alt(alt_idx) else {
                continue;
            };
            let bytes: &[u8] = if emits_null_allele(classify_alt(alt)) {
                &self.null_allele
            } else {
                alt
            };

            let frame = self.stack.last_mut().expect("frame pushed above");
            frame.heaviest = frame.heaviest.max(bytes.len());
            frame.streams.push(stream_idx);
            self.in_ref_pool[stream_idx] = false;
            self.streams[stream_idx].emit(bytes)?;
        }

        Ok(())
    }

    /// Drain every frame, emit the reference tail, and hand back the
    /// streams for closing. All streams have equal length afterwards.
    pub fn finish(mut self) -> Result<Vec<HaplotypeStream>> {
        self.process_overlap_stack(usize::MAX)?;
        self.emit_reference_to(self.reference.len())?;

        if let Some(first) = self.streams.first() {
            let len = first.len();
            if let Some(bad) = self.streams.iter().find(|s| s.len() != len) {
                return Err(AlignError::Invariant(format!(
                    "stream for sample {} copy {} has length {}, expected {}",
                    bad.id().0,
                    bad.id().1,
                    bad.len(),
                    len
                )));
            }
        }

        if self.overlap_skips > 0 {
            log::info!(
                "{} sample alleles overlapped an earlier ALT and were kept on it",
                self.overlap_skips
            );
        }
        Ok(self.streams)
    }

    /// Alleles dropped because their haplotype was already committed
    pub fn overlap_skip_count(&self) -> usize {
        self.overlap_skips
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vcf::{RecordBuf, RecordView};

    fn record(lineno: usize, line: &[u8]) -> RecordBuf {
        let view = RecordView::parse(line, lineno, 0, usize::MAX).unwrap();
        let mut buf = RecordBuf::new();
        buf.copy_from(&view).unwrap();
        buf
    }

    fn memory_writer<'a>(reference: &'a [u8], ids: &[HaplotypeId]) -> SequenceWriter<'a> {
        let streams = ids
            .iter()
            .map(|&id| HaplotypeStream::new(id, ByteSink::memory()))
            .collect();
        SequenceWriter::new(reference, b"-", streams)
    }

    fn collect(streams: Vec<HaplotypeStream>) -> Vec<Vec<u8>> {
        streams
            .into_iter()
            .map(|s| s.into_sink().into_memory().unwrap())
            .collect()
    }

    #[test]
    fn test_reference_only() {
        let writer = memory_writer(b"ACGT", &[(1, 0), (1, 1)]);
        let out = collect(writer.finish().unwrap());
        assert_eq!(out, [b"ACGT".to_vec(), b"ACGT".to_vec()]);
    }

    #[test]
    fn test_single_snp() {
        let mut writer = memory_writer(b"ACGT", &[(1, 0), (1, 1)]);
        let rec = record(2, b"chr1\t2\t.\tC\tG\t.\t.\t.\tGT\t0|1");
        writer.handle_variant(&rec, &[((1, 1), 1)]).unwrap();
        let out = collect(writer.finish().unwrap());
        assert_eq!(out, [b"ACGT".to_vec(), b"AGGT".to_vec()]);
    }

    #[test]
    fn test_insertion_pads_other_streams() {
        let mut writer = memory_writer(b"ACGT", &[(1, 0), (1, 1)]);
        let rec = record(2, b"chr1\t2\t.\tC\tCAT\t.\t.\t.\tGT\t0|1");
        writer.handle_variant(&rec, &[((1, 1), 1)]).unwrap();
        let out = collect(writer.finish().unwrap());
        assert_eq!(out, [b"AC--GT".to_vec(), b"ACATGT".to_vec()]);
    }

    #[test]
    fn test_nested_overlap() {
        let mut writer = memory_writer(b"ACGTACGT", &[(1, 0), (1, 1)]);
        let a = record(2, b"chr1\t2\t.\tCGTA\tX\t.\t.\t.\tGT\t1|0");
        let b = record(3, b"chr1\t3\t.\tG\tY\t.\t.\t.\tGT\t0|1");
        writer.handle_variant(&a, &[((1, 0), 1)]).unwrap();
        writer.handle_variant(&b, &[((1, 1), 1)]).unwrap();
        let out = collect(writer.finish().unwrap());
        assert_eq!(out, [b"AX---CGT".to_vec(), b"ACYTACGT".to_vec()]);
    }

    #[test]
    fn test_nested_insertion_expands_outer_pad() {
        // The inner variant inserts two extra bases inside the outer span.
        let mut writer = memory_writer(b"ACGTACGT", &[(1, 0), (1, 1)]);
        let a = record(2, b"chr1\t2\t.\tCGTA\tX\t.\t.\t.\tGT\t1|0");
        let b = record(3, b"chr1\t3\t.\tG\tGYY\t.\t.\t.\tGT\t0|1");
        writer.handle_variant(&a, &[((1, 0), 1)]).unwrap();
        writer.handle_variant(&b, &[((1, 1), 1)]).unwrap();
        let out = collect(writer.finish().unwrap());
        assert_eq!(out, [b"AX-----CGT".to_vec(), b"ACGYYTACGT".to_vec()]);
    }

    #[test]
    fn test_deletion_is_padded_to_ref_length() {
        let mut writer = memory_writer(b"ACGTACGT", &[(1, 0), (1, 1)]);
        let rec = record(2, b"chr1\t2\t.\tCGT\tC\t.\t.\t.\tGT\t0|1");
        writer.handle_variant(&rec, &[((1, 1), 1)]).unwrap();
        let out = collect(writer.finish().unwrap());
        assert_eq!(out, [b"ACGTACGT".to_vec(), b"AC--ACGT".to_vec()]);
    }

    #[test]
    fn test_star_alt_emits_null_allele() {
        let mut writer = memory_writer(b"ACGT", &[(1, 0), (1, 1)]);
        let rec = record(2, b"chr1\t2\t.\tC\t*\t.\t.\t.\tGT\t0|1");
        writer.handle_variant(&rec, &[((1, 1), 1)]).unwrap();
        let out = collect(writer.finish().unwrap());
        assert_eq!(out, [b"ACGT".to_vec(), b"A-GT".to_vec()]);
    }

    #[test]
    fn test_overlapping_alt_keeps_first_commitment() {
        // Both records cover position 2; the same haplotype chooses an ALT
        // in each, so the second is dropped.
        let mut writer = memory_writer(b"ACGTACGT", &[(1, 0)]);
        let a = record(2, b"chr1\t2\t.\tCGTA\tX\t.\t.\t.\tGT\t1");
        let b = record(3, b"chr1\t3\t.\tG\tY\t.\t.\t.\tGT\t1");
        writer.handle_variant(&a, &[((1, 0), 1)]).unwrap();
        writer.handle_variant(&b, &[((1, 0), 1)]).unwrap();
        assert_eq!(writer.overlap_skip_count(), 1);
        let out = collect(writer.finish().unwrap());
        assert_eq!(out, [b"AX---CGT".to_vec()]);
    }

    #[test]
    fn test_non_nested_overlap_is_an_invariant_error() {
        let mut writer = memory_writer(b"ACGTACGT", &[(1, 0), (1, 1)]);
        let a = record(2, b"chr1\t2\t.\tCGT\tX\t.\t.\t.\tGT\t1|0");
        let b = record(3, b"chr1\t3\t.\tGTACG\tY\t.\t.\t.\tGT\t0|1");
        writer.handle_variant(&a, &[((1, 0), 1)]).unwrap();
        let res = writer.handle_variant(&b, &[((1, 1), 1)]);
        assert!(matches!(res, Err(AlignError::Invariant(_))));
    }

    #[test]
    fn test_all_streams_share_length_after_finish() {
        let mut writer = memory_writer(b"ACGTACGTACGT", &[(1, 0), (1, 1), (2, 0), (2, 1)]);
        let a = record(2, b"chr1\t2\t.\tC\tCAT\t.\t.\t.\tGT\t0|1\t0|0");
        let b = record(3, b"chr1\t6\t.\tC\tG\t.\t.\t.\tGT\t0|0\t1|1");
        writer.handle_variant(&a, &[((1, 1), 1)]).unwrap();
        writer.handle_variant(&b, &[((2, 0), 1), ((2, 1), 1)]).unwrap();
        let out = collect(writer.finish().unwrap());
        let len = out[0].len();
        assert!(out.iter().all(|s| s.len() == len));
        assert_eq!(len, 12 + 2);
    }

    #[test]
    fn test_output_reference_requires_current_position() {
        let mut writer = memory_writer(b"ACGT", &[(1, 0)]);
        writer.output_reference(0, 2).unwrap();
        assert!(writer.output_reference(3, 4).is_err());
        writer.output_reference(2, 4).unwrap();
        let out = collect(writer.finish().unwrap());
        assert_eq!(out, [b"ACGT".to_vec()]);
    }
}

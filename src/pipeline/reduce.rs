//! Sample reduction
//!
//! Tracks, per haplotype, the contiguous run of non-REF alleles it is
//! currently on (a *variant sequence*), deduplicates identical runs, and
//! greedily packs the deduplicated runs into slot columns whose intervals
//! never overlap. The columns become the generated haplotype paths of the
//! reduced-samples mode.

use std::collections::BTreeMap;

use crate::pipeline::HaplotypeId;

/// A haplotype's contiguous run of non-REF alleles
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantSequence {
    id: HaplotypeId,
    /// First ALT position, 0-based
    start_pos: usize,
    /// One past the last ALT position, 0-based
    end_pos: usize,
    /// ALT index per line number
    alts: BTreeMap<usize, u8>,
}

impl VariantSequence {
    fn new(id: HaplotypeId, start_pos: usize) -> Self {
        Self {
            id,
            start_pos,
            end_pos: start_pos + 1,
            alts: BTreeMap::new(),
        }
    }

    pub fn start_pos(&self) -> usize {
        self.start_pos
    }

    pub fn end_pos(&self) -> usize {
        self.end_pos
    }

    pub fn id(&self) -> HaplotypeId {
        self.id
    }

    /// ALT index chosen at `lineno`, if any
    pub fn alt_at(&self, lineno: usize) -> Option<u8> {
        self.alts.get(&lineno).copied()
    }

    /// Line numbers and ALT indices, in line order
    pub fn alts(&self) -> impl Iterator<Item = (usize, u8)> + '_ {
        self.alts.iter().map(|(&l, &a)| (l, a))
    }

    fn add_alt(&mut self, lineno: usize, zero_based_pos: usize, alt_idx: u8) {
        self.alts.insert(lineno, alt_idx);
        self.end_pos = zero_based_pos + 1;
    }

    /// Two sequences are equal when their starts and line-to-ALT mappings
    /// agree; the owning haplotype does not matter.
    pub fn same_content(&self, other: &Self) -> bool {
        self.start_pos == other.start_pos && self.alts == other.alts
    }

    /// Ordering used for deterministic slot assignment: by start position,
    /// then lexicographically by (lineno, alt) pairs.
    fn content_key(&self) -> (usize, Vec<(usize, u8)>) {
        (self.start_pos, self.alts().collect())
    }
}

/// Slot columns of non-overlapping variant sequences.
///
/// `columns[slot]` maps a start position to an index into the canonical
/// sequence list; `slot_of[seq]` is the inverse.
#[derive(Debug, Default)]
pub struct RangeMap {
    pub columns: Vec<BTreeMap<usize, usize>>,
    pub slot_of: Vec<usize>,
}

impl RangeMap {
    /// Number of slot columns
    pub fn width(&self) -> usize {
        self.columns.len()
    }
}

/// Builds variant sequences per haplotype and packs them into slots
#[derive(Debug)]
pub struct SampleReducer {
    live: BTreeMap<HaplotypeId, VariantSequence>,
    prepared: Vec<VariantSequence>,
    by_start: BTreeMap<usize, Vec<usize>>,
    memberships: BTreeMap<HaplotypeId, Vec<usize>>,
    allow_switch_to_ref: bool,
}

impl SampleReducer {
    pub fn new(allow_switch_to_ref: bool) -> Self {
        Self {
            live: BTreeMap::new(),
            prepared: Vec::new(),
            by_start: BTreeMap::new(),
            memberships: BTreeMap::new(),
            allow_switch_to_ref,
        }
    }

    /// Feed one haplotype's allele for one record.
    ///
    /// `choice` is `Some(alt)` for a valid non-REF allele, `None` when the
    /// haplotype is on REF (or the allele was rejected).
    pub fn handle_allele(
        &mut self,
        id: HaplotypeId,
        lineno: usize,
        zero_based_pos: usize,
        choice: Option<u8>,
    ) {
        match choice {
            Some(alt_idx) => {
                self.live
                    .entry(id)
                    .or_insert_with(|| VariantSequence::new(id, zero_based_pos))
                    .add_alt(lineno, zero_based_pos, alt_idx);
            }
            None => {
                let close = match self.live.get(&id) {
                    Some(seq) => self.allow_switch_to_ref || zero_based_pos >= seq.end_pos(),
                    None => false,
                };
                if close {
                    let seq = self.live.remove(&id).expect("checked above");
                    self.copy_to_prepared(seq);
                }
            }
        }
    }

    /// Close a sequence, reusing an identical prepared one when possible
    fn copy_to_prepared(&mut self, seq: VariantSequence) {
        let id = seq.id();
        let bucket = self.by_start.entry(seq.start_pos()).or_default();
        let canonical = match bucket
            .iter()
            .find(|&&idx| self.prepared[idx].same_content(&seq))
        {
            Some(&idx) => idx,
            None => {
                let idx = self.prepared.len();
                self.prepared.push(seq);
                bucket.push(idx);
                idx
            }
        };
        self.memberships.entry(id).or_default().push(canonical);
    }

    /// Close every live sequence; call at subgraph end
    pub fn finish(&mut self) {
        let live = std::mem::take(&mut self.live);
        for (_, seq) in live {
            self.copy_to_prepared(seq);
        }
    }

    /// Deduplicated sequences in insertion order
    pub fn prepared(&self) -> &[VariantSequence] {
        &self.prepared
    }

    /// Canonical sequence indices per haplotype
    pub fn memberships(&self) -> &BTreeMap<HaplotypeId, Vec<usize>> {
        &self.memberships
    }

    /// Pack every prepared sequence into the first slot column where its
    /// `[start, end)` interval fits, appending fresh columns as needed.
    pub fn assign_ranges_greedy(&self) -> RangeMap {
        let mut order: Vec<usize> = (0..self.prepared.len()).collect();
        order.sort_by(|&a, &b| {
            self.prepared[a]
                .content_key()
                .cmp(&self.prepared[b].content_key())
        });

        let mut map = RangeMap {
            columns: Vec::new(),
            slot_of: vec![0; self.prepared.len()],
        };

        for seq_idx in order {
            let seq = &self.prepared[seq_idx];
            let start = seq.start_pos();
            let end = seq.end_pos();

            let slot = map.columns.iter().position(|column| {
                let before_ok = column
                    .range(..=start)
                    .next_back()
                    .map_or(true, |(_, &i)| self.prepared[i].end_pos() <= start);
                let after_ok = column
                    .range(start..)
                    .next()
                    .map_or(true, |(&s, _)| s >= end);
                before_ok && after_ok
            });

            let slot = match slot {
                Some(slot) => slot,
                None => {
                    map.columns.push(BTreeMap::new());
                    map.columns.len() - 1
                }
            };
            map.columns[slot].insert(start, seq_idx);
            map.slot_of[seq_idx] = slot;
        }

        map
    }
}

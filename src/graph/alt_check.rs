//! ALT allele validation
//!
//! Classifies every ALT of every record against the structural-variant
//! policy and records which alleles may be emitted. A record whose ALTs are
//! all rejected joins the skipped set and is invisible to the rest of the
//! pipeline.

use std::collections::{HashMap, HashSet};

use crate::vcf::RecordView;

/// How structural-variant ALT alleles are handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SvPolicy {
    /// Keep `*` and symbolic alleles; both render as the null-allele sequence
    Keep,
    /// Reject every structural ALT
    #[default]
    Discard,
    /// Keep `*` alleles only
    KeepAsterisksOnly,
}

/// Shape of a single ALT allele
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AltKind {
    /// Plain base string
    Simple,
    /// `*`, an allele missing because of an upstream deletion
    Asterisk,
    /// `<...>` symbolic allele
    Symbolic,
    /// Breakend notation containing `[` or `]`
    Breakend,
}

/// Classify one ALT allele by its syntax
pub fn classify_alt(alt: &[u8]) -> AltKind {
    if alt.contains(&b'[') || alt.contains(&b']') {
        AltKind::Breakend
    } else if alt.first() == Some(&b'<') {
        AltKind::Symbolic
    } else if alt == b"*" {
        AltKind::Asterisk
    } else {
        AltKind::Simple
    }
}

impl SvPolicy {
    /// Whether an allele of the given kind may be emitted under this policy.
    ///
    /// Breakends have no linear rendering and are rejected everywhere.
    pub fn allows(self, kind: AltKind) -> bool {
        match kind {
            AltKind::Simple => true,
            AltKind::Asterisk => self != SvPolicy::Discard,
            AltKind::Symbolic => self == SvPolicy::Keep,
            AltKind::Breakend => false,
        }
    }
}

/// Whether a valid allele of this kind is written as the null-allele
/// sequence instead of its literal bytes
pub fn emits_null_allele(kind: AltKind) -> bool {
    matches!(kind, AltKind::Asterisk | AltKind::Symbolic)
}

/// Per-line ALT validity bitsets plus the skipped-line set.
///
/// Written once during preparation, read-only afterwards.
#[derive(Debug, Default)]
pub struct AltChecker {
    policy: SvPolicy,
    valid: HashMap<usize, Vec<bool>>,
    skipped: HashSet<usize>,
}

impl AltChecker {
    pub fn new(policy: SvPolicy) -> Self {
        Self {
            policy,
            valid: HashMap::new(),
            skipped: HashSet::new(),
        }
    }

    /// Validate one record's ALT list
    pub fn check_record(&mut self, view: &RecordView<'_>) {
        let lineno = view.lineno();
        let count = view.alt_count();
        let flags: Vec<bool> = (1..=count)
            .map(|i| {
                let alt = view.alt(i as u8).unwrap_or(b"");
                self.policy.allows(classify_alt(alt))
            })
            .collect();

        if flags.iter().any(|&ok| ok) {
            self.valid.insert(lineno, flags);
        } else {
            log::debug!("Skipping line {}: no emittable ALT", lineno);
            self.skipped.insert(lineno);
        }
    }

    /// Force a line into the skipped set (used for overlap conflicts)
    pub fn mark_skipped(&mut self, lineno: usize) {
        self.valid.remove(&lineno);
        self.skipped.insert(lineno);
    }

    /// Whether the whole record was rejected
    pub fn is_skipped(&self, lineno: usize) -> bool {
        self.skipped.contains(&lineno)
    }

    /// Whether `alt_idx` (1-based) of `lineno` may be emitted
    pub fn is_valid_alt(&self, lineno: usize, alt_idx: u8) -> bool {
        if alt_idx == 0 {
            return false;
        }
        self.valid
            .get(&lineno)
            .and_then(|flags| flags.get(alt_idx as usize - 1))
            .copied()
            .unwrap_or(false)
    }

    /// Validity bitset of a retained line
    pub fn valid_alts(&self, lineno: usize) -> Option<&[bool]> {
        self.valid.get(&lineno).map(Vec::as_slice)
    }

    /// Line numbers of fully rejected records
    pub fn skipped_lines(&self) -> &HashSet<usize> {
        &self.skipped
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }
}

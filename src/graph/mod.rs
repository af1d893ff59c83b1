//! Variant-graph analysis
//!
//! ALT validation against the structural-variant policy, subgraph
//! partitioning of the variant stream, and the path-matching solver used
//! when stitching adjacent subgraphs.

pub mod alt_check;
pub mod matching;
pub mod subgraph;

pub use alt_check::{classify_alt, emits_null_allele, AltChecker, AltKind, SvPolicy};
pub use matching::{max_weight_assignment, min_cost_assignment};
pub use subgraph::{find_cut_points, partition, CutPoint, CutScan, GraphRange};

//! Generation consolidator (spec §4.D), run single-threaded by the elected
//! leader: merges per-file min/max statistics into an ordered list of
//! replay generations, then normalizes seqno bounds across adjacent
//! generations so intervals are strictly non-overlapping.

use std::sync::Arc;

use itertools::Itertools;
use log::debug;

use crate::gentree::ReplayGeneration;
use crate::record::MinMaxInfo;
use crate::validate::ValidatedFile;

struct Building {
    gen: u64,
    info: MinMaxInfo,
}

/// Consolidate validated files (not necessarily sorted) into the ordered
/// list of replay generations.
pub fn consolidate(files: &[ValidatedFile]) -> Vec<Arc<ReplayGeneration>> {
    let mut order: Vec<&ValidatedFile> = files.iter().collect();
    order.sort_by_key(|f| (f.gen, f.file_id));

    let mut gens: Vec<Building> = order
        .into_iter()
        .group_by(|f| f.gen)
        .into_iter()
        .map(|(gen, files_in_gen)| Building {
            gen,
            info: files_in_gen.fold(MinMaxInfo::empty(), |mut acc, f| {
                acc.merge(&f.min_max);
                acc
            }),
        })
        .collect();

    let n = gens.len();
    for i in 0..n.saturating_sub(1) {
        let cur_max = gens[i].info.max_seqno;
        let next = &mut gens[i + 1];
        if next.info.min_seqno == MinMaxInfo::UNSET {
            debug_assert_eq!(i + 2, n, "an empty generation may only be the last one");
            next.info.min_seqno = cur_max + 1;
            next.info.max_seqno = MinMaxInfo::UNSET;
        } else if next.info.min_seqno <= cur_max {
            next.info.min_seqno = cur_max + 1;
        }
    }

    for g in &gens {
        debug!(
            "replay generation {}: seqno [{}, {}] gen [{}, {}]",
            g.gen, g.info.min_seqno, g.info.max_seqno, g.info.min_gen, g.info.max_gen
        );
    }

    gens.into_iter()
        .map(|b| Arc::new(ReplayGeneration::new(b.gen, b.info)))
        .collect()
}

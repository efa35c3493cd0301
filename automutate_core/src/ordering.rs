//! Application order for the mutations of a single file.
//!
//! Mutations are applied by slicing and rebuilding the file contents, so an
//! edit shifts every position after it. Applying them from the end of the file
//! towards the start keeps each edit's offsets valid without any bookkeeping.

use crate::mutation::Mutation;
use tracing::debug;

/// Orders mutations ascending by effective end position.
///
/// The sort is stable: mutations sharing a position keep their relative order.
pub fn order_first_to_last<'a, I>(mutations: I) -> Vec<&'a Mutation>
where
    I: IntoIterator<Item = &'a Mutation>,
{
    let mut ordered: Vec<&Mutation> = mutations.into_iter().collect();
    ordered.sort_by_key(|mutation| mutation.effective_end());
    ordered
}

/// Orders mutations descending by effective end position (stable).
pub fn order_last_to_first<'a, I>(mutations: I) -> Vec<&'a Mutation>
where
    I: IntoIterator<Item = &'a Mutation>,
{
    let mut ordered: Vec<&Mutation> = mutations.into_iter().collect();
    ordered.sort_by(|a, b| b.effective_end().cmp(&a.effective_end()));
    ordered
}

/// Orders mutations last-to-first, dropping any that overlap a kept mutation.
///
/// Sweeping down from the highest position, a mutation survives only when its
/// effective end is strictly less than the `begin` of the previously kept one.
/// Touching ranges and repeated insertion points therefore count as overlaps:
/// the higher-positioned mutation wins and the other is skipped for this pass.
pub fn order_last_to_first_without_overlaps<'a, I>(mutations: I) -> Vec<&'a Mutation>
where
    I: IntoIterator<Item = &'a Mutation>,
{
    let ordered = order_first_to_last(mutations);
    let mut kept: Vec<&Mutation> = Vec::with_capacity(ordered.len());
    let mut last_start: Option<usize> = None;

    for mutation in ordered.into_iter().rev() {
        if let Some(start) = last_start {
            if mutation.effective_end() >= start {
                debug!(
                    mutation_type = mutation.type_name(),
                    begin = mutation.range.begin,
                    end = mutation.effective_end(),
                    kept_begin = start,
                    "Dropping overlapping mutation"
                );
                continue;
            }
        }

        last_start = Some(mutation.range.begin);
        kept.push(mutation);
    }

    kept
}

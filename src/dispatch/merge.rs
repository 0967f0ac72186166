//! Merging provider result lists.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::collections::hash_map::Entry;

use crate::types::ResultItem;

/// Total preference order between two items: [`ResultItem::rank_cmp`], then
/// provider id, then id. `Less` means `a` is preferred.
fn preference(a: &ResultItem, b: &ResultItem) -> Ordering {
    a.rank_cmp(b)
        .then_with(|| a.provider_id.cmp(&b.provider_id))
        .then_with(|| a.id.cmp(&b.id))
}

/// Merge result lists into one ranked, deduplicated list of at most `max`
/// items.
///
/// Items sharing an `id` collapse into the preferred one (higher priority,
/// then smaller title). The output is a function of the set of input items
/// only: the order of `lists`, and of items within them, does not matter.
pub fn merge_results<I>(lists: I, max: usize) -> Vec<ResultItem>
where
    I: IntoIterator<Item = Vec<ResultItem>>,
{
    let mut by_id: HashMap<String, ResultItem> = HashMap::new();
    for item in lists.into_iter().flatten() {
        match by_id.entry(item.id.clone()) {
            Entry::Occupied(mut slot) => {
                if preference(&item, slot.get()) == Ordering::Less {
                    slot.insert(item);
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(item);
            }
        }
    }

    let mut merged: Vec<ResultItem> = by_id.into_values().collect();
    merged.sort_by(preference);
    merged.truncate(max);
    merged
}

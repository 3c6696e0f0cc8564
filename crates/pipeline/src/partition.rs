//! Fair partition of work items across a fixed worker count.
//!
//! Transcode duration scales with source size, so items are bin-packed by
//! weight rather than by count: heaviest first, each into the currently
//! lightest bin. Every worker ends up with roughly equal total work even
//! when file sizes are wildly uneven.

/// Split `items` into exactly `bins` groups balanced by `weight`.
///
/// Items inside each bin come out heaviest-first, ready for the workers'
/// largest-first processing order. With fewer items than bins, the extra
/// bins are empty.
pub fn fair_partition<T, F>(items: Vec<T>, bins: usize, weight: F) -> Vec<Vec<T>>
where
    F: Fn(&T) -> u64,
{
    assert!(bins > 0, "at least one bin required");

    let mut groups: Vec<Vec<T>> = (0..bins).map(|_| Vec::new()).collect();
    let mut loads = vec![0u64; bins];

    let mut items: Vec<(u64, T)> = items.into_iter().map(|item| (weight(&item), item)).collect();
    // Heaviest first; ties keep enumeration order.
    items.sort_by(|a, b| b.0.cmp(&a.0));

    for (item_weight, item) in items {
        let lightest = loads
            .iter()
            .enumerate()
            .min_by_key(|(_, load)| **load)
            .map(|(index, _)| index)
            .expect("bins is non-zero");

        loads[lightest] += item_weight;
        groups[lightest].push(item);
    }

    groups
}

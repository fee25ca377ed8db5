// src/job/retention.rs

use std::collections::HashSet;

use super::model::HistoryEntry;

/// Keep the newest `keep_last` entries of a newest-first history.
///
/// A `keep_last` of zero can only come from a hand-edited document; it is
/// treated as one so the entry that was just added is never thrown away.
pub fn prune(mut history: Vec<HistoryEntry>, keep_last: u32) -> Vec<HistoryEntry> {
    let keep = keep_last.max(1) as usize;
    history.truncate(keep);
    history
}

/// [`prune`], except that an entry a kept `running` relaunch was resumed
/// from stays as well, so a relaunch never pushes out its own original.
///
/// The extra entry only outlives the relaunch's `running` phase: once the
/// relaunch is finalized, the next prune applies the keep-count normally.
pub fn prune_keeping_lineage(history: Vec<HistoryEntry>, keep_last: u32) -> Vec<HistoryEntry> {
    let keep = keep_last.max(1) as usize;
    if history.len() <= keep {
        return history;
    }

    let pinned: HashSet<String> = history
        .iter()
        .take(keep)
        .filter(|e| e.is_running())
        .filter_map(|e| e.resumed_from.clone())
        .collect();
    if pinned.is_empty() {
        return prune(history, keep_last);
    }

    history
        .into_iter()
        .enumerate()
        .filter(|(index, entry)| *index < keep || pinned.contains(&entry.id))
        .map(|(_, entry)| entry)
        .collect()
}

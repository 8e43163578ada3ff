//! Ordering of patch sets per destination branch
//!
//! A patch set can be merged once one of its parents is already on its destination: either
//! on the branch tip or in a patch set ordered before it. Each destination keeps a frontier
//! of commits known to be merged, starting with the branch tip. Passes over all destinations
//! repeat while they make progress; within a destination, resolved patch sets join the
//! frontier immediately so dependency chains resolve in a single pass.
//!
//! The resolved list is reversed before folding: merging the tip of a chain first brings its
//! ancestors along, and the ancestors then merge as no-ops.

use crate::artifacts::batch::BranchKey;
use crate::artifacts::objects::object_id::ObjectId;
use crate::errors::{BatchError, BatchResult};
use derive_new::new;
use std::collections::HashMap;
use std::fmt::Display;
use tracing::debug;

/// A patch set waiting to be ordered
#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct PendingMerge<P> {
    pub destination: BranchKey,
    pub commit: ObjectId,
    pub parents: Vec<ObjectId>,
    pub payload: P,
}

struct DestinationQueue<P> {
    key: BranchKey,
    frontier: Vec<ObjectId>,
    remaining: Vec<PendingMerge<P>>,
}

/// Order `items` so each can be merged onto its destination
///
/// `tips` holds the current tip of every destination. `is_merged_into(destination, commit,
/// tip)` answers whether `commit` is `tip` or one of its ancestors in the destination's
/// repository.
pub fn resolve<P: Display>(
    items: Vec<PendingMerge<P>>,
    tips: &HashMap<BranchKey, ObjectId>,
    mut is_merged_into: impl FnMut(&BranchKey, &ObjectId, &ObjectId) -> BatchResult<bool>,
) -> BatchResult<Vec<PendingMerge<P>>> {
    let mut queues: Vec<DestinationQueue<P>> = Vec::new();

    for item in items {
        let position = match queues.iter().position(|queue| queue.key == item.destination) {
            Some(position) => position,
            None => {
                let tip = tips.get(&item.destination).ok_or_else(|| BatchError::NoSuchRef {
                    name: item.destination.to_string(),
                })?;
                queues.push(DestinationQueue {
                    key: item.destination.clone(),
                    frontier: vec![tip.clone()],
                    remaining: Vec::new(),
                });
                queues.len() - 1
            }
        };
        queues[position].remaining.push(item);
    }

    let mut resolved = Vec::new();
    let mut progress = true;

    while progress {
        progress = false;

        for queue in &mut queues {
            while resolve_pass(queue, &mut resolved, &mut is_merged_into)? {
                progress = true;
            }
        }
    }

    if let Some(queue) = queues.iter().find(|queue| !queue.remaining.is_empty()) {
        let leftover = &queue.remaining[0];
        return Err(BatchError::UnresolvableDependency {
            item: leftover.payload.to_string(),
            branch: queue.key.to_string(),
        });
    }

    resolved.reverse();
    Ok(resolved)
}

/// One scan over a destination's remaining items; true if anything resolved
fn resolve_pass<P: Display>(
    queue: &mut DestinationQueue<P>,
    resolved: &mut Vec<PendingMerge<P>>,
    is_merged_into: &mut impl FnMut(&BranchKey, &ObjectId, &ObjectId) -> BatchResult<bool>,
) -> BatchResult<bool> {
    let mut found = false;
    let mut still_remaining = Vec::new();

    for item in std::mem::take(&mut queue.remaining) {
        if has_parent_on_frontier(&item, &queue.key, &queue.frontier, is_merged_into)? {
            debug!(item = %item.payload, destination = %queue.key, "resolved");
            queue.frontier.push(item.commit.clone());
            resolved.push(item);
            found = true;
        } else {
            still_remaining.push(item);
        }
    }

    queue.remaining = still_remaining;
    Ok(found)
}

fn has_parent_on_frontier<P>(
    item: &PendingMerge<P>,
    destination: &BranchKey,
    frontier: &[ObjectId],
    is_merged_into: &mut impl FnMut(&BranchKey, &ObjectId, &ObjectId) -> BatchResult<bool>,
) -> BatchResult<bool> {
    if item.parents.is_empty() {
        return Ok(true);
    }

    for tip in frontier {
        for parent in &item.parents {
            if is_merged_into(destination, parent, tip)? {
                return Ok(true);
            }
        }
    }

    Ok(false)
}

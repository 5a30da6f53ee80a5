//! Lossy-counting governor: bucketed pruning of low-count leaves.
//!
//! The insertion stream is divided into buckets of `bucket_size` weight. At
//! the end of each bucket the leaf queue is compressed: every squashable
//! leaf whose `count + delta` fell below the current bucket index is folded
//! into its parent. Squashed counts are not lost, they migrate upward; the
//! parent's `max_child_delta` records the error bound any future descendant
//! inherits.

prelude! {}

use crate::tree::SuffixTree;

impl SuffixTree {
    /// Runs a compress pass whenever the total weight crossed into a new
    /// bucket.
    pub(crate) fn maybe_compress(&mut self) {
        let bucket = self.total / self.bucket_size;
        if bucket > self.bucket_idx {
            self.bucket_idx = bucket;
            self.compress();
        }
    }

    /// One pass over the leaf queue, squashing every prunable leaf.
    ///
    /// Squashing detaches the current queue member, so the iteration holds
    /// on to the previous live member and resumes from its `next` link.
    /// Parents that ran out of children are appended at the back of the
    /// queue and reconsidered by this very pass.
    pub(crate) fn compress(&mut self) {
        let bound = self.bucket_idx as i64;
        let mut prev = Node::FRONT;
        loop {
            let current = self.arena.queue_next(prev);
            if current == Node::BACK {
                break;
            }
            let data = &self.arena[current];
            // A leaf other nodes still reach through suffix links must
            // stay; it becomes squashable once its referrers die.
            let squashable = data.incoming == 0 && data.count + data.delta < bound;
            if squashable {
                self.squash(current)
            } else {
                prev = current
            }
        }
    }

    /// Folds a leaf into its parent and marks it dead.
    ///
    /// The residual count `c` and error `d` move to the parent
    /// (`count += c`, `max_child_delta` raised to `c + d`); the parent's
    /// suffix target gives `c` back to cancel the double count the suffix
    /// topology would otherwise introduce at aggregation time.
    fn squash(&mut self, node: Node) {
        let parent = self.arena[node].parent;
        let count = self.arena[node].count;
        let delta = self.arena[node].delta;

        self.arena.queue_detach(node);
        let head = self.arena.head(node);
        self.arena.child_remove(parent, head);

        self.arena[parent].count += count;
        self.arena.add_child_delta(parent, count + delta);
        let parent_suffix = self.arena[parent].suffix;
        if !parent_suffix.is_dummy() {
            self.arena[parent_suffix].count -= count;
        }

        if let Some(target) = self.arena.drop_suffix(node) {
            self.reconsider(target)
        }
        self.arena.mark_dead(node);
        self.reconsider(parent);
    }

    /// Turns a branch into a queued leaf once nothing references it
    /// anymore (no children, no suffix-link referrers).
    fn reconsider(&mut self, node: Node) {
        if node == Node::ROOT || self.arena[node].incoming > 0 {
            return;
        }
        if let Kind::Branch { .. } = self.arena[node].kind {
            self.arena.branch_to_leaf(node)
        }
    }
}

//! Heavy-hitter enumeration over the suffix tree.
//!
//! Aggregation runs in two passes over a depth-indexed bucket list: a
//! root-to-leaves walk resets the scratch aggregates, then nodes are
//! processed by decreasing depth. Each node's total flows to its parent and
//! its suffix target, with the double count through the suffix topology
//! cancelled at the parent's suffix target. A node is *heavy* when the part
//! of its total not already attributed to a heavy descendant clears the
//! threshold.

prelude! {}

use crate::tree::SuffixTree;

/// A reported hot substring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeavyHitter {
    /// The substring: a sequence of location identifiers.
    pub label: Vec<Token>,
    /// Weight attributed to this node itself, heavier descendants
    /// discounted.
    pub light: u64,
    /// Total weight of sequences containing the label.
    pub total: u64,
    /// Upper bound on the true total, lossy-counting error included.
    pub upper: u64,
}

impl SuffixTree {
    /// Enumerates every substring whose weighted frequency clears
    /// `frequency * total_weight`, sorted by descending light count.
    pub fn heavy_hitters(&mut self, frequency: f64) -> Vec<HeavyHitter> {
        assert!(
            frequency > 0.0 && frequency <= 1.0,
            "frequency must be in (0, 1], got {}",
            frequency
        );
        let threshold = (frequency * self.total as f64).floor() as i64;

        // Root-to-leaves walk: depth bucket list plus scratch reset.
        let mut by_depth: Vec<Vec<Node>> = vec![];
        let mut stack = vec![(Node::ROOT, 0usize)];
        while let Some((node, depth)) = stack.pop() {
            {
                let data = &mut self.arena[node];
                data.depth = depth;
                data.descendants = 0;
                data.heavy_descendants = 0;
            }
            if by_depth.len() <= depth {
                by_depth.resize(depth + 1, vec![])
            }
            by_depth[depth].push(node);
            for child in self.children_of(node) {
                let child_depth = depth + self.arena.edge_len(child);
                stack.push((child, child_depth))
            }
        }

        // Aggregation by decreasing depth. After this pass a node's
        // `descendants` scratch holds its final total and
        // `heavy_descendants` its light count.
        for depth in (0..by_depth.len()).rev() {
            for &node in &by_depth[depth] {
                let (total, light, heavy_out) = {
                    let data = &self.arena[node];
                    let total = data.count + data.descendants;
                    let light = total - data.heavy_descendants;
                    let heavy_out = if light + data.delta > threshold {
                        total
                    } else {
                        data.heavy_descendants
                    };
                    (total, light, heavy_out)
                };
                {
                    let data = &mut self.arena[node];
                    data.descendants = total;
                    data.heavy_descendants = light;
                }
                if node == Node::ROOT {
                    continue;
                }

                let parent = self.arena[node].parent;
                let suffix = self.arena[node].suffix;
                let parent_suffix = self.arena[parent].suffix;
                self.arena[parent].descendants += total;
                self.arena[parent].heavy_descendants += heavy_out;
                if !suffix.is_dummy() {
                    self.arena[suffix].descendants += total;
                    self.arena[suffix].heavy_descendants += heavy_out;
                }
                if !parent_suffix.is_dummy() {
                    self.arena[parent_suffix].descendants -= total;
                    self.arena[parent_suffix].heavy_descendants -= heavy_out;
                }
            }
        }

        // Depth-first emission of the heavy nodes.
        let mut out = vec![];
        let mut stack: Vec<Node> = self.children_of(Node::ROOT);
        while let Some(node) = stack.pop() {
            let data = &self.arena[node];
            let total = data.descendants;
            let light = data.heavy_descendants;
            if light + data.delta > threshold {
                out.push(HeavyHitter {
                    label: self.arena.label(node),
                    light: light.max(0) as u64,
                    total: total.max(0) as u64,
                    upper: (total + data.delta).max(0) as u64,
                });
            }
            stack.extend(self.children_of(node));
        }

        out.sort_by(|a, b| b.light.cmp(&a.light));
        out
    }

    /// Children of a node, empty for leaves.
    fn children_of(&self, node: Node) -> Vec<Node> {
        match &self.arena[node].kind {
            Kind::Root { children } | Kind::Branch { children } => {
                children.values().cloned().collect()
            }
            Kind::Leaf { .. } => vec![],
            kind => panic!("[fatal] child iteration on a {:?} node", kind),
        }
    }
}

//! Generalized suffix tree with Ukkonen-style incremental construction.
//!
//! Each inserted token sequence is walked one position at a time with an
//! active-point cursor. When an extension step fails, the current edge is
//! split, a new leaf covering the rest of the sequence is attached, and the
//! cursor chases suffix links to the next shorter suffix. The first leaf an
//! insertion creates is its *destination*: the node whose count receives the
//! insertion's weight. When no leaf was needed (the sequence was already a
//! substring), the destination is forced into existence by a final split.
//!
//! Callers guarantee that a sequence never repeats a token and that
//! terminator tokens only appear at the end of a sequence.

prelude! {}

/// The active point: a cursor into the tree.
///
/// Invariant: `len < edge_len(child)`, and `len == 0` implies
/// `child == parent` (the cursor sits exactly on `parent`).
#[derive(Debug, Clone, Copy)]
pub(crate) struct Cursor {
    /// Deepest node at or above the cursor.
    pub parent: Node,
    /// Offset along `child`'s edge, `0` when the cursor is on `parent`.
    pub len: usize,
    /// Child whose edge the cursor points into; `parent` when `len == 0`.
    pub child: Node,
}
impl Cursor {
    /// Cursor sitting exactly on a node.
    pub fn at(node: Node) -> Self {
        Self {
            parent: node,
            len: 0,
            child: node,
        }
    }
}

/// Generalized suffix tree with lossy counting.
pub struct SuffixTree {
    /// Node arena and token texts.
    pub(crate) arena: Arena,
    /// Lossy-counting bucket width: `ceil(1 / error)`.
    pub(crate) bucket_size: u64,
    /// Index of the current bucket.
    pub(crate) bucket_idx: u64,
    /// Total weight inserted so far.
    pub(crate) total: u64,
}

impl SuffixTree {
    /// Constructor.
    ///
    /// `error` is the lossy-counting error bound, in `(0, 1]`: the reported
    /// count of any substring undercounts its true count by at most
    /// `error * total_weight`.
    pub fn new(error: f64) -> Self {
        assert!(
            error > 0.0 && error <= 1.0,
            "lossy-counting error must be in (0, 1], got {}",
            error
        );
        let bucket_size = (1.0 / error).ceil() as u64;
        Self {
            arena: Arena::new(),
            bucket_size: bucket_size.max(1),
            bucket_idx: 0,
            total: 0,
        }
    }

    /// Total weight inserted so far.
    pub fn total_weight(&self) -> u64 {
        self.total
    }

    /// Attempts to extend the cursor by one token.
    fn scan(&self, cur: &mut Cursor, token: Token) -> bool {
        if cur.len == 0 {
            match self.arena.child_of(cur.parent, token) {
                None => false,
                Some(child) => {
                    if self.arena.edge_len(child) == 1 {
                        *cur = Cursor::at(child)
                    } else {
                        cur.child = child;
                        cur.len = 1;
                    }
                    true
                }
            }
        } else if self.arena.edge_token(cur.child, cur.len) == token {
            cur.len += 1;
            if cur.len == self.arena.edge_len(cur.child) {
                *cur = Cursor::at(cur.child)
            }
            true
        } else {
            false
        }
    }

    /// The node at the cursor, splitting the current edge when the cursor
    /// sits strictly inside it.
    fn split_at(&mut self, cur: &Cursor) -> Node {
        if cur.len == 0 {
            cur.parent
        } else {
            self.arena.split_edge(cur.child, cur.len)
        }
    }

    /// Moves to the locus of the suffix of `node`'s label (the label minus
    /// its first token), through the suffix link when present and by a
    /// skip-count rescan from the parent's suffix locus otherwise.
    fn goto_suffix(&mut self, node: Node) -> Cursor {
        if node == Node::ROOT {
            return Cursor::at(Node::ROOT);
        }
        let suffix = self.arena[node].suffix;
        if !suffix.is_dummy() {
            return Cursor::at(suffix);
        }

        let parent = self.arena[node].parent;
        let edge = self.arena[node].edge;
        let (mut cur, mut start, mut len) = if parent == Node::ROOT {
            // Dropping the first token happens on this very edge.
            (Cursor::at(Node::ROOT), edge.start + 1, edge.len - 1)
        } else {
            let parent_suffix = self.arena[parent].suffix;
            debug_assert!(!parent_suffix.is_dummy());
            (Cursor::at(parent_suffix), edge.start, edge.len)
        };

        // Skip-count: only the first token of each edge is inspected, the
        // suffix path is guaranteed to exist.
        while len > 0 {
            debug_assert_eq!(cur.len, 0);
            let token = self.arena.text(edge.text)[start];
            let child = self
                .arena
                .child_of(cur.parent, token)
                .unwrap_or_else(|| panic!("[fatal] suffix path is missing below {}", cur.parent));
            let child_len = self.arena.edge_len(child);
            if child_len <= len {
                start += child_len;
                len -= child_len;
                cur = Cursor::at(child);
            } else {
                cur = Cursor {
                    parent: cur.parent,
                    len,
                    child,
                };
                len = 0;
            }
        }
        cur
    }

    /// Walks `node`'s suffix chain, splitting loci into real nodes and
    /// setting links until reaching one that already has a link (or the
    /// root).
    fn materialize_links(&mut self, mut node: Node) {
        while node != Node::ROOT && self.arena[node].suffix.is_dummy() {
            let cur = self.goto_suffix(node);
            let target = self.split_at(&cur);
            self.arena.set_suffix(node, target);
            node = target;
        }
    }

    /// Inserts a token sequence with some weight.
    ///
    /// The sequence must not repeat a token.
    pub fn insert(&mut self, tokens: &[Token], weight: u64) {
        if tokens.is_empty() || weight == 0 {
            return;
        }
        debug_assert!(
            {
                let mut seen = HSet::new();
                tokens.iter().all(|t| seen.insert(*t))
            },
            "token sequences must not repeat a token"
        );

        let text = self.arena.add_text(tokens.to_vec());
        let n = tokens.len();

        let mut cur = Cursor::at(Node::ROOT);
        // First leaf created, where the weight lands.
        let mut dest: Option<Node> = None;
        // Most recent leaf, head of the leaf suffix chain.
        let mut last_leaf: Option<Node> = None;
        // Split node awaiting its suffix link.
        let mut pending: Option<Node> = None;
        // Oldest suffix not yet covered by a leaf.
        let mut j = 0usize;

        let mut i = 0usize;
        'positions: while i < n {
            let token = tokens[i];
            loop {
                if self.scan(&mut cur, token) {
                    // The extended suffix already exists; the phase ends.
                    debug_assert!(pending.is_none());
                    i += 1;
                    continue 'positions;
                }

                let was_inside_edge = cur.len > 0;
                let node = self.split_at(&cur);
                if let Some(previous) = pending.take() {
                    debug_assert!(previous != node);
                    self.arena.set_suffix(previous, node);
                }

                let leaf = self.arena.new_leaf(node, text, i);
                if let Some(previous) = last_leaf {
                    self.arena.set_suffix(previous, leaf)
                }
                last_leaf = Some(leaf);
                if dest.is_none() {
                    dest = Some(leaf)
                }
                j += 1;

                if node == Node::ROOT {
                    // The empty suffix gained a child; move on.
                    debug_assert_eq!(j, i + 1);
                    cur = Cursor::at(Node::ROOT);
                    i += 1;
                    continue 'positions;
                }

                if was_inside_edge {
                    pending = Some(node)
                }
                cur = self.goto_suffix(node);
                if cur.len == 0 {
                    if let Some(previous) = pending.take() {
                        debug_assert!(previous != cur.parent);
                        self.arena.set_suffix(previous, cur.parent);
                    }
                }
            }
        }
        debug_assert!(pending.is_none());
        base::destroy(j);

        let dest = match dest {
            Some(leaf) => {
                let last = last_leaf.expect("a created leaf was recorded");
                self.materialize_links(last);
                leaf
            }
            None => {
                // The sequence was already a substring; its locus becomes
                // the destination.
                let node = self.split_at(&cur);
                self.materialize_links(node);
                node
            }
        };
        self.arena[dest].count += weight as i64;

        self.total += weight;
        self.maybe_compress();
    }
}

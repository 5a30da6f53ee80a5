//! Node arena for the suffix tree.
//!
//! All cross-references (parent, suffix link, children, leaf-queue
//! neighbors) are [`Node`] handles into the arena. The sentinel handles
//! [`Node::DUMMY`], [`Node::FRONT`] and [`Node::BACK`] mark unset links and
//! the two ends of the leaf queue; the root always sits at [`Node::ROOT`].
//!
//! Structural mutation goes through the helpers here, which keep the
//! incoming-reference counters (children plus suffix-link referrers) and the
//! leaf queue consistent; mutating fields directly from the outside is how
//! the invariants die.

prelude! {}

/// Token fed to the suffix tree: a location identifier.
pub type Token = u64;

/// Handle to a node in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Node {
    idx: usize,
}
impl Node {
    /// Sentinel for unset links.
    pub const DUMMY: Node = Node { idx: 0 };
    /// Front sentinel of the leaf queue.
    pub const FRONT: Node = Node { idx: 1 };
    /// Back sentinel of the leaf queue.
    pub const BACK: Node = Node { idx: 2 };
    /// The root of the tree.
    pub const ROOT: Node = Node { idx: 3 };

    /// True for the unset-link sentinel.
    pub fn is_dummy(self) -> bool {
        self == Self::DUMMY
    }
}
impl fmt::Display for Node {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        self.idx.fmt(fmt)
    }
}

/// An edge label: a slice of one of the stored token texts.
#[derive(Debug, Clone, Copy)]
pub struct Edge {
    /// Index of the text the label is a slice of.
    pub text: usize,
    /// Start offset of the label in the text.
    pub start: usize,
    /// Length of the label.
    pub len: usize,
}
impl Edge {
    /// The empty edge of the root and the sentinels.
    pub fn empty() -> Self {
        Self {
            text: 0,
            start: 0,
            len: 0,
        }
    }
}

/// Node variant.
///
/// Child maps exist only on `Root` and `Branch`; queue membership is a
/// property of `Leaf` and the two sentinels.
#[derive(Debug)]
pub enum Kind {
    /// The root.
    Root {
        /// Children, keyed by the first token of their edge.
        children: BTMap<Token, Node>,
    },
    /// An internal node.
    Branch {
        /// Children, keyed by the first token of their edge.
        children: BTMap<Token, Node>,
    },
    /// A leaf, member of the leaf queue.
    Leaf {
        /// Previous queue member.
        prev: Node,
        /// Next queue member.
        next: Node,
    },
    /// Front sentinel of the leaf queue.
    Front {
        /// First queue member.
        next: Node,
    },
    /// Back sentinel of the leaf queue.
    Back {
        /// Last queue member.
        prev: Node,
    },
    /// A squashed node, retained in the arena but out of the tree.
    Dead,
}

/// A node's attributes.
#[derive(Debug)]
pub struct NodeData {
    /// Variant.
    pub kind: Kind,
    /// Parent, `DUMMY` for the root and the sentinels.
    pub parent: Node,
    /// Suffix link, `DUMMY` while unset.
    pub suffix: Node,
    /// Edge label from the parent.
    pub edge: Edge,
    /// Weighted hits terminating at this node.
    pub count: i64,
    /// Lossy-counting error bound for this node.
    pub delta: i64,
    /// Bound propagated to new descendants.
    pub max_child_delta: i64,
    /// Children plus suffix-link referrers.
    pub incoming: usize,
    /// Aggregation scratch: descendant count total.
    pub descendants: i64,
    /// Aggregation scratch: heavy descendant count total.
    pub heavy_descendants: i64,
    /// Token depth of the node's label, set during the output walk.
    pub depth: usize,
}

impl NodeData {
    fn new(kind: Kind, parent: Node, edge: Edge) -> Self {
        Self {
            kind,
            parent,
            suffix: Node::DUMMY,
            edge,
            count: 0,
            delta: 0,
            max_child_delta: 0,
            incoming: 0,
            descendants: 0,
            heavy_descendants: 0,
            depth: 0,
        }
    }
}

/// The arena: nodes plus the token texts edges slice into.
pub struct Arena {
    /// All nodes ever created, dead ones included.
    nodes: Vec<NodeData>,
    /// Token sequences inserted so far.
    texts: Vec<Vec<Token>>,
}

impl ops::Index<Node> for Arena {
    type Output = NodeData;
    fn index(&self, node: Node) -> &NodeData {
        &self.nodes[node.idx]
    }
}
impl ops::IndexMut<Node> for Arena {
    fn index_mut(&mut self, node: Node) -> &mut NodeData {
        &mut self.nodes[node.idx]
    }
}

impl Arena {
    /// Constructor: dummy, queue sentinels and root.
    pub fn new() -> Self {
        let nodes = vec![
            NodeData::new(Kind::Dead, Node::DUMMY, Edge::empty()),
            NodeData::new(Kind::Front { next: Node::BACK }, Node::DUMMY, Edge::empty()),
            NodeData::new(Kind::Back { prev: Node::FRONT }, Node::DUMMY, Edge::empty()),
            NodeData::new(
                Kind::Root {
                    children: BTMap::new(),
                },
                Node::DUMMY,
                Edge::empty(),
            ),
        ];
        Self {
            nodes,
            texts: vec![],
        }
    }

    /// Number of live (non-dead, non-sentinel) nodes, root included.
    pub fn live_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|data| match data.kind {
                Kind::Root { .. } | Kind::Branch { .. } | Kind::Leaf { .. } => true,
                Kind::Front { .. } | Kind::Back { .. } | Kind::Dead => false,
            })
            .count()
    }

    fn push(&mut self, data: NodeData) -> Node {
        let idx = self.nodes.len();
        self.nodes.push(data);
        Node { idx }
    }

    /// Stores a token sequence, yielding its text index.
    pub fn add_text(&mut self, tokens: Vec<Token>) -> usize {
        self.texts.push(tokens);
        self.texts.len() - 1
    }

    /// A stored token sequence.
    pub fn text(&self, idx: usize) -> &[Token] {
        &self.texts[idx]
    }

    /// Length of a node's edge label.
    pub fn edge_len(&self, node: Node) -> usize {
        self[node].edge.len
    }

    /// Token of a node's edge label at some offset.
    pub fn edge_token(&self, node: Node, offset: usize) -> Token {
        let edge = self[node].edge;
        debug_assert!(offset < edge.len);
        self.texts[edge.text][edge.start + offset]
    }

    /// First token of a node's edge label, the key under which its parent
    /// indexes it.
    pub fn head(&self, node: Node) -> Token {
        self.edge_token(node, 0)
    }

    /// The node's full label, root to node.
    pub fn label(&self, node: Node) -> Vec<Token> {
        let mut parts = vec![];
        let mut current = node;
        while current != Node::ROOT {
            let edge = self[current].edge;
            parts.push(&self.texts[edge.text][edge.start..edge.start + edge.len]);
            current = self[current].parent;
        }
        let mut label = Vec::with_capacity(parts.iter().map(|p| p.len()).sum());
        for part in parts.into_iter().rev() {
            label.extend_from_slice(part)
        }
        label
    }

    /// Child of a node under some token, if any.
    ///
    /// Leaves have no children.
    pub fn child_of(&self, node: Node, token: Token) -> Option<Node> {
        match &self[node].kind {
            Kind::Root { children } | Kind::Branch { children } => children.get(&token).cloned(),
            Kind::Leaf { .. } => None,
            kind => panic!("[fatal] child lookup on a {:?} node", kind),
        }
    }

    /// Child map of a node, which must be a root or a branch.
    fn children_mut(&mut self, node: Node) -> &mut BTMap<Token, Node> {
        match &mut self[node].kind {
            Kind::Root { children } | Kind::Branch { children } => children,
            kind => panic!("[fatal] child-map access on a {:?} node", kind),
        }
    }

    /// Inserts a child under its parent, keyed by the child's head token.
    ///
    /// A leaf parent is converted to a branch first (and leaves the leaf
    /// queue). Counts one more incoming reference on the parent.
    pub fn child_insert(&mut self, parent: Node, child: Node) {
        if let Kind::Leaf { .. } = self[parent].kind {
            self.queue_detach(parent);
            self[parent].kind = Kind::Branch {
                children: BTMap::new(),
            };
        }
        let head = self.head(child);
        let prev = self.children_mut(parent).insert(head, child);
        debug_assert!(prev.is_none());
        self[parent].incoming += 1;
        self[child].parent = parent;
    }

    /// Removes the child under `head` from its parent's map.
    ///
    /// Drops one incoming reference from the parent; the caller decides
    /// whether the parent should become a leaf.
    pub fn child_remove(&mut self, parent: Node, head: Token) {
        let removed = self.children_mut(parent).remove(&head);
        debug_assert!(removed.is_some());
        debug_assert!(self[parent].incoming > 0);
        self[parent].incoming -= 1;
    }

    /// Sets a node's suffix link, counting the reference on the target.
    pub fn set_suffix(&mut self, node: Node, target: Node) {
        debug_assert!(self[node].suffix.is_dummy());
        debug_assert!(node != target);
        self[node].suffix = target;
        self[target].incoming += 1;
    }

    /// Clears a node's suffix link, dropping the reference on the target.
    ///
    /// Returns the old target so the caller can reconsider it.
    pub fn drop_suffix(&mut self, node: Node) -> Option<Node> {
        let target = self[node].suffix;
        if target.is_dummy() {
            None
        } else {
            self[node].suffix = Node::DUMMY;
            debug_assert!(self[target].incoming > 0);
            self[target].incoming -= 1;
            Some(target)
        }
    }

    /// Raises a node's descendant-error bound.
    pub fn add_child_delta(&mut self, node: Node, bound: i64) {
        let data = &mut self[node];
        if data.max_child_delta < bound {
            data.max_child_delta = bound
        }
    }

    fn set_queue_next(&mut self, node: Node, value: Node) {
        match &mut self[node].kind {
            Kind::Leaf { next, .. } | Kind::Front { next } => *next = value,
            kind => panic!("[fatal] queue-next write on a {:?} node", kind),
        }
    }
    fn set_queue_prev(&mut self, node: Node, value: Node) {
        match &mut self[node].kind {
            Kind::Leaf { prev, .. } | Kind::Back { prev } => *prev = value,
            kind => panic!("[fatal] queue-prev write on a {:?} node", kind),
        }
    }

    /// Next member of the leaf queue after `node` (a leaf or the front
    /// sentinel).
    pub fn queue_next(&self, node: Node) -> Node {
        match &self[node].kind {
            Kind::Leaf { next, .. } | Kind::Front { next } => *next,
            kind => panic!("[fatal] queue-next read on a {:?} node", kind),
        }
    }

    /// Unlinks a leaf from the queue.
    pub fn queue_detach(&mut self, node: Node) {
        let (prev, next) = match &self[node].kind {
            Kind::Leaf { prev, next } => (*prev, *next),
            kind => panic!("[fatal] queue detach on a {:?} node", kind),
        };
        self.set_queue_next(prev, next);
        self.set_queue_prev(next, prev);
    }

    /// Appends a leaf at the back of the queue.
    fn queue_push_back(&mut self, node: Node) {
        let last = match &self[Node::BACK].kind {
            Kind::Back { prev } => *prev,
            kind => panic!("[fatal] back sentinel is a {:?} node", kind),
        };
        match &mut self[node].kind {
            Kind::Leaf { prev, next } => {
                *prev = last;
                *next = Node::BACK;
            }
            kind => panic!("[fatal] queue append on a {:?} node", kind),
        }
        self.set_queue_next(last, node);
        self.set_queue_prev(Node::BACK, node);
    }

    /// Creates a leaf under `parent` labeled by `text[start..]`.
    ///
    /// Its error bounds initialize from the parent's descendant bound.
    pub fn new_leaf(&mut self, parent: Node, text: usize, start: usize) -> Node {
        let len = self.texts[text].len() - start;
        debug_assert!(len >= 1);
        let bound = self[parent].max_child_delta;
        let mut data = NodeData::new(
            Kind::Leaf {
                prev: Node::DUMMY,
                next: Node::DUMMY,
            },
            parent,
            Edge { text, start, len },
        );
        data.delta = bound;
        data.max_child_delta = bound;
        let node = self.push(data);
        self.queue_push_back(node);
        self.child_insert(parent, node);
        node
    }

    /// Splits `child`'s edge at `offset`, returning the new node sitting
    /// between `child` and its parent.
    ///
    /// The new node's error bounds initialize from the original parent's
    /// descendant bound, like a fresh leaf's.
    pub fn split_edge(&mut self, child: Node, offset: usize) -> Node {
        let edge = self[child].edge;
        debug_assert!(0 < offset && offset < edge.len);
        let parent = self[child].parent;
        let old_head = self.head(child);

        let bound = self[parent].max_child_delta;
        let mut data = NodeData::new(
            Kind::Branch {
                children: BTMap::new(),
            },
            parent,
            Edge {
                text: edge.text,
                start: edge.start,
                len: offset,
            },
        );
        data.delta = bound;
        data.max_child_delta = bound;
        let node = self.push(data);

        self.child_remove(parent, old_head);
        self.child_insert(parent, node);

        self[child].edge = Edge {
            text: edge.text,
            start: edge.start + offset,
            len: edge.len - offset,
        };
        self.child_insert(node, child);

        node
    }

    /// Converts a childless branch to a leaf and queues it for
    /// reconsideration by the governor.
    pub fn branch_to_leaf(&mut self, node: Node) {
        match &self[node].kind {
            Kind::Branch { children } => debug_assert!(children.is_empty()),
            kind => panic!("[fatal] leaf conversion on a {:?} node", kind),
        }
        self[node].kind = Kind::Leaf {
            prev: Node::DUMMY,
            next: Node::DUMMY,
        };
        self.queue_push_back(node);
    }

    /// Marks a detached node dead.
    pub fn mark_dead(&mut self, node: Node) {
        self[node].kind = Kind::Dead
    }

    /// True if the node was squashed.
    pub fn is_dead(&self, node: Node) -> bool {
        match self[node].kind {
            Kind::Dead => true,
            _ => false,
        }
    }
}

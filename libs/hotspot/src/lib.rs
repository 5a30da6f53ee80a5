//! Streaming heavy-hitter analysis over backtraces.
//!
//! A [`SuffixTree`] ingests token sequences (backtraces of location
//! identifiers) with weights, maintaining a generalized suffix tree built
//! Ukkonen-style. Lossy counting bounds its memory: low-count leaves are
//! periodically squashed into their parents, with per-node error deltas
//! tracking what was lost. At output time, [`heavy_hitters`] aggregates
//! counts over the suffix topology and reports every substring whose
//! weighted frequency clears a configurable floor.
//!
//! [`heavy_hitters`]: struct.SuffixTree.html#method.heavy_hitters (heavy_hitters method)

#[macro_use]
mod macros;

pub use base::err;

#[macro_use]
pub mod prelude;

pub mod arena;
mod govern;
pub mod report;
pub mod tree;

#[cfg(test)]
mod test;

pub use arena::Token;
pub use report::HeavyHitter;
pub use tree::SuffixTree;

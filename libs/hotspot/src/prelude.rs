//! Common imports for the modules in this crate.

pub use base::prelude::*;

pub use crate::arena::{self, Arena, Edge, Kind, Node, NodeData, Token};

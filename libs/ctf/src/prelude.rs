//! Common imports for the modules in this crate.

pub use base::prelude::*;

pub use crate::{
    ast,
    btrace::{self, DecodeCache, EncodeCache},
    buf::{self, ByteBuf, Pos},
    hook::{self, AllocSink, RawSlot, SlotResolver, TraceClock},
    loc::{self, LocId, Location, RawLocation},
    mtf::{self, MtfTable},
    parse, write, MAGIC,
};

/// A duration since the start of the run as microseconds.
pub type Clock = u64;
/// A difference between two [`Clock`] values.
///
/// [`Clock`]: type.Clock.html (Clock type)
pub type DeltaClock = u64;

/// Type of allocation identifiers.
pub type AllocId = u64;

//! Event and header types for the trace format.

prelude! {}

/// Size of a packet header on the wire, in bytes.
pub const HEADER_BYTES: usize = 44;

/// Number of low bits of an event header holding the timestamp.
pub const EVENT_TIME_BITS: u32 = 25;
/// Mask extracting the timestamp bits of an event header.
pub const EVENT_TIME_MASK: u32 = (1 << EVENT_TIME_BITS) - 1;

/// Packs an event code and a timestamp into an event header word.
///
/// Only the low 25 bits of the timestamp are stored; the packet header's
/// begin time restores the rest.
pub fn pack_event_header(code: u32, time: Clock) -> u32 {
    (code << EVENT_TIME_BITS) | (time as u32 & EVENT_TIME_MASK)
}

/// Header-related types.
pub mod header {
    prelude! {}

    /// A packet header.
    ///
    /// On the wire (all little-endian):
    ///
    /// ```text
    /// u32 magic | u32 packet_size_bits | u32 content_size_bits
    /// | u64 ts_begin | u64 ts_end | u64 alloc_id_begin | u64 alloc_id_end
    /// ```
    #[derive(Debug, Clone)]
    pub struct Packet {
        /// Size of the packet's event content in bytes, header excluded.
        pub content_size: u32,
        /// Packet timestamp interval.
        pub timestamp: Range<Clock>,
        /// Allocation IDs assigned in this packet.
        pub alloc_id: Range<AllocId>,
        /// Packet index in the trace, for error reporting.
        pub id: usize,
    }
}

/// Event-related types.
pub mod event {
    use super::*;

    /// Code for location events.
    const LOCS_CODE: u32 = 0;
    /// Code for allocation events.
    const ALLOC_CODE: u32 = 1;
    /// Code for promotion events.
    const PROMOTION_CODE: u32 = 2;
    /// Code for collection events.
    const COLLECTION_CODE: u32 = 3;

    /// Codes reserved for future compact allocation encodings.
    ///
    /// Never emitted by the writer; the reader refuses them.
    const RESERVED_SHORT_ALLOC: Range<u32> = Range::new(101, 116);

    /// Event kind.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Kind {
        /// Locations event.
        Locs,
        /// Allocation event.
        Alloc,
        /// Promotion event.
        Promotion,
        /// Collection event.
        Collection,
    }
    impl Kind {
        /// Constructor from an event code.
        pub fn from_code(code: u32) -> Res<Self> {
            let res = if code == LOCS_CODE {
                Self::Locs
            } else if code == ALLOC_CODE {
                Self::Alloc
            } else if code == PROMOTION_CODE {
                Self::Promotion
            } else if code == COLLECTION_CODE {
                Self::Collection
            } else if RESERVED_SHORT_ALLOC.contains(code) {
                bad_format!(
                    "event code {} is reserved for future compact allocation encodings",
                    code
                )
            } else {
                bad_format!("unexpected event code `{}`", code)
            };
            Ok(res)
        }

        /// Event code of an event kind.
        pub fn code(self) -> u32 {
            match self {
                Self::Locs => LOCS_CODE,
                Self::Alloc => ALLOC_CODE,
                Self::Promotion => PROMOTION_CODE,
                Self::Collection => COLLECTION_CODE,
            }
        }
    }

    /// An event, decoded version.
    #[derive(Debug, Clone)]
    pub enum Event<'data> {
        /// Location event.
        Locs(Locs<'data>),
        /// Allocation event.
        Alloc(Alloc),
        /// Promotion event.
        Promotion(AllocId),
        /// Collection event.
        Collection(AllocId),
    }
    impl<'data> Event<'data> {
        /// One-word description of the event.
        pub fn name(&self) -> &'static str {
            match self {
                Self::Locs(_) => "locations",
                Self::Alloc(_) => "allocation",
                Self::Promotion(_) => "promotion",
                Self::Collection(_) => "collection",
            }
        }
    }

    /// Allocation event.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Alloc {
        /// Allocation ID.
        pub id: AllocId,
        /// Size of the allocation in words.
        pub len: usize,
        /// Sample count.
        pub nsamples: usize,
        /// True if the allocation happened on the major heap.
        pub is_major: bool,
        /// Number of frames shared with the previous backtrace, at the old
        /// end of the stack.
        pub common_pref_len: usize,
        /// Backtrace of the allocation, oldest frame first.
        pub backtrace: Vec<u64>,
    }
}

/// A collection of locations declared for one identifier.
#[derive(Debug, Clone)]
pub struct Locs<'data> {
    /// Identifier the locations resolve.
    pub id: LocId,
    /// Location records, outermost frame first.
    pub locs: Vec<loc::Location<'data>>,
}

pub use event::{Alloc, Event, Kind};
pub use header::Packet;

//! Binary codec for memtrail's packetized allocation-trace format.
//!
//! A trace is a sequence of CTF packets, each carrying a 44-byte header and a
//! run of events: location declarations, sampled allocations, promotions and
//! collections. Allocation backtraces are compressed through a direct-mapped
//! cache with next-location prediction ([`btrace`]), and location metadata
//! through move-to-front tables ([`mtf`]).
//!
//! The writer side lives in [`write`], the reader side in [`parse`]. Both
//! share the same cache and MTF state machines, so the reader reconstructs
//! the writer's decisions by replaying the wire codes.

#[macro_use]
mod macros;

pub use base::err;

#[macro_use]
pub mod prelude;

pub mod ast;
pub mod btrace;
pub mod buf;
pub mod hook;
pub mod loc;
pub mod mtf;
pub mod parse;
pub mod write;

#[cfg(test)]
mod test;

prelude! {}

/// Magic number starting every packet.
pub const MAGIC: u32 = 0xc1fc1fc1;

/// Activates verbose parsing, only useful when debugging the codec.
const VERB: bool = false;
/// Activates very verbose parsing, only useful when debugging the codec.
const DEBUG_VERB: bool = false;

/// Runs an action on every event of a trace, in order.
///
/// Location events are handled internally (they populate the location
/// registry of the parser's context); the action still sees them. Returns the
/// fully-populated parser so that callers can inspect the location registry
/// once the trace is consumed.
pub fn scan<'data>(
    bytes: &'data [u8],
    mut action: impl FnMut(Clock, &ast::Event<'data>) -> Res<()>,
) -> Res<parse::TraceParser<'data>> {
    let mut parser = parse::TraceParser::new(bytes)?;
    while let Some(mut packet) = parser.next_packet()? {
        while let Some((clock, event)) = packet.next_event()? {
            action(clock, &event)?
        }
    }
    Ok(parser)
}

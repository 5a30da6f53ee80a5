//! Trace writer: packet framing and event encoding.
//!
//! The writer consumes the runtime's sampling callbacks and emits packets to
//! its destination. Each packet is laid down with a placeholder header that
//! is rewritten with the final sizes, timestamps and allocation-ID interval
//! just before emission.
//!
//! Location declarations are buffered in a pending queue and written as
//! dedicated location packets *before* the data packet whose events
//! reference them, so a reader always resolves an identifier it has already
//! seen declared.

prelude! {}

use crate::ast::{event::Kind, pack_event_header, HEADER_BYTES};

/// Total size of a packet buffer, header included.
pub const PACKET_BYTES: usize = 1 << 15;
/// Hard cap on the size of a single event.
pub const MAX_EV_SIZE: usize = 4096;
/// Hard cap on the size of a single location declaration.
pub const MAX_LOCATION: usize = 4096;
/// Pending-location count that forces a flush.
const PENDING_WATERMARK: usize = 128;
/// Widest timestamp interval a packet may span, in microseconds.
///
/// Event headers store 25-bit timestamps; keeping a packet under one wrap
/// lets the reader splice them back with the single-overflow rule.
const MAX_PACKET_SPAN: Clock = (1 << ast::EVENT_TIME_BITS) - 1;

/// A packet under construction: buffer plus lifecycle timestamps.
struct PacketBuf {
    /// Event bytes, preceded by the placeholder header.
    buf: ByteBuf,
    /// Time the packet was opened at.
    ts_begin: Clock,
    /// Time of the last event appended.
    ts_end: Clock,
}

impl PacketBuf {
    fn new() -> Self {
        Self {
            buf: ByteBuf::new(PACKET_BYTES),
            ts_begin: 0,
            ts_end: 0,
        }
    }

    /// Opens a fresh packet: clears the buffer and lays down a placeholder
    /// header.
    fn open(&mut self, ts: Clock) -> Res<()> {
        self.buf.clear();
        self.buf.put_u32(MAGIC)?;
        // Sizes, timestamps and allocation interval are patched at seal
        // time.
        self.buf.put_u32(0)?;
        self.buf.put_u32(0)?;
        self.buf.put_u64(0)?;
        self.buf.put_u64(0)?;
        self.buf.put_u64(0)?;
        self.buf.put_u64(0)?;
        debug_assert_eq!(self.buf.len(), HEADER_BYTES);
        self.ts_begin = ts;
        self.ts_end = ts;
        Ok(())
    }

    /// Seals the packet: rewrites the header with the final sizes,
    /// timestamps and allocation-ID interval.
    fn seal(&mut self, alloc_id: Range<AllocId>) {
        let content_bytes = self.buf.len() - HEADER_BYTES;
        let bits: u32 = convert(content_bytes * 8, "packet seal: content bits");
        self.buf.patch_u32(Pos::from(4), bits);
        self.buf.patch_u32(Pos::from(8), bits);
        self.buf.patch_u64(Pos::from(12), self.ts_begin);
        self.buf.patch_u64(Pos::from(20), self.ts_end);
        self.buf.patch_u64(Pos::from(28), alloc_id.lbound);
        self.buf.patch_u64(Pos::from(36), alloc_id.ubound);
    }

    /// Notes that an event at `ts` was appended.
    fn note_event(&mut self, ts: Clock) {
        debug_assert!(self.ts_end <= ts);
        self.ts_end = ts
    }

    fn free(&self) -> usize {
        self.buf.free()
    }
    fn has_events(&self) -> bool {
        self.buf.len() > HEADER_BYTES
    }
    fn bytes(&self) -> &[u8] {
        self.buf.as_bytes()
    }
}

/// A location waiting to be declared: the identifier events reference, and
/// the raw slot the symbol resolver understands.
struct PendingLoc {
    id: LocId,
    slot: RawSlot,
}

/// Trace writer.
///
/// Owns the destination, the encode-side compression state (backtrace cache
/// and MTF tables), the pending-location queue and the current packet
/// buffers. Implements the runtime's sampling-callback interface through
/// [`hook::AllocSink`].
pub struct Writer<W, R, C>
where
    W: io::Write,
    R: SlotResolver,
    C: TraceClock,
{
    /// Destination descriptor.
    dest: W,
    /// Symbol resolver for raw stack slots.
    resolver: R,
    /// Monotone clock.
    clock: C,
    /// File-path MTF table.
    files: MtfTable<String>,
    /// Definition-name MTF table.
    defs: MtfTable<String>,
    /// Locations referenced but not declared yet.
    pending: Vec<PendingLoc>,
    /// Identifiers already declared or queued for declaration.
    announced: HSet<LocId>,
    /// Backtrace encode cache.
    cache: EncodeCache,
    /// Optional mirror of the reader's cache; when set, every allocation is
    /// decoded back and checked against the raw stack.
    mirror: Option<DecodeCache>,
    /// Current data packet.
    data: PacketBuf,
    /// Scratch packet for location declarations, reused at every flush.
    locs: PacketBuf,
    /// Previous allocation's stack, oldest frame first.
    last_stack: Vec<RawSlot>,
    /// Scratch buffer the incoming stack is reversed into.
    scratch: Vec<RawSlot>,
    /// Next allocation ID to assign.
    next_alloc_id: AllocId,
    /// First allocation ID of the current data packet.
    start_alloc_id: AllocId,
}

impl<W, R, C> Writer<W, R, C>
where
    W: io::Write,
    R: SlotResolver,
    C: TraceClock,
{
    /// Constructor; opens the first packet at the current time.
    pub fn new(dest: W, resolver: R, mut clock: C) -> Res<Self> {
        let now = micros_of(clock.now());
        let mut data = PacketBuf::new();
        data.open(now)?;
        Ok(Self {
            dest,
            resolver,
            clock,
            files: MtfTable::new(),
            defs: MtfTable::new(),
            pending: Vec::with_capacity(PENDING_WATERMARK),
            announced: HSet::new(),
            cache: EncodeCache::new(),
            mirror: None,
            data,
            locs: PacketBuf::new(),
            last_stack: Vec::with_capacity(64),
            scratch: Vec::with_capacity(64),
            next_alloc_id: 0,
            start_alloc_id: 0,
        })
    }

    /// Activates the in-process reader-cache mirror.
    ///
    /// Every allocation event is decoded back right after encoding and the
    /// reconstruction is asserted identical to the raw stack.
    pub fn with_cache_check(mut self) -> Self {
        self.mirror = Some(DecodeCache::new());
        self
    }

    /// Current time in microsecond ticks.
    fn now_micros(&mut self) -> Clock {
        micros_of(self.clock.now())
    }

    /// Flushes if appending one more event could break a packet invariant:
    /// not enough free space for a maximal event, pending-location queue
    /// past its watermark, or the packet time span about to exceed one
    /// 25-bit timestamp wrap.
    fn ensure_room(&mut self, now: Clock) -> Res<()> {
        if self.data.free() < MAX_EV_SIZE
            || self.pending.len() >= PENDING_WATERMARK
            || now.saturating_sub(self.data.ts_begin) >= MAX_PACKET_SPAN
        {
            self.flush()?;
            // The fresh packet has no events yet, so its begin time can
            // jump forward to keep the event's 25-bit timestamp within one
            // wrap of it.
            debug_assert!(!self.data.has_events());
            debug_assert!(self.data.ts_begin <= now);
            self.data.ts_begin = now;
            self.data.ts_end = now;
        }
        Ok(())
    }

    /// Records a sampled allocation; returns the ID assigned to it.
    ///
    /// `callstack` is the raw stack as delivered by the runtime, innermost
    /// frame first.
    pub fn alloc(
        &mut self,
        len: usize,
        nsamples: usize,
        is_major: bool,
        callstack: &[RawSlot],
    ) -> Res<AllocId> {
        let now = self.now_micros();
        self.ensure_room(now)?;

        let id = self.next_alloc_id;
        self.next_alloc_id += 1;

        // Wire order is oldest frame first; shared frames with the previous
        // stack sit at the front.
        self.scratch.clear();
        self.scratch.extend(callstack.iter().rev());
        let common = self
            .scratch
            .iter()
            .zip(self.last_stack.iter())
            .take_while(|(a, b)| a == b)
            .count();

        let Self {
            data,
            cache,
            pending,
            announced,
            scratch,
            ..
        } = self;
        let buf = &mut data.buf;

        buf.put_u32(pack_event_header(Kind::Alloc.code(), now))?;
        buf.put_vint(convert(len, "alloc: len"))?;
        buf.put_vint(convert(nsamples, "alloc: nsamples"))?;
        buf.put_u8(if is_major { 1 } else { 0 })?;
        buf.put_vint(convert(common, "alloc: common prefix"))?;

        let ncodes_at = buf.pos();
        buf.put_u16(0)?;
        let code_bytes_at = buf.pos();
        let ncodes = cache.encode_suffix(buf, &scratch[common..], id, |loc| {
            let loc = LocId(loc);
            if announced.insert(loc) {
                pending.push(PendingLoc { id: loc, slot: loc.0 })
            }
            Ok(())
        })?;
        buf.patch_u16(ncodes_at, ncodes);

        data.note_event(now);

        if let Some(mirror) = &mut self.mirror {
            let coded = &data.buf.as_bytes()[*code_bytes_at..];
            let mut parser = parse::RawParser::new(coded, 0);
            let decoded = mirror
                .decode_suffix(&mut parser, ncodes as usize, common)
                .chain_err(|| "while re-decoding an allocation's backtrace")?;
            assert_eq!(
                decoded, self.scratch,
                "reader-cache mirror disagrees with the raw stack"
            );
        }

        std::mem::swap(&mut self.last_stack, &mut self.scratch);
        Ok(id)
    }

    /// Records a promotion of a previously sampled allocation.
    pub fn promote(&mut self, id: AllocId) -> Res<()> {
        self.delta_event(Kind::Promotion, id)
    }

    /// Records a collection of a previously sampled allocation.
    pub fn collect(&mut self, id: AllocId) -> Res<()> {
        self.delta_event(Kind::Collection, id)
    }

    /// Encodes a promotion/collection referencing `id` as a delta from the
    /// most recent allocation ID.
    fn delta_event(&mut self, kind: Kind, id: AllocId) -> Res<()> {
        format_check(id < self.next_alloc_id, || {
            format!(
                "{:?} event references allocation {}, but only {} were sampled",
                kind, id, self.next_alloc_id
            )
        })?;
        let now = self.now_micros();
        self.ensure_room(now)?;

        let delta = self.next_alloc_id - 1 - id;
        let buf = &mut self.data.buf;
        buf.put_u32(pack_event_header(kind.code(), now))?;
        buf.put_vint(delta)?;
        self.data.note_event(now);
        Ok(())
    }

    /// Declares one pending location into the location packet, sealing and
    /// emitting it first when it cannot hold another declaration.
    fn declare_location(&mut self, pending: PendingLoc, interval: Range<AllocId>) -> Res<()> {
        if self.locs.free() < MAX_LOCATION {
            let ts = self.locs.ts_begin;
            self.locs.seal(interval);
            self.dest.write_all(self.locs.bytes())?;
            self.locs.open(ts)?;
        }

        let mut records = self.resolver.resolve(pending.slot)?;
        if records.is_empty() {
            records.push(RawLocation::unknown())
        }
        // A declaration holds at most 255 records; past that the tail is
        // collapsed into the unknown sentinel.
        if records.len() > 255 {
            records.truncate(254);
            records.push(RawLocation::unknown());
        }

        let buf = &mut self.locs.buf;
        buf.put_u32(pack_event_header(Kind::Locs.code(), self.locs.ts_begin))?;
        buf.put_u64(pending.id.0)?;
        buf.put_u8(records.len() as u8)?;
        for record in &records {
            record.encode(buf, &mut self.files, &mut self.defs)?
        }
        self.locs.note_event(self.locs.ts_begin);
        Ok(())
    }

    /// Flushes the current packet.
    ///
    /// Pending locations are written first, as location packets whose
    /// allocation interval is empty and whose timestamps equal the data
    /// packet's begin time. The data packet is then sealed and emitted, and
    /// a fresh one is opened starting where it ended.
    pub fn flush(&mut self) -> Res<()> {
        if !self.pending.is_empty() {
            log::debug!("flushing {} pending locations", self.pending.len());
            let interval = Range::new(self.start_alloc_id, self.start_alloc_id);
            self.locs.open(self.data.ts_begin)?;
            for pending in std::mem::replace(&mut self.pending, vec![]) {
                self.declare_location(pending, interval)?
            }
            if self.locs.has_events() {
                self.locs.seal(interval);
                self.dest.write_all(self.locs.bytes())?;
            }
        }

        let interval = Range::new(self.start_alloc_id, self.next_alloc_id);
        self.data.seal(interval);
        self.dest.write_all(self.data.bytes())?;

        let ts_end = self.data.ts_end;
        self.start_alloc_id = self.next_alloc_id;
        self.data.open(ts_end)?;
        Ok(())
    }

    /// Flushes the final packet and hands the destination back.
    pub fn finish(mut self) -> Res<W> {
        self.flush()?;
        self.dest.flush()?;
        Ok(self.dest)
    }
}

impl<W, R, C> hook::AllocSink for Writer<W, R, C>
where
    W: io::Write,
    R: SlotResolver,
    C: TraceClock,
{
    fn alloc_minor(&mut self, len: usize, nsamples: usize, callstack: &[RawSlot]) -> Res<AllocId> {
        self.alloc(len, nsamples, false, callstack)
    }
    fn alloc_major(&mut self, len: usize, nsamples: usize, callstack: &[RawSlot]) -> Res<AllocId> {
        self.alloc(len, nsamples, true, callstack)
    }
    fn promote(&mut self, id: AllocId) -> Res<()> {
        Writer::promote(self, id)
    }
    fn dealloc_minor(&mut self, id: AllocId) -> Res<()> {
        self.collect(id)
    }
    fn dealloc_major(&mut self, id: AllocId) -> Res<()> {
        self.collect(id)
    }
}

/// Converts a clock reading in seconds to microsecond ticks.
fn micros_of(seconds: f64) -> Clock {
    (seconds * 1_000_000.0) as Clock
}

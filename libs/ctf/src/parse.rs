//! Contains the parser for the packetized trace format.
//!
//! The main building block is [`RawParser`], which features little-endian
//! parsing primitives over a byte slice and signals reads past the end of its
//! input as `Underflow` errors. [`TraceParser`] wraps a raw parser and hands
//! out one [`PacketParser`] per packet; packet parsers validate their header,
//! then yield timestamped events until their sub-buffer is drained.
//!
//! Parsing state shared across packets (the location registry, the backtrace
//! decode cache, the MTF tables and the allocation-ID counter) lives in
//! [`Cxt`].

prelude! {}

pub use crate::buf::Pos;

/// Raw parser.
///
/// - provides the basic parsing functions used by [`TraceParser`] and
///   [`PacketParser`];
/// - works at byte-level.
#[derive(Debug)]
pub struct RawParser<'data> {
    /// Data to parse.
    data: &'data [u8],
    /// Current position in the data.
    cursor: usize,
    /// Offset from the start of the original input.
    ///
    /// Used by [`PacketParser`], which works on a slice of the original
    /// input, for consistent error-reporting.
    offset: usize,
}

/// Basic functions.
impl<'data> RawParser<'data> {
    /// Constructor.
    ///
    /// - `data`: input bytes to parse;
    /// - `offset`: offset from the start of the original input.
    pub fn new(data: &'data [u8], offset: usize) -> Self {
        Self {
            data,
            cursor: 0,
            offset,
        }
    }

    /// Data accessor.
    pub fn data(&self) -> &'data [u8] {
        self.data
    }

    /// Consumes some bytes from the input, moves the cursor at the end of
    /// these bytes.
    pub fn take(&mut self, byte_count: usize) -> Res<&'data [u8]> {
        self.check(byte_count)?;
        let res = &self.data[self.cursor..self.cursor + byte_count];
        self.cursor += byte_count;
        Ok(res)
    }
}

/// Position related functions.
impl<'data> RawParser<'data> {
    /// Position accessor.
    pub fn pos(&self) -> Pos {
        Pos::from(self.cursor)
    }
    /// Backtracks the parser to a **previous** position.
    pub fn backtrack(&mut self, pos: Pos) {
        debug_assert!(self.cursor >= *pos);
        self.cursor = *pos
    }

    fn check(&self, can_parse: usize) -> Res<()> {
        if self.cursor + can_parse <= self.data.len() {
            Ok(())
        } else {
            Err(err::ErrorKind::Underflow(self.cursor + self.offset).into())
        }
    }

    /// True if the parser is at the end of its input.
    pub fn is_eof(&self) -> bool {
        self.cursor == self.data.len()
    }

    /// Yields the current position and the total length of the input.
    pub fn real_position(&self) -> (usize, usize) {
        (self.cursor + self.offset, self.data.len())
    }

    /// Yields a single-line, concise description of the current position.
    pub fn state(&self) -> String {
        if self.cursor < self.data.len() {
            format!(
                "currently at {} (of {}): `{:x}`",
                self.cursor,
                self.data.len(),
                self.data[self.cursor],
            )
        } else {
            "currently at EOF".into()
        }
    }
}

/// Basic parsers.
impl<'data> RawParser<'data> {
    /// Parses a `u8`.
    pub fn u8(&mut self) -> Res<u8> {
        pdebug!(self, "parsing u8");
        self.check(1)?;
        let res = self.data[self.cursor];
        self.cursor += 1;
        Ok(res)
    }

    /// Parses a `u16`, little-endian.
    pub fn u16(&mut self) -> Res<u16> {
        pdebug!(self, "parsing u16");
        self.check(2)?;
        let res = u16::from_le_bytes([self.data[self.cursor], self.data[self.cursor + 1]]);
        self.cursor += 2;
        Ok(res)
    }

    /// Parses a `u32`, little-endian.
    pub fn u32(&mut self) -> Res<u32> {
        pdebug!(self, "parsing u32");
        self.check(4)?;
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&self.data[self.cursor..self.cursor + 4]);
        self.cursor += 4;
        Ok(u32::from_le_bytes(bytes))
    }

    /// Parses a `u64`, little-endian.
    pub fn u64(&mut self) -> Res<u64> {
        pdebug!(self, "parsing u64");
        self.check(8)?;
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&self.data[self.cursor..self.cursor + 8]);
        self.cursor += 8;
        Ok(u64::from_le_bytes(bytes))
    }

    /// Parses a clock value.
    pub fn clock(&mut self) -> Res<Clock> {
        self.u64()
    }

    /// Parses a NUL-terminated string.
    pub fn string(&mut self) -> Res<&'data str> {
        pdebug!(self, "parsing string");
        let start = self.cursor;
        let mut end = None;
        for (cnt, byte) in self.data[self.cursor..].iter().enumerate() {
            if *byte == 0 {
                end = Some(self.cursor + cnt);
                break;
            }
        }
        match end {
            Some(end) => match std::str::from_utf8(&self.data[start..end]) {
                Ok(res) => {
                    self.cursor = end + 1;
                    Ok(res)
                }
                Err(e) => bad_format!("expected legal utf8 string: {}", e),
            },
            None => Err(err::ErrorKind::Underflow(self.data.len() + self.offset).into()),
        }
    }

    /// Parses a `usize` in variable-length format.
    pub fn v_usize(&mut self) -> Res<usize> {
        pdebug!(self, "parsing v_usize");
        let variant = self.u8()?;
        let res = match variant {
            0..=252 => convert(variant, "v_usize: u8"),
            253 => convert(self.u16()?, "v_usize: u16"),
            254 => convert(self.u32()?, "v_usize: u32"),
            255 => convert(self.u64()?, "v_usize: u64"),
        };
        Ok(res)
    }
}

/// Parsing context.
///
/// Stores
///
/// - the location-string MTF tables,
/// - the location registry,
/// - the backtrace decode cache, and
/// - the allocation-ID counter.
///
/// The trace does not carry the word size of the traced process; consumers
/// converting allocation lengths to bytes assume 8-byte words.
#[derive(Debug)]
pub struct Cxt<'data> {
    /// MTF tables for location strings.
    loc: loc::Cxt<'data>,
    /// Registry of declared locations.
    registry: HMap<LocId, Vec<Location<'data>>>,
    /// Backtrace decode cache.
    btrace: DecodeCache,
    /// Allocation-ID counter.
    alloc_count: AllocId,
}
impl<'data> Cxt<'data> {
    /// Constructor.
    pub fn new() -> Self {
        Self {
            loc: loc::Cxt::new(),
            registry: HMap::new(),
            btrace: DecodeCache::new(),
            alloc_count: 0,
        }
    }

    /// Yields the next available allocation ID and increments its internal
    /// counter.
    pub fn next_alloc_id(&mut self) -> AllocId {
        // New value of the counter.
        let mut next = self.alloc_count + 1;
        // `next` receives the actual next ID.
        std::mem::swap(&mut self.alloc_count, &mut next);
        next
    }
    /// Same as [`next_alloc_id`][Cxt::next_alloc_id] but does not increment
    /// the internal counter.
    pub fn peek_next_alloc_id(&self) -> AllocId {
        self.alloc_count
    }

    /// The locations declared by the trace so far.
    pub fn locations(&self) -> &HMap<LocId, Vec<Location<'data>>> {
        &self.registry
    }
}

/// Top-level parser.
pub struct TraceParser<'data> {
    /// Internal parser over the whole trace.
    parser: RawParser<'data>,
    /// Parsing context.
    cxt: Cxt<'data>,
    /// Number of packets parsed so far.
    packet_count: usize,
    /// End time of the last packet parsed, for cross-packet monotonicity.
    last_ts_end: Option<Clock>,
}

impl<'data> TraceParser<'data> {
    /// Constructor.
    ///
    /// A trace is a plain concatenation of packets; an empty input parses as
    /// a trace with no packets.
    pub fn new(bytes: &'data [u8]) -> Res<Self> {
        Ok(Self {
            parser: RawParser::new(bytes, 0),
            cxt: Cxt::new(),
            packet_count: 0,
            last_ts_end: None,
        })
    }

    /// The locations declared by the trace so far.
    pub fn locations(&self) -> &HMap<LocId, Vec<Location<'data>>> {
        self.cxt.locations()
    }

    /// Number of allocations seen so far.
    pub fn alloc_count(&self) -> AllocId {
        self.cxt.peek_next_alloc_id()
    }

    /// Parses a packet header at the current position.
    fn packet_header(&mut self) -> Res<ast::Packet> {
        let parser = &mut self.parser;
        pinfo!(parser, "parsing packet header");

        let magic = parser.u32()?;
        format_check(magic == MAGIC, || {
            format!(
                "not a legal trace packet, expected magic number {:#x}, got {:#x}",
                MAGIC, magic
            )
        })?;

        let packet_size_bits = parser.u32()?;
        let content_size_bits = parser.u32()?;
        format_check(packet_size_bits == content_size_bits, || {
            format!(
                "inconsistent packet sizes: packet {} bits, content {} bits",
                packet_size_bits, content_size_bits
            )
        })?;
        format_check(packet_size_bits % 8 == 0, || {
            format!("illegal packet size {}, not a whole number of bytes", packet_size_bits)
        })?;

        let (ts_begin, ts_end) = (parser.clock()?, parser.clock()?);
        format_check(ts_begin <= ts_end, || {
            format!("packet timestamps are not ordered: {} > {}", ts_begin, ts_end)
        })?;

        let (alloc_begin, alloc_end) = (parser.u64()?, parser.u64()?);
        format_check(alloc_begin <= alloc_end, || {
            format!(
                "packet allocation IDs are not ordered: {} > {}",
                alloc_begin, alloc_end
            )
        })?;

        Ok(ast::Packet {
            content_size: packet_size_bits / 8,
            timestamp: Range::new(ts_begin, ts_end),
            alloc_id: Range::new(alloc_begin, alloc_end),
            id: self.packet_count,
        })
    }

    /// Yields a [`PacketParser`] for the next packet, if any.
    pub fn next_packet<'me>(&'me mut self) -> Res<Option<PacketParser<'me, 'data>>> {
        if self.parser.is_eof() {
            return Ok(None);
        }

        let header = self
            .packet_header()
            .chain_err(|| format!("while parsing the header of packet {}", self.packet_count))?;

        if let Some(last_end) = self.last_ts_end {
            format_check(header.timestamp.lbound >= last_end, || {
                format!(
                    "packet {} starts at {}, before the previous packet ended at {}",
                    header.id, header.timestamp.lbound, last_end
                )
            })?
        }
        format_check(header.alloc_id.lbound == self.cxt.alloc_count, || {
            format!(
                "packet {} declares allocation IDs from {}, expected {}",
                header.id, header.alloc_id.lbound, self.cxt.alloc_count
            )
        })?;

        let content_len: usize = convert(header.content_size, "next_packet: content_len");
        pinfo!(
            self.parser,
            "next packet: {} bytes -> {}/{}",
            content_len,
            *self.parser.pos() + content_len,
            self.parser.data().len()
        );
        let offset = *self.parser.pos();
        let event_bytes = self.parser.take(content_len).chain_err(|| {
            format!(
                "packet {} claims {} content bytes, more than the trace holds",
                header.id, content_len
            )
        })?;

        self.last_ts_end = Some(header.timestamp.ubound);
        self.packet_count += 1;

        Ok(Some(PacketParser::new(
            event_bytes,
            offset,
            header,
            &mut self.cxt,
        )))
    }
}

/// Packet parser.
///
/// Thin wrapper around a [`RawParser`] over the bytes of the events of the
/// packet. Also stores the packet header; the header's bytes are not part of
/// the parser's data, they have already been parsed.
#[derive(Debug)]
pub struct PacketParser<'cxt, 'data> {
    /// Internal parser over the bytes of the events of the packet.
    parser: RawParser<'data>,
    /// Packet header.
    header: ast::Packet,
    /// Event counter.
    event_cnt: usize,
    /// Timestamp of the last event parsed, enforces monotonicity.
    last_time: Clock,
    /// Parsing context, borrowed from the [`TraceParser`].
    cxt: &'cxt mut Cxt<'data>,
}

impl<'cxt, 'data> PacketParser<'cxt, 'data> {
    /// Constructor.
    fn new(
        input: &'data [u8],
        offset: usize,
        header: ast::Packet,
        cxt: &'cxt mut Cxt<'data>,
    ) -> Self {
        let last_time = header.timestamp.lbound;
        Self {
            parser: RawParser::new(input, offset),
            header,
            event_cnt: 0,
            last_time,
            cxt,
        }
    }

    /// Header accessor.
    pub fn header(&self) -> &ast::Packet {
        &self.header
    }

    /// Parses an event header, yielding the event kind and the reconstructed
    /// timestamp.
    ///
    /// The 25 low bits of the header word carry the timestamp modulo 2^25;
    /// the rest is spliced back from the packet's begin time, incrementing
    /// the high bits once when the low bits wrapped.
    fn event_kind(&mut self) -> Res<(ast::Kind, Clock)> {
        let word = self.parser.u32()?;

        let begin = self.header.timestamp.lbound;
        let begin_low = (begin as u32) & ast::EVENT_TIME_MASK;
        let time_low = word & ast::EVENT_TIME_MASK;
        let low: u64 = u64::from(if time_low < begin_low {
            // Wrapped once since the packet began.
            time_low + (1u32 << ast::EVENT_TIME_BITS)
        } else {
            time_low
        });
        let time = (begin & !u64::from(ast::EVENT_TIME_MASK)) + low;

        format_check(self.header.timestamp.contains(time), || {
            format!(
                "event time {} outside of its packet's range {}",
                time, self.header.timestamp
            )
        })?;
        format_check(self.last_time <= time, || {
            format!(
                "event times are not monotone: {} after {}",
                time, self.last_time
            )
        })?;

        let kind = ast::Kind::from_code(word >> ast::EVENT_TIME_BITS)?;
        Ok((kind, time))
    }

    /// Parses a locations event.
    fn locs(&mut self) -> Res<ast::Locs<'data>> {
        let parser = &mut self.parser;
        pinfo!(parser, "parsing locations");
        let id = LocId(parser.u64()?);
        let len = convert(parser.u8()?, "locs: len");
        let mut locs = Vec::with_capacity(len);
        for _ in 0..len {
            let loc = Location::parse(parser, &mut self.cxt.loc)?;
            locs.push(loc)
        }

        match self.cxt.registry.get(&id) {
            Some(known) => format_check(known == &locs, || {
                format!("locations for {} re-declared with different records", id)
            })?,
            None => {
                let _ = self.cxt.registry.insert(id, locs.clone());
            }
        }

        Ok(ast::Locs { id, locs })
    }

    /// Parses an allocation event.
    fn alloc(&mut self) -> Res<ast::Alloc> {
        let parser = &mut self.parser;
        pinfo!(parser, "parsing alloc");
        let id = self.cxt.next_alloc_id();
        let len = parser.v_usize()?;
        let nsamples = parser.v_usize()?;
        let is_major = match parser.u8()? {
            0 => false,
            1 => true,
            n => bad_format!("expected boolean as a 0- or 1-valued u8, found {}", n),
        };
        let common_pref_len = parser.v_usize()?;
        let ncodes = parser.u16()? as usize;
        pinfo!(
            parser,
            "ncodes: {}, common_pref_len: {}",
            ncodes,
            common_pref_len
        );

        let backtrace = self
            .cxt
            .btrace
            .decode_suffix(parser, ncodes, common_pref_len)?;

        Ok(ast::Alloc {
            id,
            len,
            nsamples,
            is_major,
            common_pref_len,
            backtrace,
        })
    }

    /// Parses an allocation ID from a delta *w.r.t.* the most recent ID
    /// generated.
    ///
    /// Used when retrieving the ID of a promotion/collection.
    fn alloc_id_from_delta(&mut self) -> Res<AllocId> {
        let next_alloc_id = self.cxt.peek_next_alloc_id();
        let delta = self.parser.v_usize()? as u64;
        format_check(delta < next_alloc_id, || {
            format!(
                "event references allocation {} back, but only {} were seen",
                delta, next_alloc_id
            )
        })?;
        Ok(next_alloc_id - 1 - delta)
    }

    /// Returns the next event of the packet, if any.
    ///
    /// Once the packet is drained, checks that the number of allocations it
    /// declared matches the number of allocation events parsed.
    pub fn next_event(&mut self) -> Res<Option<(Clock, ast::Event<'data>)>> {
        if self.parser.is_eof() {
            format_check(self.cxt.alloc_count == self.header.alloc_id.ubound, || {
                format!(
                    "packet {} declared allocations up to {}, but events stop at {}",
                    self.header.id, self.header.alloc_id.ubound, self.cxt.alloc_count
                )
            })?;
            return Ok(None);
        }

        let (kind, time) = self.event_kind()?;
        pinfo!(self.parser, "event: {:?} ({})", kind, time);

        let event = match kind {
            ast::Kind::Locs => ast::Event::Locs(self.locs()?),
            ast::Kind::Alloc => ast::Event::Alloc(self.alloc()?),
            ast::Kind::Promotion => ast::Event::Promotion(self.alloc_id_from_delta()?),
            ast::Kind::Collection => ast::Event::Collection(self.alloc_id_from_delta()?),
        };

        self.last_time = time;
        self.event_cnt += 1;

        Ok(Some((time, event)))
    }

    /// Number of events parsed so far.
    pub fn event_count(&self) -> usize {
        self.event_cnt
    }
}

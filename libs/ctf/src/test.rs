//! End-to-end writer/reader tests.

prelude! {}

use crate::write::Writer;
use rand::{rngs::SmallRng, Rng, SeedableRng};

/// Resolver backed by a plain map.
struct MapResolver {
    map: HMap<RawSlot, Vec<RawLocation>>,
}
impl MapResolver {
    fn empty() -> Self {
        Self { map: HMap::new() }
    }

    /// One synthetic location per slot, derived from the slot value.
    fn synthetic(slots: impl IntoIterator<Item = RawSlot>) -> Self {
        let mut map = HMap::new();
        for slot in slots {
            map.insert(slot, synthetic_records(slot));
        }
        Self { map }
    }
}
impl SlotResolver for MapResolver {
    fn resolve(&mut self, slot: RawSlot) -> Res<Vec<RawLocation>> {
        Ok(self.map.get(&slot).cloned().unwrap_or_else(Vec::new))
    }
}

/// Deterministic records for a slot; a few files and definitions so MTF
/// tables see both hits and literals.
fn synthetic_records(slot: RawSlot) -> Vec<RawLocation> {
    let mut records = vec![RawLocation {
        file_path: format!("src/mod_{}.ml", slot % 21),
        def_name: format!("def_{}", slot % 33),
        line: (slot % 1000) as u32,
        col: Range::new((slot % 60) as u32, (slot % 60) as u32 + 4),
    }];
    if slot % 3 == 0 {
        records.push(RawLocation {
            file_path: format!("src/inlined_{}.ml", slot % 7),
            def_name: "inlined".to_string(),
            line: 1 + (slot % 9) as u32,
            col: Range::new(0, 2),
        });
    }
    records
}

/// Clock advancing by a fixed step at every reading.
struct TickClock {
    now: f64,
    step: f64,
}
impl TickClock {
    fn micros() -> Self {
        Self {
            now: 0.0,
            step: 1e-6,
        }
    }
    fn stepping(step: f64) -> Self {
        Self { now: 0.0, step }
    }
}
impl TraceClock for TickClock {
    fn now(&mut self) -> f64 {
        let now = self.now;
        self.now += self.step;
        now
    }
}

type TestWriter = Writer<Vec<u8>, MapResolver, TickClock>;

fn writer(resolver: MapResolver) -> TestWriter {
    Writer::new(vec![], resolver, TickClock::micros()).expect("writer construction")
}

/// Collects every event of a trace along with the location registry.
fn read_all(bytes: &[u8]) -> (Vec<(Clock, OwnedEvent)>, HMap<LocId, Vec<RawLocation>>) {
    let mut events = vec![];
    let parser = crate::scan(bytes, |clock, event| {
        events.push((clock, OwnedEvent::of(event)));
        Ok(())
    })
    .expect("trace parses");
    let locations = parser
        .locations()
        .iter()
        .map(|(id, locs)| (*id, locs.iter().map(owned_location).collect()))
        .collect();
    (events, locations)
}

/// Owned mirror of [`ast::Event`] for comparisons.
#[derive(Debug, Clone, PartialEq)]
enum OwnedEvent {
    Locs(LocId),
    Alloc(ast::Alloc),
    Promotion(AllocId),
    Collection(AllocId),
}
impl OwnedEvent {
    fn of(event: &ast::Event) -> Self {
        match event {
            ast::Event::Locs(locs) => Self::Locs(locs.id),
            ast::Event::Alloc(alloc) => Self::Alloc(alloc.clone()),
            ast::Event::Promotion(id) => Self::Promotion(*id),
            ast::Event::Collection(id) => Self::Collection(*id),
        }
    }
}

fn owned_location(loc: &Location) -> RawLocation {
    RawLocation {
        file_path: loc.file_path.to_string(),
        def_name: loc.def_name.to_string(),
        line: loc.line,
        col: loc.col,
    }
}

/// An empty trace is one packet with an empty allocation interval.
#[test]
fn empty_trace() {
    let bytes = writer(MapResolver::empty()).finish().expect("finish");
    assert_eq!(bytes.len(), ast::HEADER_BYTES);

    let mut parser = parse::TraceParser::new(&bytes).expect("parser");
    let mut packet = parser
        .next_packet()
        .expect("packet parses")
        .expect("one packet");
    assert_eq!(packet.header().alloc_id, Range::new(0, 0));
    assert!(packet.next_event().expect("event parses").is_none());
    assert!(parser.next_packet().expect("eof").is_none());
}

/// A single allocation with a fresh three-frame stack: three location
/// declarations, then the allocation, all misses.
#[test]
fn single_alloc_three_frames() {
    let slots = [0x30u64, 0x20, 0x10];
    let mut w = writer(MapResolver::synthetic(slots.iter().cloned()));
    // Innermost frame first, so `0x10` is the oldest frame.
    let id = w.alloc(4, 1, false, &slots).expect("alloc");
    assert_eq!(id, 0);
    let bytes = w.finish().expect("finish");

    let (events, locations) = read_all(&bytes);
    assert_eq!(events.len(), 4);
    // Declarations come first, in miss order: oldest frame outward.
    assert_eq!(events[0].1, OwnedEvent::Locs(LocId(0x10)));
    assert_eq!(events[1].1, OwnedEvent::Locs(LocId(0x20)));
    assert_eq!(events[2].1, OwnedEvent::Locs(LocId(0x30)));
    match &events[3].1 {
        OwnedEvent::Alloc(alloc) => {
            assert_eq!(alloc.id, 0);
            assert_eq!(alloc.len, 4);
            assert_eq!(alloc.nsamples, 1);
            assert!(!alloc.is_major);
            assert_eq!(alloc.common_pref_len, 0);
            assert_eq!(alloc.backtrace, vec![0x10, 0x20, 0x30]);
        }
        ev => panic!("expected an allocation event, got {:?}", ev),
    }

    assert_eq!(locations.len(), 3);
    for slot in slots.iter() {
        assert_eq!(locations[&LocId(*slot)], synthetic_records(*slot));
    }
}

/// Two identical allocations: the second one shares its whole stack.
#[test]
fn identical_allocations_share_everything() {
    let slots = [0x33u64, 0x22, 0x11];
    let mut w = writer(MapResolver::synthetic(slots.iter().cloned()));
    assert_eq!(w.alloc(8, 1, false, &slots).expect("alloc"), 0);
    assert_eq!(w.alloc(8, 1, false, &slots).expect("alloc"), 1);
    let bytes = w.finish().expect("finish");

    let (events, _) = read_all(&bytes);
    let allocs: Vec<&ast::Alloc> = events
        .iter()
        .filter_map(|(_, ev)| match ev {
            OwnedEvent::Alloc(alloc) => Some(alloc),
            _ => None,
        })
        .collect();
    assert_eq!(allocs.len(), 2);
    assert_eq!(allocs[0].common_pref_len, 0);
    assert_eq!(allocs[1].common_pref_len, 3);
    assert_eq!(allocs[0].backtrace, allocs[1].backtrace);
    assert_eq!(allocs[0].id, 0);
    assert_eq!(allocs[1].id, 1);
}

/// Promotion and collection resolve through deltas against the most recent
/// allocation ID.
#[test]
fn promote_then_collect() {
    let slots = [0x77u64];
    let mut w = writer(MapResolver::synthetic(slots.iter().cloned()));
    w.alloc(1, 1, false, &slots).expect("alloc");
    w.alloc(1, 1, false, &slots).expect("alloc");
    w.promote(0).expect("promote");
    w.collect(0).expect("collect");
    let bytes = w.finish().expect("finish");

    let (events, _) = read_all(&bytes);
    let tail: Vec<&OwnedEvent> = events.iter().map(|(_, ev)| ev).collect();
    let n = tail.len();
    assert_eq!(tail[n - 2], &OwnedEvent::Promotion(0));
    assert_eq!(tail[n - 1], &OwnedEvent::Collection(0));
}

/// Referencing an allocation that was never sampled is a caller error.
#[test]
fn future_reference_is_refused() {
    let mut w = writer(MapResolver::empty());
    assert!(w.promote(0).is_err());
}

/// Events more than one 25-bit timestamp wrap apart land in distinct
/// packets, so the reader's single-overflow splice always reconstructs the
/// exact time.
#[test]
fn timestamp_wrap_forces_flush() {
    let slots = [0x1234u64, 0x4321];
    let resolver = MapResolver::synthetic(slots.iter().cloned());
    let mut w = Writer::new(vec![], resolver, TickClock::stepping(40.0)).expect("writer");
    for _ in 0..5 {
        w.alloc(2, 1, false, &slots).expect("alloc");
    }
    let bytes = w.finish().expect("finish");

    let (events, _) = read_all(&bytes);
    let alloc_times: Vec<Clock> = events
        .iter()
        .filter_map(|(clock, ev)| match ev {
            OwnedEvent::Alloc(_) => Some(*clock),
            _ => None,
        })
        .collect();
    let expected: Vec<Clock> = (1..=5).map(|k| k * 40_000_000).collect();
    assert_eq!(alloc_times, expected);
}

/// A reserved compact-allocation event code is refused.
#[test]
fn reserved_event_code_is_bad_format() {
    let mut buf = ByteBuf::new(64);
    buf.put_u32(MAGIC).unwrap();
    // One u32 event header of content.
    buf.put_u32(32).unwrap();
    buf.put_u32(32).unwrap();
    buf.put_u64(0).unwrap();
    buf.put_u64(0).unwrap();
    buf.put_u64(0).unwrap();
    buf.put_u64(0).unwrap();
    buf.put_u32(ast::pack_event_header(101, 0)).unwrap();

    let bytes = buf.as_bytes();
    let mut parser = parse::TraceParser::new(bytes).expect("parser");
    let mut packet = parser.next_packet().expect("header is fine").expect("one packet");
    let err = packet.next_event().unwrap_err();
    assert!(err.to_string().contains("reserved"));
}

/// A corrupt magic number is refused.
#[test]
fn bad_magic_is_refused() {
    let mut buf = ByteBuf::new(64);
    buf.put_u32(0xdeadbeef).unwrap();
    for _ in 0..10 {
        buf.put_u32(0).unwrap();
    }
    let mut parser = parse::TraceParser::new(buf.as_bytes()).expect("parser");
    assert!(parser.next_packet().is_err());
}

/// A truncated trace surfaces as an underflow.
#[test]
fn truncated_trace_underflows() {
    let bytes = writer(MapResolver::empty()).finish().expect("finish");
    let mut parser = parse::TraceParser::new(&bytes[0..20]).expect("parser");
    let err = parser.next_packet().unwrap_err();
    let mut underflow = false;
    for e in err.iter() {
        underflow = underflow || e.to_string().contains("underflow");
    }
    assert!(underflow, "expected an underflow, got: {}", err.to_pretty());
}

/// Re-declaring an identifier with different records is refused.
#[test]
fn conflicting_redeclaration_is_refused() {
    fn loc_packet(records: &[RawLocation]) -> Vec<u8> {
        let mut files = MtfTable::new();
        let mut defs = MtfTable::new();
        let mut content = ByteBuf::new(1 << 12);
        content
            .put_u32(ast::pack_event_header(ast::Kind::Locs.code(), 0))
            .unwrap();
        content.put_u64(1).unwrap();
        content.put_u8(records.len() as u8).unwrap();
        for record in records {
            record.encode(&mut content, &mut files, &mut defs).unwrap();
        }

        let mut buf = ByteBuf::new(1 << 12);
        buf.put_u32(MAGIC).unwrap();
        let bits = (content.len() * 8) as u32;
        buf.put_u32(bits).unwrap();
        buf.put_u32(bits).unwrap();
        buf.put_u64(0).unwrap();
        buf.put_u64(0).unwrap();
        buf.put_u64(0).unwrap();
        buf.put_u64(0).unwrap();
        for byte in content.as_bytes() {
            buf.put_u8(*byte).unwrap();
        }
        buf.as_bytes().to_vec()
    }

    let first = synthetic_records(3);
    let second = synthetic_records(4);
    let mut bytes = loc_packet(&first);
    bytes.extend_from_slice(&loc_packet(&second));

    let err = match crate::scan(&bytes, |_, _| Ok(())) {
        Ok(_) => panic!("conflicting re-declaration was accepted"),
        Err(e) => e,
    };
    assert!(
        err.to_pretty().contains("re-declared"),
        "unexpected error: {}",
        err.to_pretty()
    );

    // Consistent re-declaration parses fine.
    let mut bytes = loc_packet(&first);
    bytes.extend_from_slice(&loc_packet(&first));
    crate::scan(&bytes, |_, _| Ok(())).expect("consistent re-declaration parses");
}

/// Randomized multi-packet round trip with the reader-cache mirror active.
#[test]
fn randomized_round_trip() {
    let mut rng = SmallRng::seed_from_u64(0x00_5eed_0f_ca11);
    let pool: Vec<RawSlot> = (0..64u64).map(|i| 0x4000 + i * 0x111).collect();
    let resolver = MapResolver::synthetic(pool.iter().cloned());
    let mut w = Writer::new(vec![], resolver, TickClock::micros())
        .expect("writer")
        .with_cache_check();

    let mut expected: Vec<OwnedEvent> = vec![];
    let mut last_oldest_first: Vec<RawSlot> = vec![];
    let mut alloc_count: u64 = 0;

    for step in 0..1200usize {
        let roll = rng.gen_range(0, 100);
        if roll < 80 || alloc_count == 0 {
            let depth = rng.gen_range(1, 24);
            let stack: Vec<RawSlot> = (0..depth)
                .map(|_| pool[rng.gen_range(0, pool.len())])
                .collect();
            let len = rng.gen_range(1, 100);
            let nsamples = rng.gen_range(1, 5);
            let is_major = rng.gen_range(0, 10) == 0;

            let oldest_first: Vec<RawSlot> = stack.iter().rev().cloned().collect();
            let common = oldest_first
                .iter()
                .zip(last_oldest_first.iter())
                .take_while(|(a, b)| a == b)
                .count();

            let id = w.alloc(len, nsamples, is_major, &stack).expect("alloc");
            assert_eq!(id, alloc_count);
            expected.push(OwnedEvent::Alloc(ast::Alloc {
                id,
                len,
                nsamples,
                is_major,
                common_pref_len: common,
                backtrace: oldest_first.clone(),
            }));
            last_oldest_first = oldest_first;
            alloc_count += 1;
        } else if roll < 90 {
            let id = rng.gen_range(0, alloc_count);
            w.promote(id).expect("promote");
            expected.push(OwnedEvent::Promotion(id));
        } else {
            let id = rng.gen_range(0, alloc_count);
            w.collect(id).expect("collect");
            expected.push(OwnedEvent::Collection(id));
        }

        if step % 300 == 299 {
            w.flush().expect("flush");
        }
    }

    let bytes = w.finish().expect("finish");
    let (events, locations) = read_all(&bytes);

    let data_events: Vec<&OwnedEvent> = events
        .iter()
        .filter_map(|(_, ev)| match ev {
            OwnedEvent::Locs(_) => None,
            other => Some(other),
        })
        .collect();
    assert_eq!(data_events.len(), expected.len());
    for (got, want) in data_events.iter().zip(expected.iter()) {
        assert_eq!(*got, want);
    }

    // Every slot that ever appeared has consistent declared locations.
    for (id, locs) in &locations {
        assert_eq!(locs, &synthetic_records(id.0));
    }
}

//! Trace analysis driver: from trace bytes to a ranked hotspot report.
//!
//! The analyzer replays a finalized trace, feeds every allocation's
//! deduplicated backtrace into a suffix tree weighted by its sample count,
//! and reports the backtrace substrings whose weighted frequency clears the
//! requested floor, heaviest first.

use base::prelude::*;

use hotspot::SuffixTree;

/// Divisor between the reporting floor and the lossy-counting error bound,
/// so pruning never eats into reportable substrings.
const ERROR_MARGIN: f64 = 10.0;

/// A reported hot substring, location-resolved.
#[derive(Debug, Clone)]
pub struct Hotspot {
    /// Samples attributed to this substring itself.
    pub light: u64,
    /// Samples of all allocations whose backtrace contains the substring.
    pub total: u64,
    /// Upper bound on the total, lossy-counting error included.
    pub upper: u64,
    /// Resolved frames, oldest first; one line per inlined record.
    pub frames: Vec<String>,
}

/// Analysis result.
#[derive(Debug, Clone)]
pub struct Report {
    /// Number of allocation events in the trace.
    pub allocations: u64,
    /// Total sample weight inserted.
    pub samples: u64,
    /// Frequency floor the report was built with.
    pub frequency: f64,
    /// Ranked hotspots, by descending attributed samples.
    pub hotspots: Vec<Hotspot>,
}

/// Analyzes a finalized trace.
///
/// `frequency` is the reporting floor, in `(0, 1]`: a substring is reported
/// when the samples attributed to it exceed `frequency` times the total
/// sample weight.
pub fn analyze(bytes: &[u8], frequency: f64) -> Res<Report> {
    if !(frequency > 0.0 && frequency <= 1.0) {
        bail!("illegal frequency {}, expected (0, 1]", frequency)
    }

    let mut tree = SuffixTree::new(frequency / ERROR_MARGIN);
    let mut allocations = 0u64;
    let mut stack = Vec::with_capacity(64);
    let mut seen = HSet::with_capacity(64);

    let parser = ctf::scan(bytes, |_clock, event| {
        if let ctf::ast::Event::Alloc(alloc) = event {
            allocations += 1;
            // The builder requires token sequences without repeats; only
            // the oldest occurrence of a recursive frame is kept.
            stack.clear();
            seen.clear();
            for token in &alloc.backtrace {
                if seen.insert(*token) {
                    stack.push(*token)
                }
            }
            if !stack.is_empty() {
                tree.insert(&stack, alloc.nsamples as u64)
            }
        }
        Ok(())
    })
    .chain_err(|| "while replaying the trace")?;

    let samples = tree.total_weight();
    let locations = parser.locations();
    let hotspots = tree
        .heavy_hitters(frequency)
        .into_iter()
        .map(|hitter| {
            let mut frames = vec![];
            for token in &hitter.label {
                match locations.get(&ctf::prelude::LocId(*token)) {
                    Some(records) => {
                        for record in records {
                            frames.push(record.to_string())
                        }
                    }
                    None => frames.push(format!("<unresolved {:#x}>", token)),
                }
            }
            Hotspot {
                light: hitter.light,
                total: hitter.total,
                upper: hitter.upper,
                frames,
            }
        })
        .collect();

    Ok(Report {
        allocations,
        samples,
        frequency,
        hotspots,
    })
}

impl fmt::Display for Report {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        writeln!(fmt, "|===| memtrail hotspot report")?;
        writeln!(fmt, "| allocations: {}", self.allocations)?;
        writeln!(fmt, "| samples:     {}", self.samples)?;
        writeln!(fmt, "| floor:       {}", self.frequency)?;
        writeln!(fmt, "|===|")?;
        if self.hotspots.is_empty() {
            writeln!(fmt)?;
            writeln!(fmt, "no backtrace substring clears the floor")?;
        }
        for (rank, hotspot) in self.hotspots.iter().enumerate() {
            writeln!(fmt)?;
            writeln!(
                fmt,
                "#{}: {} samples (total {}, upper bound {})",
                rank + 1,
                hotspot.light,
                hotspot.total,
                hotspot.upper,
            )?;
            for frame in &hotspot.frames {
                writeln!(fmt, "    {}", frame)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use ctf::prelude::{RawLocation, RawSlot, SlotResolver, TraceClock};

    struct MapResolver {
        map: HMap<RawSlot, Vec<RawLocation>>,
    }
    impl SlotResolver for MapResolver {
        fn resolve(&mut self, slot: RawSlot) -> Res<Vec<RawLocation>> {
            Ok(self.map.get(&slot).cloned().unwrap_or_else(Vec::new))
        }
    }

    struct TickClock {
        now: f64,
    }
    impl TraceClock for TickClock {
        fn now(&mut self) -> f64 {
            let now = self.now;
            self.now += 1e-6;
            now
        }
    }

    fn record(name: &str) -> RawLocation {
        RawLocation {
            file_path: format!("{}.ml", name),
            def_name: name.to_string(),
            line: 1,
            col: Range::new(0, 1),
        }
    }

    #[test]
    fn ranked_report() {
        let hot: Vec<RawSlot> = vec![0x3, 0x2, 0x1];
        let cold: Vec<RawSlot> = vec![0x30, 0x20, 0x10];
        let mut map = HMap::new();
        for (slot, name) in
            vec![(0x1, "a"), (0x2, "b"), (0x3, "c"), (0x10, "x"), (0x20, "y"), (0x30, "z")]
        {
            map.insert(slot as RawSlot, vec![record(name)]);
        }

        let mut writer =
            ctf::write::Writer::new(vec![], MapResolver { map }, TickClock { now: 0.0 })
                .expect("writer");
        for _ in 0..8 {
            writer.alloc(2, 1, false, &hot).expect("alloc");
        }
        for _ in 0..2 {
            writer.alloc(2, 1, false, &cold).expect("alloc");
        }
        let bytes = writer.finish().expect("finish");

        let report = analyze(&bytes, 0.3).expect("analysis");
        assert_eq!(report.allocations, 10);
        assert_eq!(report.samples, 10);

        // Only the hot stack clears the 30% floor; its own locus leads the
        // ranking.
        assert!(!report.hotspots.is_empty());
        let top = &report.hotspots[0];
        assert_eq!(top.light, 8);
        assert_eq!(top.total, 8);
        // Oldest frame first: the stack was delivered innermost-first.
        assert_eq!(top.frames, vec!["a@a.ml:1:0-1", "b@b.ml:1:0-1", "c@c.ml:1:0-1"]);
        for hotspot in &report.hotspots {
            assert!(hotspot.light > 3);
        }

        let rendered = report.to_string();
        assert!(rendered.contains("memtrail hotspot report"));
        assert!(rendered.contains("#1: 8 samples"));
    }

    #[test]
    fn frequency_is_validated() {
        assert!(analyze(&[], 0.0).is_err());
        assert!(analyze(&[], 1.5).is_err());
    }
}

//! Source locations and their bit-packed wire form.
//!
//! A location identifier resolves to an ordered list of location records
//! (inlined frames, outermost first). On the wire each record is 48 bits:
//!
//! ```text
//! line:20 | start_col:8 | end_col:10 | filename:5 | defname:5
//! ```
//!
//! serialized as a `u32` low half then a `u16` high half. A 5-bit code of
//! [`mtf::LITERAL_IDX`] means a NUL-terminated literal string follows (file
//! path first, then definition name); any other code is an MTF table index.

prelude! {}

/// Bit width of the line field.
const LINE_BITS: u32 = 20;
/// Bit width of the start-column field.
const START_COL_BITS: u32 = 8;
/// Bit width of the end-column field.
const END_COL_BITS: u32 = 10;
/// Bit width of the two MTF code fields.
const CODE_BITS: u32 = 5;

const LINE_MASK: u64 = (1 << LINE_BITS) - 1;
const START_COL_MASK: u64 = (1 << START_COL_BITS) - 1;
const END_COL_MASK: u64 = (1 << END_COL_BITS) - 1;
const CODE_MASK: u64 = (1 << CODE_BITS) - 1;

const START_COL_OFF: u32 = LINE_BITS;
const END_COL_OFF: u32 = LINE_BITS + START_COL_BITS;
const FILE_OFF: u32 = LINE_BITS + START_COL_BITS + END_COL_BITS;
const DEF_OFF: u32 = FILE_OFF + CODE_BITS;

/// A location identifier, an opaque 64-bit integer.
///
/// Equality is value equality; the hash disperses aligned program-counter
/// values through a multiplicative mix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct LocId(pub u64);

impl std::hash::Hash for LocId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        state.write_u64(self.0.wrapping_mul(0xff51_afd7_ed55_8ccd) >> 16)
    }
}
impl fmt::Display for LocId {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{:#x}", self.0)
    }
}
impl From<u64> for LocId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// An owned location record, as produced by the symbol resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLocation {
    /// Path to the source file.
    pub file_path: String,
    /// Name of the enclosing definition.
    pub def_name: String,
    /// Line index.
    pub line: u32,
    /// Column span.
    pub col: Range<u32>,
}
impl RawLocation {
    /// The sentinel record standing in for unresolvable frames.
    pub fn unknown() -> Self {
        Self {
            file_path: "<unknown>".into(),
            def_name: "<unknown>".into(),
            line: 0,
            col: Range::new(0, 0),
        }
    }

    /// Encodes the record at the current position of the output buffer.
    pub fn encode(
        &self,
        buf: &mut ByteBuf,
        files: &mut MtfTable<String>,
        defs: &mut MtfTable<String>,
    ) -> Res<()> {
        let file_idx = files.encode(&self.file_path);
        let def_idx = defs.encode(&self.def_name);
        let file_code = u64::from(file_idx.unwrap_or(mtf::LITERAL_IDX));
        let def_code = u64::from(def_idx.unwrap_or(mtf::LITERAL_IDX));

        let packed = (u64::from(self.line) & LINE_MASK)
            | (u64::from(self.col.lbound) & START_COL_MASK) << START_COL_OFF
            | (u64::from(self.col.ubound) & END_COL_MASK) << END_COL_OFF
            | file_code << FILE_OFF
            | def_code << DEF_OFF;

        buf.put_u32(packed as u32)?;
        buf.put_u16((packed >> 32) as u16)?;

        if file_idx.is_none() {
            buf.put_string(&self.file_path)?
        }
        if def_idx.is_none() {
            buf.put_string(&self.def_name)?
        }
        Ok(())
    }
}

/// Location-decoding context: one MTF table per string kind.
#[derive(Debug)]
pub struct Cxt<'data> {
    /// File-path table.
    files: MtfTable<&'data str>,
    /// Definition-name table.
    defs: MtfTable<&'data str>,
}
impl<'data> Cxt<'data> {
    /// Constructs a context with placeholder table contents.
    pub fn new() -> Self {
        Self {
            files: MtfTable::new_borrowed(),
            defs: MtfTable::new_borrowed(),
        }
    }
}

/// A location record, borrowed from the trace bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location<'data> {
    /// Path to the source file.
    pub file_path: &'data str,
    /// Name of the enclosing definition.
    pub def_name: &'data str,
    /// Line index.
    pub line: u32,
    /// Column span.
    pub col: Range<u32>,
}

impl<'data> Location<'data> {
    /// Parses a record at the current position in the input parser.
    pub fn parse(parser: &mut parse::RawParser<'data>, cxt: &mut Cxt<'data>) -> Res<Self> {
        let low = u64::from(parser.u32()?);
        let high = u64::from(parser.u16()?);
        let packed = (high << 32) | low;

        let line = convert(packed & LINE_MASK, "location: line");
        let start_col = convert((packed >> START_COL_OFF) & START_COL_MASK, "location: start");
        let end_col = convert((packed >> END_COL_OFF) & END_COL_MASK, "location: end");
        let file_code = ((packed >> FILE_OFF) & CODE_MASK) as u8;
        let def_code = ((packed >> DEF_OFF) & CODE_MASK) as u8;
        pdebug!(
            parser,
            "location codes: file {}, def {}",
            file_code,
            def_code
        );

        let file_path = if (file_code as usize) < mtf::TABLE_LEN {
            cxt.files.decode(file_code)?
        } else {
            let s = parser.string()?;
            cxt.files.install_new(s);
            s
        };
        let def_name = if (def_code as usize) < mtf::TABLE_LEN {
            cxt.defs.decode(def_code)?
        } else {
            let s = parser.string()?;
            cxt.defs.install_new(s);
            s
        };

        Ok(Location {
            file_path,
            def_name,
            line,
            col: Range::new(start_col, end_col),
        })
    }
}

impl fmt::Display for Location<'_> {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(
            fmt,
            "{}@{}:{}:{}-{}",
            self.def_name, self.file_path, self.line, self.col.lbound, self.col.ubound
        )
    }
}

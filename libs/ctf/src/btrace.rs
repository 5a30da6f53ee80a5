//! Backtrace compression through a direct-mapped cache with prediction.
//!
//! The writer owns an [`EncodeCache`], the reader a [`DecodeCache`] that
//! mirrors the writer's decisions by replaying the wire codes. A stack is
//! encoded as a `u16` codeword per frame group:
//!
//! ```text
//! u16 = bucket:14 | tag:2
//!   tag 0: cache hit, no predicted frames follow
//!   tag 1: cache hit, exactly one predicted frame follows
//!   tag 2: cache hit, `u8` run of predicted frames follows
//!   tag 3: cache miss, `u64` literal location ID follows
//! ```
//!
//! After every codeword the predictor entry of the previous frame's bucket
//! points at the chosen bucket; prediction runs follow that chain without
//! emitting further codewords.

prelude! {}

/// Number of buckets in the backtrace cache.
pub const CACHE_SIZE: usize = 1 << 14;
/// Bit width of a bucket index on the wire.
const CACHE_BITS: u32 = 14;

/// Cache hit, zero predictions.
const TAG_HIT0: u16 = 0;
/// Cache hit, one prediction.
const TAG_HIT1: u16 = 1;
/// Cache hit, explicit run length.
const TAG_HITN: u16 = 2;
/// Cache miss, literal follows.
const TAG_MISS: u16 = 3;

/// First candidate bucket for a location ID.
pub(crate) fn bucket_1(id: u64) -> usize {
    (id.wrapping_mul(0x9e37_79b9_7f4a_7c15) >> (64 - CACHE_BITS)) as usize
}
/// Second candidate bucket for a location ID.
pub(crate) fn bucket_2(id: u64) -> usize {
    (id.wrapping_mul(0xc2b2_ae3d_27d4_eb4f) >> (64 - CACHE_BITS)) as usize
}

/// Writer-side backtrace cache.
pub struct EncodeCache {
    /// Location ID cached in each bucket.
    loc: Vec<u64>,
    /// Allocation ID that last used each bucket, drives eviction.
    date: Vec<u64>,
    /// Predicted successor bucket of each bucket.
    pred: Vec<usize>,
}

impl EncodeCache {
    /// Constructor.
    pub fn new() -> Self {
        Self {
            loc: vec![0; CACHE_SIZE],
            date: vec![0; CACHE_SIZE],
            pred: vec![0; CACHE_SIZE],
        }
    }

    /// Encodes the non-shared frames of a stack, oldest first.
    ///
    /// Returns the number of codewords emitted. `on_miss` runs once per
    /// cache miss with the missed location ID, in emission order.
    pub fn encode_suffix(
        &mut self,
        buf: &mut ByteBuf,
        suffix: &[u64],
        alloc_id: AllocId,
        mut on_miss: impl FnMut(u64) -> Res<()>,
    ) -> Res<u16> {
        let mut ncodes: u32 = 0;
        let mut pred_bucket = 0usize;
        let mut i = 0;

        while i < suffix.len() {
            let id = suffix[i];
            let (h1, h2) = (bucket_1(id), bucket_2(id));
            let (bucket, hit) = if self.loc[h1] == id {
                (h1, true)
            } else if self.loc[h2] == id {
                (h2, true)
            } else {
                // Miss: evict whichever candidate went unused the longest.
                let bucket = if self.date[h1] <= self.date[h2] { h1 } else { h2 };
                self.loc[bucket] = id;
                (bucket, false)
            };
            self.date[bucket] = alloc_id;
            self.pred[pred_bucket] = bucket;
            pred_bucket = bucket;
            i += 1;
            ncodes += 1;

            if !hit {
                buf.put_u16(((bucket as u16) << 2) | TAG_MISS)?;
                buf.put_u64(id)?;
                on_miss(id)?;
                continue;
            }

            // Follow the prediction chain as far as it agrees with the
            // stack; the run length saturates at 255 and the next frame
            // re-enters the loop as a fresh hit.
            let mut run: u16 = 0;
            let mut chain = bucket;
            while i < suffix.len() && run < 255 {
                let next = self.pred[chain];
                if self.loc[next] != suffix[i] {
                    break;
                }
                self.date[next] = alloc_id;
                chain = next;
                run += 1;
                i += 1;
            }
            match run {
                0 => buf.put_u16(((bucket as u16) << 2) | TAG_HIT0)?,
                1 => buf.put_u16(((bucket as u16) << 2) | TAG_HIT1)?,
                _ => {
                    buf.put_u16(((bucket as u16) << 2) | TAG_HITN)?;
                    buf.put_u8(run as u8)?
                }
            }
            pred_bucket = chain;
        }

        format_check(ncodes <= u32::from(u16::max_value()), || {
            format!("stack requires {} codewords, more than a u16 can hold", ncodes)
        })?;
        Ok(ncodes as u16)
    }
}

/// Reader-side backtrace cache.
#[derive(Debug)]
pub struct DecodeCache {
    /// Location ID cached in each bucket.
    loc: Vec<u64>,
    /// Predicted successor bucket of each bucket.
    pred: Vec<usize>,
    /// Last backtrace seen, oldest frame first.
    last_backtrace: Vec<u64>,
}

impl DecodeCache {
    /// Constructor.
    pub fn new() -> Self {
        Self {
            loc: vec![0; CACHE_SIZE],
            pred: vec![0; CACHE_SIZE],
            last_backtrace: Vec::with_capacity(16),
        }
    }

    /// Extends `buf` so that it can fit more elements, and inserts `val` at
    /// `pos` in `buf`.
    ///
    /// Expects that `pos == buf.len()`, this is always checked at the
    /// beginning of the function.
    fn extend(buf: &mut Vec<u64>, pos: usize, val: u64) {
        assert!(pos == buf.len());

        let new_len = if buf.len() < 16 { 32 } else { buf.len() * 2 };
        debug_assert!(new_len > buf.len());

        buf.resize(new_len, val)
    }

    /// Inserts the `pos`/`val` binding in `buf`.
    ///
    /// Extends `buf` if necessary.
    fn put(buf: &mut Vec<u64>, pos: usize, val: u64) {
        if pos < buf.len() {
            buf[pos] = val
        } else {
            Self::extend(buf, pos, val)
        }
    }

    /// Decodes a backtrace at the current position in the input parser.
    ///
    /// The result is the full stack, oldest frame first: the first
    /// `common_pref_len` frames of the previous backtrace followed by the
    /// decoded frames.
    pub fn decode_suffix<'data>(
        &mut self,
        parser: &mut parse::RawParser<'data>,
        ncodes: usize,
        common_pref_len: usize,
    ) -> Res<Vec<u64>> {
        format_check(common_pref_len <= self.last_backtrace.len(), || {
            format!(
                "backtrace common prefix of {} frames, previous stack only has {}",
                common_pref_len,
                self.last_backtrace.len(),
            )
        })?;

        let Self {
            loc,
            pred,
            last_backtrace,
        } = self;

        // decode-loop data
        let mut pred_bucket = 0usize;
        let buf = last_backtrace;
        let mut pos = common_pref_len;
        let mut decode_current = ncodes;
        let mut predict_current;

        let res = 'decode: loop {
            if decode_current == 0 {
                break 'decode buf[0..pos].to_vec();
            }

            let codeword = parser.u16()?;
            let bucket = (codeword >> 2) as usize;
            let tag = codeword & 3;

            pred[pred_bucket] = bucket;
            pred_bucket = bucket;

            predict_current = match tag {
                // Cache hit, 0, 1 or N prediction(s).
                TAG_HIT0 | TAG_HIT1 | TAG_HITN => {
                    Self::put(buf, pos, loc[bucket]);
                    pos += 1;
                    decode_current -= 1;
                    if tag == TAG_HITN {
                        u16::from(parser.u8()?)
                    } else {
                        tag
                    }
                }
                // Cache miss.
                _ => {
                    let lit = parser.u64()?;
                    loc[bucket] = lit;
                    Self::put(buf, pos, lit);
                    pos += 1;
                    decode_current -= 1;
                    continue 'decode;
                }
            };

            'predict: loop {
                if predict_current == 0 {
                    continue 'decode;
                } else {
                    pred_bucket = pred[pred_bucket];
                    Self::put(buf, pos, loc[pred_bucket]);
                    pos += 1;
                    predict_current -= 1;
                    continue 'predict;
                }
            }
        };

        Ok(res)
    }
}

//! Bounded byte buffer used by the trace writer.
//!
//! A [`ByteBuf`] is a cursor over a fixed byte window. All integers are
//! little-endian; strings are NUL-terminated. Writes past the end of the
//! window fail with [`Overflow`] carrying the position at which they
//! occurred.
//!
//! [`Overflow`]: ../../base/err/enum.ErrorKind.html#variant.Overflow (Overflow error kind)

prelude! {}

/// A position in a buffer (zero-cost wrapper around a usize).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pos {
    pos: usize,
}
impl std::ops::Sub for Pos {
    type Output = usize;
    fn sub(self, other: Self) -> usize {
        self.pos - other.pos
    }
}
impl std::ops::Deref for Pos {
    type Target = usize;
    fn deref(&self) -> &usize {
        &self.pos
    }
}
impl From<usize> for Pos {
    fn from(pos: usize) -> Self {
        Self { pos }
    }
}
impl fmt::Display for Pos {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        self.pos.fmt(fmt)
    }
}

/// Bounded write cursor over a mutable byte window.
pub struct ByteBuf {
    /// Backing bytes, fixed size.
    bytes: Vec<u8>,
    /// Write position.
    pos: usize,
    /// First position past the writable window.
    pos_end: usize,
}

impl ByteBuf {
    /// Constructor, with a fixed capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            bytes: vec![0u8; capacity],
            pos: 0,
            pos_end: capacity,
        }
    }

    /// Current write position.
    pub fn pos(&self) -> Pos {
        Pos { pos: self.pos }
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.pos
    }
    /// True if nothing was written yet.
    pub fn is_empty(&self) -> bool {
        self.pos == 0
    }
    /// Number of bytes still writable.
    pub fn free(&self) -> usize {
        self.pos_end - self.pos
    }

    /// The bytes written so far.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[0..self.pos]
    }

    /// Resets the write position to the start of the window.
    pub fn clear(&mut self) {
        self.pos = 0
    }

    fn check(&self, can_write: usize) -> Res<()> {
        if self.pos + can_write <= self.pos_end {
            Ok(())
        } else {
            Err(err::ErrorKind::Overflow(self.pos).into())
        }
    }

    /// Writes a `u8`.
    pub fn put_u8(&mut self, val: u8) -> Res<()> {
        self.check(1)?;
        self.bytes[self.pos] = val;
        self.pos += 1;
        Ok(())
    }

    /// Writes a `u16`, little-endian.
    pub fn put_u16(&mut self, val: u16) -> Res<()> {
        self.check(2)?;
        self.bytes[self.pos..self.pos + 2].copy_from_slice(&val.to_le_bytes());
        self.pos += 2;
        Ok(())
    }

    /// Writes a `u32`, little-endian.
    pub fn put_u32(&mut self, val: u32) -> Res<()> {
        self.check(4)?;
        self.bytes[self.pos..self.pos + 4].copy_from_slice(&val.to_le_bytes());
        self.pos += 4;
        Ok(())
    }

    /// Writes a `u64`, little-endian.
    pub fn put_u64(&mut self, val: u64) -> Res<()> {
        self.check(8)?;
        self.bytes[self.pos..self.pos + 8].copy_from_slice(&val.to_le_bytes());
        self.pos += 8;
        Ok(())
    }

    /// Writes a value in variable-length format.
    ///
    /// A single tag byte carries values up to `252` in-band; tags `253`,
    /// `254` and `255` announce a little-endian `u16`, `u32` or `u64`
    /// payload.
    pub fn put_vint(&mut self, val: u64) -> Res<()> {
        if val <= 252 {
            self.put_u8(val as u8)
        } else if val < (1 << 16) {
            self.put_u8(253)?;
            self.put_u16(val as u16)
        } else if val < (1 << 32) {
            self.put_u8(254)?;
            self.put_u32(val as u32)
        } else {
            self.put_u8(255)?;
            self.put_u64(val)
        }
    }

    /// Writes a NUL-terminated string.
    ///
    /// Fails with `BadFormat` if the string contains a NUL byte.
    pub fn put_string(&mut self, s: &str) -> Res<()> {
        format_check(!s.bytes().any(|b| b == 0), || {
            format!("cannot encode string with an interior NUL byte: {:?}", s)
        })?;
        self.check(s.len() + 1)?;
        self.bytes[self.pos..self.pos + s.len()].copy_from_slice(s.as_bytes());
        self.pos += s.len();
        self.bytes[self.pos] = 0;
        self.pos += 1;
        Ok(())
    }

    /// Rewrites a `u16` at a previously written position.
    pub fn patch_u16(&mut self, at: Pos, val: u16) {
        debug_assert!(*at + 2 <= self.pos);
        self.bytes[*at..*at + 2].copy_from_slice(&val.to_le_bytes());
    }
    /// Rewrites a `u32` at a previously written position.
    pub fn patch_u32(&mut self, at: Pos, val: u32) {
        debug_assert!(*at + 4 <= self.pos);
        self.bytes[*at..*at + 4].copy_from_slice(&val.to_le_bytes());
    }
    /// Rewrites a `u64` at a previously written position.
    pub fn patch_u64(&mut self, at: Pos, val: u64) {
        debug_assert!(*at + 8 <= self.pos);
        self.bytes[*at..*at + 8].copy_from_slice(&val.to_le_bytes());
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn fixed_width() {
        let mut buf = ByteBuf::new(32);
        buf.put_u8(0xab).unwrap();
        buf.put_u16(0xcafe).unwrap();
        buf.put_u32(0xdead_beef).unwrap();
        buf.put_u64(0x0123_4567_89ab_cdef).unwrap();
        assert_eq!(
            buf.as_bytes(),
            &[
                0xab, 0xfe, 0xca, 0xef, 0xbe, 0xad, 0xde, 0xef, 0xcd, 0xab, 0x89, 0x67, 0x45,
                0x23, 0x01,
            ][..],
        );
    }

    #[test]
    fn vint_thresholds() {
        let mut buf = ByteBuf::new(64);
        buf.put_vint(0).unwrap();
        buf.put_vint(252).unwrap();
        buf.put_vint(253).unwrap();
        buf.put_vint(65_535).unwrap();
        buf.put_vint(65_536).unwrap();
        buf.put_vint(u64::from(u32::max_value())).unwrap();
        buf.put_vint(u64::from(u32::max_value()) + 1).unwrap();
        let mut expected = vec![0u8, 252];
        expected.push(253);
        expected.extend_from_slice(&253u16.to_le_bytes());
        expected.push(253);
        expected.extend_from_slice(&65_535u16.to_le_bytes());
        expected.push(254);
        expected.extend_from_slice(&65_536u32.to_le_bytes());
        expected.push(254);
        expected.extend_from_slice(&u32::max_value().to_le_bytes());
        expected.push(255);
        expected.extend_from_slice(&(u64::from(u32::max_value()) + 1).to_le_bytes());
        assert_eq!(buf.as_bytes(), &expected[..]);
    }

    #[test]
    fn overflow_carries_position() {
        let mut buf = ByteBuf::new(3);
        buf.put_u16(7).unwrap();
        let e = buf.put_u16(8).unwrap_err();
        match e.kind() {
            base::err::ErrorKind::Overflow(pos) => assert_eq!(*pos, 2),
            k => panic!("expected overflow, got {}", k),
        }
    }

    #[test]
    fn patching() {
        let mut buf = ByteBuf::new(16);
        let at = buf.pos();
        buf.put_u16(0).unwrap();
        buf.put_u64(42).unwrap();
        buf.patch_u16(at, 1337);
        assert_eq!(&buf.as_bytes()[0..2], &1337u16.to_le_bytes());
        assert_eq!(&buf.as_bytes()[2..10], &42u64.to_le_bytes());
    }

    #[test]
    fn strings() {
        let mut buf = ByteBuf::new(16);
        buf.put_string("hi").unwrap();
        assert_eq!(buf.as_bytes(), &[b'h', b'i', 0][..]);
        assert!(buf.put_string("a\0b").is_err());
    }
}

//! Errors for memtrail, handled by `error_chain`.

pub use error_chain::bail;

error_chain::error_chain! {
    types {
        Error, ErrorKind, ResExt, Res;
    }

    foreign_links {
        Io(std::io::Error)
        /// I/O error.
        ;
    }

    links {}

    errors {
        /// A write went past the end of its buffer.
        Overflow(pos: usize) {
            description("write past the end of the buffer")
            display("buffer overflow at position {}", pos)
        }
        /// A read went past the end of its buffer.
        Underflow(pos: usize) {
            description("read past the end of the buffer")
            display("buffer underflow at position {}", pos)
        }
        /// A structural violation in the trace being parsed or produced.
        BadFormat(msg: String) {
            description("malformed trace")
            display("malformed trace: {}", msg)
        }
    }
}

impl Error {
    /// Multi-line representation of a trace of errors.
    pub fn to_pretty(&self) -> String {
        let mut s = String::with_capacity(400);

        // Reverse errors.
        let mut errs = crate::SVec16::new();
        for e in self.iter() {
            errs.push(e)
        }

        let mut is_first = true;
        for e in errs.into_iter().rev() {
            if is_first {
                is_first = false
            } else {
                s.push_str("\n")
            }
            s.push_str(&e.to_string())
        }

        s.shrink_to_fit();

        s
    }
}

/// Raises a [`BadFormat`] error when a parsed invariant is violated.
///
/// [`BadFormat`]: enum.ErrorKind.html#variant.BadFormat (BadFormat variant)
#[inline]
pub fn format_check(ok: bool, msg: impl FnOnce() -> String) -> Res<()> {
    if ok {
        Ok(())
    } else {
        Err(ErrorKind::BadFormat(msg()).into())
    }
}

//! Macros for the codec crate.

/// Imports this crate's prelude.
#[macro_export]
macro_rules! prelude {
    () => {
        use $crate::prelude::*;
    };
    ($($imports:tt)*) => {
        use $crate::prelude::{$($imports)*};
    };
}

/// Raises a `BadFormat` error.
macro_rules! bad_format {
    ($($blah:tt)*) => {
        return Err(
            base::err::ErrorKind::BadFormat(format!($($blah)*)).into()
        )
    };
}

/// Logs a parsing step, active when [`crate::VERB`] is set.
macro_rules! pinfo {
    ($parser:expr, $($blah:tt)*) => {
        if $crate::VERB {
            base::prelude::log::trace!(
                "[parse @{}] {}",
                $parser.real_position().0,
                format_args!($($blah)*),
            )
        }
    };
}

/// Logs a low-level parsing step, active when [`crate::DEBUG_VERB`] is set.
macro_rules! pdebug {
    ($parser:expr, $($blah:tt)*) => {
        if $crate::DEBUG_VERB {
            base::prelude::log::trace!(
                "[parse @{}] {}",
                $parser.real_position().0,
                format_args!($($blah)*),
            )
        }
    };
}

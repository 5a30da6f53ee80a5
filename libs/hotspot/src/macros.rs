//! Macros for the analyzer crate.

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

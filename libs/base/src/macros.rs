//! Macros used throughout the whole project.

/// Fails if a result expression is an error, after printing the error.
#[macro_export]
macro_rules! unwrap_or {
    ($e:expr, exit) => {
        $crate::unwrap_or!($e, std::process::exit(2))
    };
    ($e:expr, $action:expr) => {
        match $e {
            Ok(res) => res,
            Err(e) => {
                $crate::prelude::log::error!("|===| Error ({}:{})", file!(), line!());
                for e in e.iter() {
                    for line in format!("{}", e).lines() {
                        $crate::prelude::log::error!("| {}", line)
                    }
                }
                $crate::prelude::log::error!("|===|");
                $action
            }
        }
    };
}

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

//! Memtrail's command-line analyzer.

#[macro_use]
extern crate clap;

use base::prelude::ResExt;
use base::log;

/// Default clap values.
mod default {
    /// Default frequency floor.
    pub const FREQUENCY: &str = "0.01";
}

/// Fails if the input string is not a frequency in `(0, 1]`.
fn frequency_validator(s: String) -> Result<(), String> {
    use std::str::FromStr;
    match f64::from_str(&s) {
        Ok(f) if f > 0.0 && f <= 1.0 => Ok(()),
        Ok(f) => Err(format!("expected a frequency in (0, 1], found `{}`", f)),
        Err(_) => Err(format!("expected a real number, found `{}`", s)),
    }
}

/// Initializes the logger.
fn init_logger(verb: u64) {
    let mut builder = pretty_env_logger::formatted_timed_builder();

    let level = match verb {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    builder.filter_module("memtrail", level);
    builder.filter_module("ctf", level);
    builder.filter_module("hotspot", level);
    builder.init();
}

pub fn main() {
    let matches = clap_app!(memtrail =>
        (author: crate_authors!())
        (version: crate_version!())
        (about: "Ranks the hot backtrace substrings of an allocation trace.")
        (@arg VERB:
            -v --verbose
            ...
            "activates verbose output"
        )
        (@arg TRACE:
            +required
            "path to the trace file (.ctf)"
        )
        (@arg FREQUENCY:
            !required
            default_value(default::FREQUENCY)
            { frequency_validator }
            "frequency floor in (0, 1]: substrings above this share of the samples are reported"
        )
    )
    .get_matches();

    let verb = matches.occurrences_of("VERB");
    init_logger(verb);

    let path = matches.value_of("TRACE").expect("required argument");
    let frequency = {
        use std::str::FromStr;
        let frequency = matches.value_of("FREQUENCY").expect("argument with default");
        f64::from_str(frequency).expect("argument with validator")
    };

    log::info!("reading `{}`", path);
    let bytes = base::unwrap_or! {
        std::fs::read(path).chain_err(|| format!("while reading trace file `{}`", path)),
        exit
    };

    log::info!("analyzing {} bytes at frequency {}", bytes.len(), frequency);
    let report = base::unwrap_or! {
        memtrail::analyze(&bytes, frequency),
        exit
    };

    println!("{}", report)
}

//! Common imports.

pub use std::{
    borrow::Borrow,
    collections::{BTreeMap as BTMap, BTreeSet as BTSet, HashMap as HMap, HashSet as HSet},
    convert::{TryFrom, TryInto},
    fmt, io, ops,
    str::FromStr,
    sync::{self, Arc},
};

pub use lazy_static::lazy_static;

/// Log macros re-exports.
pub mod log {
    pub use log::{debug, error, info, trace, warn};
}

pub use crate::{
    convert, destroy,
    err::{self, format_check, Res, ResExt},
    error_chain::{self, bail},
    identity, Range, RangeCmp, SVec16, SVec32, SVec64, SVec8,
};

/// Inhabited type.
pub enum Inhabited {}

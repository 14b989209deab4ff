//! Small async building blocks shared by the gitshelf crates.

mod keyed;

pub use crate::keyed::{KeyedGuard, KeyedLocks};

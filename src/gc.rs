//! This module represents the main way to interact with the garbage collector.

#![allow(clippy::unsafe_removed_from_name)]

pub use ::gc::{
    custom_trace, force_collect, unsafe_empty_trace as empty_trace, Finalize, Gc, GcCell,
    GcCellRef as Ref, GcCellRefMut as RefMut, Trace,
};

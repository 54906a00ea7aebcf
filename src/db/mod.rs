//! Relational store access: connections, table replacement and trigger control.

mod client;
mod replace;
mod triggers;

pub use client::{open, quote_ident, table_exists};
pub use replace::{replace_table, replace_table_in, Column, IndexDef, TableDef, TableRow};
pub use triggers::SuspendedTriggers;

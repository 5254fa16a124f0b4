//! HPACK dynamic header table (RFC 7541) — spec.md §4.9.

mod table;

pub use table::{AllocationTracker, Field, HpackDynamicTable, HpackTableEntry, NullTracker};

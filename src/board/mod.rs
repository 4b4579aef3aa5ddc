//! External board client
//!
//! Every query re-fetches live data; nothing is cached.

mod client;

pub use client::{parse_items_to_records, BoardClient, BoardItem, ColumnValue, RawRecord};

pub mod compactor;

pub use compactor::{compact_lines, compact_order_book_file, CompactedTick};

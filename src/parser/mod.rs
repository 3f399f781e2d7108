pub mod dates;
pub mod feed;
pub mod table;

pub use dates::normalize_date;
pub use feed::parse_feed;
pub use table::{parse_table, ColumnConfig, ExtractMode, TableParseConfig};

//! Sinks for query results.

pub mod file;

use std::io;

pub use file::FileOutputCollector;

/// Receives a result set: the column names once, then each row.
pub trait OutputCollector: Send {
    fn init_columns(&mut self, columns: &[String]) -> io::Result<()>;

    fn collect(&mut self, values: &[String]) -> io::Result<()>;

    /// Flush and release the sink. Further writes fail.
    fn close(&mut self) -> io::Result<()>;
}

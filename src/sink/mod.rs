pub mod csv;
pub mod db;

pub use self::csv::CsvSink;
pub use self::db::Store;

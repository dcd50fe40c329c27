pub mod log_entry;

pub use log_entry::{HistoryEntry, LogEntry, NewLogEntry};

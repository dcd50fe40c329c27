pub mod history;
pub mod summarize;

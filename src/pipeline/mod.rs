// Data pipeline: ingestion, processing and storage, plus the driver tying them together

pub mod driver;
pub mod ingestion;
pub mod monitoring;
pub mod processing;
pub mod retention;
pub mod storage;
pub mod tasks;

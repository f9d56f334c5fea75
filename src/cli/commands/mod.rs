pub mod config;
pub mod import;
pub mod ingest;
pub mod insights;
pub mod run;
pub mod serve;
pub mod status;

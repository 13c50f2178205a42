pub mod api;
pub mod assembler;
pub mod backend;
pub mod chunker;
pub mod config;
pub mod consolidator;
pub mod mode;
pub mod orchestrator;
pub mod paths;
pub mod projects;
pub mod record_filter;
pub mod report_store;
pub mod stats_cache;
pub mod util;
pub mod warn;

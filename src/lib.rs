pub mod batch;
pub mod completion;
pub mod config;
pub mod format;
pub mod humanize;
pub mod model;
pub mod observability;
pub mod scheduler;
pub mod worker;

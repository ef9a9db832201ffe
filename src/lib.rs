pub mod brs;
pub mod cli;
pub mod config;
pub mod fmt;
pub mod logging;
pub mod marks;
pub mod sheets;
pub mod utils;

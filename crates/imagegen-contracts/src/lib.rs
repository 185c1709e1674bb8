pub mod config;
pub mod requests;
pub mod results;

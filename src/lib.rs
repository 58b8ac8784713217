pub mod config;
pub mod constants;
pub mod error;
pub mod fetcher;
pub mod infra;
pub mod logging;
pub mod metrics;
pub mod normalize;
pub mod parser;
pub mod pipeline;
pub mod storage;
pub mod types;

#[cfg(test)]
mod test_support;

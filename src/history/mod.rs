pub mod audit;
pub mod bucketer;
pub mod config;
pub mod document;
pub mod fetcher;
pub mod merge;
pub mod model;
pub mod paths;
pub mod render;
pub mod retrieval;
pub mod util;
pub mod walker;
pub mod warn;
pub mod writer;

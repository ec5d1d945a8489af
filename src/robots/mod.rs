//! Robots.txt handling module
//!
//! Fetching, parsing, and caching of robots.txt files. Used only when the
//! crawl plan enables `respect-robots-txt`.

mod cache;
mod parser;

pub use cache::{CachedRobots, RobotsCache};
pub use parser::ParsedRobots;

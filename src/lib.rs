//! Keeps track of when you work. A small daemon samples how long the computer has been idle and
//! stores the measurements in chunk files, the cli turns them into one line per day with start,
//! end and worked time.

pub mod cli;
pub mod daemon;
pub mod fs;
pub mod idle_api;
pub mod utils;

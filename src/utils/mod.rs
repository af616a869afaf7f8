//! Utility modules for the content pipeline.

pub mod date;
pub mod hash;
pub mod minify;
pub mod slug;
pub mod xml;

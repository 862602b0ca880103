pub mod cache;
pub mod catalog;
pub mod result;
pub mod settings;
pub mod tracing_utils;
pub mod tree;

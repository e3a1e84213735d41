pub mod adapter;
pub mod cli;
pub mod config;
pub mod diagnostics;
pub mod export;
pub mod language;
pub mod model;
pub mod normalize;
pub mod util;
pub mod validate;

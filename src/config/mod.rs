pub mod defs;
pub mod loader;

pub mod cerberus;
pub mod stages;

pub mod command;
pub mod dispatch;
pub mod fastx;
pub mod file;
pub mod hierarchy;
pub mod hmmer;
pub mod report;
pub mod rollup;
pub mod stats;
pub mod system;
pub mod work;

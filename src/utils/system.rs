// src/utils/system.rs: System functions

use sysinfo::System;


/// Determines number of cores that can be used for worker tasks.
///
/// # Returns
///
/// usize physical core count, 1 if it cannot be detected.
pub fn detect_cores() -> usize {
    System::physical_core_count().unwrap_or(1).max(1)
}


/// Name of the machine running a worker, for the per-item start line.
pub fn host_name() -> String {
    System::host_name().unwrap_or_else(|| "localhost".to_string())
}

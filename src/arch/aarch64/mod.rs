pub use crate::boot;
pub mod arch_impl;
pub mod syscall;

// Re-export things from arch_impl for convenience
pub use arch_impl::*;

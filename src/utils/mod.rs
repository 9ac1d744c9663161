//! Thin wrappers over the `libc` calls this crate issues.
//!
//! Every wrapper captures the OS error on the line right after the failing
//! call and hands it back through its `Result`, so nothing above this layer
//! ever reads `errno` itself.

#[cfg(any(target_os = "linux", target_os = "android"))]
pub(crate) mod epoll;
pub(crate) mod fd;
pub mod socket;

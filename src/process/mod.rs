// src/process/mod.rs
mod manager;

pub use manager::{ProcessError, ProcessManager};

#[macro_use]
pub mod log;

pub mod config;
pub mod db;
pub mod grading;
pub mod ipc;

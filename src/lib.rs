// src/lib.rs
//! ELF hardening checker: parse binaries, detect their toolchain, evaluate
//! hardening rules and report what is missing.

pub mod binary;
pub mod cli;
pub mod config;
pub mod debuginfo;
pub mod report;
pub mod rules;
pub mod scanner;
pub mod toolchain;

pub use binary::{ElfBinary, ParseError};
pub use config::Config;
pub use rules::{Finding, Rule, Status};
pub use scanner::{FileResult, ScanOptions, Scanner};
pub use toolchain::{Compiler, Toolchain, Version};

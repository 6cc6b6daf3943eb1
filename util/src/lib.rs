#![deny(missing_docs)]
//! This lib provide several utilities for use in the `sipecho` project.

pub mod dns_resolver;
pub mod scanner;
pub mod util;

pub use dns_resolver::*;
pub use scanner::*;

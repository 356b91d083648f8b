//! Infrastructure adapters and runtime bootstrap.

pub mod error;
pub mod fs;
pub mod livereload;
pub mod telemetry;

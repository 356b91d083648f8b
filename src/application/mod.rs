//! Application services: the render pipeline and the watch loop driving it.

pub mod error;
pub mod render;
pub mod watch;

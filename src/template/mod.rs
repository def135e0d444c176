//! Template and path resolution over a run's output map.

mod resolver;

pub use resolver::{resolve_path, resolve_template, value_to_display};

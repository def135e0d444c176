//! Constrained evaluation of user-authored expressions and code bodies.
//!
//! Backed by an embedded JavaScript interpreter (boa) with no host bindings:
//! no filesystem, network, environment, or timers. The only values visible to
//! user code are the injected `inputs` and `context` objects (plus
//! `currentItem` inside loop scopes). Each call runs on a blocking thread
//! bounded by a wall-clock budget.

mod js;

pub use js::{Bindings, Sandbox};

//! CLI discovery: version probing, compatibility classification and the
//! resolver that decides whether the CLI may be used.

mod probe;
mod resolver;
mod version;
pub mod warning;

pub use probe::*;
pub use resolver::*;
pub use version::*;

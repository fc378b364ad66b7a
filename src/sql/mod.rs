//! Safe SQL: query plans built from whitelisted identifiers, values as parameters.

mod builder;
pub mod params;
pub mod plan;
pub use builder::*;
pub use params::*;
pub use plan::*;

mod module;
mod registry;
mod version;

pub use module::*;
pub use registry::*;
pub use version::*;

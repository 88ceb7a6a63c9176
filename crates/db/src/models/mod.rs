mod registry_value;

pub use registry_value::*;

pub use crate::types::ProbeHoseError;

pub type Result<T> = std::result::Result<T, ProbeHoseError>;

pub mod cli;
pub mod error;
pub mod mirror;
pub mod settings;
pub mod sync;

pub use error::{NvdMirrorError, Result};

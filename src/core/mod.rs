pub mod error;

pub use error::{DevenvError, Result};

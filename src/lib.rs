pub mod cfa;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod log;
pub mod render;
pub mod util;

pub use error::{Error, Result};

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;

pub mod kafka;

pub use config::Config;
pub use error::{Error, PublishError, Result};
pub use lifecycle::{run, Phase};

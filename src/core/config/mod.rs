pub mod data;
pub mod io;

pub use data::{AudioConfig, Config, StoreConfig, TranscodeConfig};
pub use io::ConfigError;

#[cfg(test)]
pub mod tests;

pub mod config;
pub mod constants;
pub mod dispatch;
pub mod render;
pub mod tree;

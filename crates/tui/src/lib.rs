pub mod app;
pub mod browser;
pub mod config;
pub mod keybinds;
pub mod relay;
pub mod ui;

pub use config::Config;

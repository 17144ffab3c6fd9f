pub mod cli;
pub mod commands;
pub mod config;
pub mod editor;
pub mod jobs;
pub mod last_command;
pub mod location;
pub mod lock;
pub mod logging;
pub mod portal;
pub mod terminal;

pub use config::{load_config, Paths, Settings};
pub use editor::{Editor, LineBuffer, Mode};
pub use lock::LockKeeper;
pub use portal::Portal;
pub use terminal::Terminal;

pub mod browser;
pub mod command;
pub mod config;
pub mod connection;
pub mod cursor;
pub mod editor;
pub mod error;
pub mod keyspace;
pub mod profiles;
pub mod reader;
pub mod value_format;

pub use browser::Browser;
pub use error::{BrowserError, BrowserResult};

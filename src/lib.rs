// filestore - typed records in a single JSON file, driven from a command shell

pub mod command;
pub mod config;
pub mod console;
pub mod error;
pub mod models;
pub mod record;
pub mod store;
pub mod value;

// Re-export main types for convenience
pub use command::Command;
pub use config::Config;
pub use console::{Console, Response};
pub use error::ShellError;
pub use models::{BASE_MODEL, ModelRegistry};
pub use record::Record;
pub use store::Store;
pub use value::ValueKind;

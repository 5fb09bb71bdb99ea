pub mod config;
pub mod error;
pub mod taxonomy;
pub mod types;

pub use config::{Config, FileConfig};
pub use error::PressroomError;
pub use taxonomy::Taxonomy;
pub use types::*;

pub mod settings;
pub mod types;
mod validators;

// Re-export all public types
pub use settings::Settings;
pub use types::*;
pub(crate) use validators::parse_size_string;

pub mod api;
pub mod client;
pub mod config;
pub mod conversation;
pub mod error;
pub mod image;
pub mod state;

// Re-export main types for convenience
pub use api::{ChatRequest, ChatResponse};
pub use client::{AssistantService, HttpAssistantClient};
pub use config::{Config, Settings};
pub use conversation::{Conversation, APOLOGY, DEFAULT_GREETING};
pub use error::{ClientError, ConfigError, ImageError, Operation};
pub use image::ImageUpload;
pub use state::{ChatMessage, ChatRole};

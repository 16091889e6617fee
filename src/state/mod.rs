// State management module
// Shared gateway state wrapping the chat and room registries

pub mod app_state;

pub use app_state::AppState;

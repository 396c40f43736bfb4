mod pool_settings;
mod secret;
mod settings;
pub mod uri;

pub use pool_settings::PoolSettings;
pub use secret::Secret;
pub use settings::{
    AdditionalStatement, CompletionSettings, ContextSettings, ExecutionSettings,
    ValidationSettings, VisualizationSettings, DEFAULT_COMPLETION_API_KEY_VARIABLE,
    DEFAULT_DENIED_FUNCTIONS,
};
pub use uri::ConnectionUri;

pub mod settings;
pub mod store;

pub use settings::{
    ConfigError, Configuration, CustomTool, ExecutionConfig, GeneralConfig,
    DEFAULT_HOOK_TIMEOUT_SECS,
};
pub use store::{ConfigStore, STATE_DIR};

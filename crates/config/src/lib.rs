//! Configuration: schema, file discovery, and environment overrides.

pub mod loader;
pub mod schema;

pub use loader::{
    apply_env_overrides, clear_config_dir, data_dir, discover_and_load, load_config,
    set_config_dir,
};
pub use schema::WagateConfig;

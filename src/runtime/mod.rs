pub mod args;
pub mod status;

pub use args::{parse_runtime_args, RunMode, RuntimeArgs};
pub use status::{emit_explained_config, emit_refresh_status, emit_runtime_config_status};

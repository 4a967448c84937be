//! # parley-settings
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`ParleySettings::default()`]
//! 2. **User file**: `~/.parley/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: the service variables
//!    (`AZURE_AI_PROJECT_ENDPOINT`, `MODEL_DEPLOYMENT_NAME`, ...) and
//!    `PARLEY_*` overrides. A `.env` file is loaded into the environment first.
//!
//! Credentials are read separately through [`credentials`] and never touch
//! the settings file.
//!
//! ```no_run
//! let loaded = parley_settings::load_settings()?;
//! loaded.log_warnings();
//! let settings = loaded.settings;
//! let endpoint = settings.require_endpoint()?;
//! # Ok::<(), parley_settings::SettingsError>(())
//! ```

pub mod credentials;
pub mod errors;
pub mod loader;
pub mod types;

pub use credentials::{project_credential, router_key};
pub use errors::{Result, SettingsError};
pub use loader::{
    deep_merge, load_settings, load_settings_from_path, load_settings_with, settings_path, LoadedSettings,
    SettingsWarning,
};
pub use types::*;

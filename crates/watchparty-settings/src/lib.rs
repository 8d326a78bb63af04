//! # watchparty-settings
//!
//! Layered configuration shared by the watch-party server and client.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`WatchpartySettings::default()`]
//! 2. **User file**: `~/.watchparty/settings.json` or an explicit path
//! 3. **Environment variables**: `PORT` and `WATCHPARTY_*` overrides
//!
//! ```no_run
//! let settings = watchparty_settings::load_settings().unwrap_or_default();
//! println!("listening on port {}", settings.server.port);
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path, validate};
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn re_exports_work() {
        let _settings = WatchpartySettings::default();
        let path = settings_path();
        assert!(path.ends_with(".watchparty/settings.json"));
    }
}

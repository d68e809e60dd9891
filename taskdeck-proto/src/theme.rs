//! Persisted theme preference.

use serde::{Deserialize, Serialize};

/// The user's light/dark choice. `None` means the user never chose and the
/// system preference applies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThemePreference {
    /// Explicit dark-mode choice.
    pub dark_mode: Option<bool>,
}

impl ThemePreference {
    /// Resolves the effective mode given the system preference.
    #[must_use]
    pub fn is_dark(self, system_prefers_dark: bool) -> bool {
        self.dark_mode.unwrap_or(system_prefers_dark)
    }
}

//! Light/dark theme preference, persisted locally.

use taskdeck_proto::theme::ThemePreference;

use crate::storage::{self, LocalStorage, StorageError};

/// Storage key of the theme preference.
pub const THEME_STORAGE_KEY: &str = "theme-storage";

/// Holds the theme preference and writes every change through to storage.
pub struct ThemeStore<'a> {
    storage: &'a dyn LocalStorage,
    preference: ThemePreference,
}

impl<'a> ThemeStore<'a> {
    /// Loads the stored preference (defaulting to "no choice yet").
    #[must_use]
    pub fn load(storage: &'a dyn LocalStorage) -> Self {
        Self {
            storage,
            preference: storage::load_or_default(storage, THEME_STORAGE_KEY),
        }
    }

    /// The raw stored preference.
    #[must_use]
    pub const fn preference(&self) -> ThemePreference {
        self.preference
    }

    /// Effective mode: the stored choice, or the system preference.
    #[must_use]
    pub fn is_dark(&self, system_prefers_dark: bool) -> bool {
        self.preference.is_dark(system_prefers_dark)
    }

    /// Resolves the mode at startup and pins it as the stored choice.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the preference cannot be saved.
    pub fn initialize(&mut self, system_prefers_dark: bool) -> Result<bool, StorageError> {
        let dark = self.is_dark(system_prefers_dark);
        self.set(dark)?;
        Ok(dark)
    }

    /// Flips the mode and returns the new value.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the preference cannot be saved.
    pub fn toggle(&mut self, system_prefers_dark: bool) -> Result<bool, StorageError> {
        let dark = !self.is_dark(system_prefers_dark);
        self.set(dark)?;
        Ok(dark)
    }

    /// Stores an explicit choice.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the preference cannot be saved.
    pub fn set(&mut self, dark: bool) -> Result<(), StorageError> {
        let next = ThemePreference {
            dark_mode: Some(dark),
        };
        storage::save(self.storage, THEME_STORAGE_KEY, &next)?;
        self.preference = next;
        tracing::debug!(dark, "theme preference saved");
        Ok(())
    }
}

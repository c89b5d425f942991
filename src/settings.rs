use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock};

/// Whether the user has granted the desktop-notification capability.
/// When disabled, deferred completion signals are skipped silently and the
/// foreground chime is the only alarm.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSettings {
    pub enabled: bool,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self { enabled: false }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChimeSettings {
    pub enabled: bool,
}

impl Default for ChimeSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserSettings {
    #[serde(default)]
    notifications: NotificationSettings,
    #[serde(default)]
    chime: ChimeSettings,
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_default()
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn notifications(&self) -> NotificationSettings {
        self.data.read().unwrap().notifications.clone()
    }

    pub fn chime(&self) -> ChimeSettings {
        self.data.read().unwrap().chime.clone()
    }

    pub fn update_notifications(&self, settings: NotificationSettings) -> Result<()> {
        let mut guard = self.data.write().unwrap();
        guard.notifications = settings;
        self.persist(&guard)
    }

    pub fn update_chime(&self, settings: ChimeSettings) -> Result<()> {
        let mut guard = self.data.write().unwrap();
        guard.chime = settings;
        self.persist(&guard)
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_require_explicit_notification_grant() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json")).unwrap();
        assert!(!store.notifications().enabled);
        assert!(store.chime().enabled);
    }

    #[test]
    fn settings_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let store = SettingsStore::new(path.clone()).unwrap();
        store
            .update_notifications(NotificationSettings { enabled: true })
            .unwrap();

        let reopened = SettingsStore::new(path).unwrap();
        assert!(reopened.notifications().enabled);
        assert!(reopened.chime().enabled);
    }
}

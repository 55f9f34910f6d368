use super::WalletKind;
use crate::chain::ChainFamily;
use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    io::ErrorKind,
    path::{Path, PathBuf},
};

/// The only wallet state that survives a restart. Connections themselves are
/// never restored, a signature has to prove control again every session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default)]
    pub auto_connect: bool,
    #[serde(default)]
    pub preferred_wallet: BTreeMap<ChainFamily, WalletKind>,
}

/// JSON file backing [`Preferences`].
#[derive(Debug, Clone)]
pub struct PreferencesFile {
    path: PathBuf,
}

impl PreferencesFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing file means defaults.
    pub fn load(&self) -> anyhow::Result<Preferences> {
        match std::fs::read(&self.path) {
            Ok(raw) => serde_json::from_slice(&raw)
                .with_context(|| format!("parse preferences {}", self.path.display())),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Preferences::default()),
            Err(err) => {
                Err(err).with_context(|| format!("read preferences {}", self.path.display()))
            }
        }
    }

    pub fn save(&self, preferences: &Preferences) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        let raw = serde_json::to_vec_pretty(preferences)?;
        std::fs::write(&self.path, raw)
            .with_context(|| format!("write preferences {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("throu-prefs-{}", uuid::Uuid::new_v4()))
            .join(name)
    }

    #[test]
    fn test_missing_file_is_default() -> anyhow::Result<()> {
        let file = PreferencesFile::new(temp_path("missing.json"));
        assert_eq!(file.load()?, Preferences::default());
        Ok(())
    }

    #[test]
    fn test_save_and_load() -> anyhow::Result<()> {
        let file = PreferencesFile::new(temp_path("prefs.json"));
        let mut preferences = Preferences {
            auto_connect: true,
            ..Default::default()
        };
        preferences
            .preferred_wallet
            .insert(ChainFamily::Solana, WalletKind::Solflare);
        file.save(&preferences)?;
        assert_eq!(file.load()?, preferences);

        let raw = std::fs::read_to_string(file.path())?;
        assert!(raw.contains("\"solana\": \"solflare\""));
        Ok(())
    }

    #[test]
    fn test_corrupt_file_errors() -> anyhow::Result<()> {
        let file = PreferencesFile::new(temp_path("corrupt.json"));
        file.save(&Preferences::default())?;
        std::fs::write(file.path(), b"{not json")?;
        assert!(file.load().is_err());
        Ok(())
    }
}

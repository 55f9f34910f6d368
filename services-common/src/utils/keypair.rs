use std::{fs::File, ops::Deref, path::PathBuf, sync::Arc};

use serde::{de, Deserialize, Deserializer};
use solana_sdk::{signature::Keypair, signer::Signer};

/// Keypair loadable from config either as a keygen json file or a raw byte array.
#[derive(Deserialize, PartialEq)]
pub struct SaneKeypair(#[serde(deserialize_with = "deserialize_keypair")] Arc<Keypair>);

impl SaneKeypair {
    pub fn to_keypair(&self) -> Keypair {
        self.0.insecure_clone()
    }
}

impl Clone for SaneKeypair {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl Deref for SaneKeypair {
    type Target = Keypair;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Keypair> for SaneKeypair {
    fn from(value: Keypair) -> Self {
        Self(value.into())
    }
}

// never print secret bytes
impl std::fmt::Debug for SaneKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SaneKeypair({})", self.pubkey())
    }
}

pub fn deserialize_keypair<'de, D, K: From<Keypair>>(deserializer: D) -> Result<K, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum SerdeKeypair {
        FromFile { path: PathBuf },
        Raw { array: Vec<u8> },
    }

    let bytes = match SerdeKeypair::deserialize(deserializer)? {
        SerdeKeypair::FromFile { path } => {
            serde_json::from_reader(File::open(path).map_err(de::Error::custom)?)
                .map_err(de::Error::custom)?
        }
        SerdeKeypair::Raw { array } => array,
    };
    Keypair::from_bytes(&bytes)
        .map_err(de::Error::custom)
        .map(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize, Debug)]
    struct Keys {
        investor: SaneKeypair,
    }

    #[test]
    fn test_raw_array_keypair() -> anyhow::Result<()> {
        let keypair = Keypair::new();
        let raw = serde_json::json!({ "investor": { "array": keypair.to_bytes().to_vec() } });
        let keys: Keys = serde_json::from_value(raw)?;
        assert_eq!(keys.investor.pubkey(), keypair.pubkey());
        assert!(format!("{:?}", keys.investor).contains(&keypair.pubkey().to_string()));
        Ok(())
    }

    #[test]
    fn test_missing_file_is_error() {
        let raw = serde_json::json!({ "investor": { "path": "/definitely/not/here.json" } });
        assert!(serde_json::from_value::<Keys>(raw).is_err());
    }
}

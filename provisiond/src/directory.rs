//! File-backed stand-ins for the twin-key directory and farm
//! directory (spec §6: "the authorization key directory" is an
//! external collaborator with only its interface specified). A real
//! deployment points `provisiond-auth::Authorizer` at a chain-backed
//! implementation; this one reads a TOML file once at start-up so the
//! daemon is runnable stand-alone.

use async_trait::async_trait;
use provisiond_auth::{FarmDirectory, KeyDirectory};
use provisiond_types::TwinId;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
struct TwinKeysFile {
    #[serde(default)]
    twins: HashMap<String, String>,
    #[serde(default)]
    farms: HashMap<String, TwinId>,
}

pub struct FileDirectory {
    keys: HashMap<TwinId, [u8; 32]>,
    farms: HashMap<u32, TwinId>,
}

impl FileDirectory {
    /// Loads `path` if present; an absent file yields an empty
    /// directory (every authorization then fails closed).
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let file = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str::<TwinKeysFile>(&content)?
        } else {
            tracing::warn!(path = %path.display(), "twin-key directory file not found; starting with an empty directory");
            TwinKeysFile::default()
        };

        let mut keys = HashMap::new();
        for (twin_str, hex_key) in file.twins {
            let twin: TwinId = twin_str.parse()?;
            let bytes = hex::decode(hex_key.trim())?;
            let key: [u8; 32] = bytes
                .try_into()
                .map_err(|_| anyhow::anyhow!("twin {twin} key is not 32 bytes"))?;
            keys.insert(twin, key);
        }
        let mut farms = HashMap::new();
        for (farm_str, twin) in file.farms {
            farms.insert(farm_str.parse()?, twin);
        }
        Ok(FileDirectory { keys, farms })
    }
}

#[async_trait]
impl KeyDirectory for FileDirectory {
    async fn key_for(&self, twin: TwinId) -> Option<[u8; 32]> {
        self.keys.get(&twin).copied()
    }
}

#[async_trait]
impl FarmDirectory for FileDirectory {
    async fn twin_for_farm(&self, farm_id: u32) -> Option<TwinId> {
        self.farms.get(&farm_id).copied()
    }
}

//! Static parcel directory for worlds with coordinates.
//!
//! Loaded once per run from a JSON export of the world's parcel registry
//! and indexed by NFT token id. A missing or unreadable file is fatal:
//! downloads cannot resolve asset locations without it.

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::Deserialize;

pub const DEFAULT_PARCELS_PATH: &str = "data/decentraland_parcels.json";

#[derive(Debug, Clone, Deserialize)]
pub struct Parcel {
    #[serde(default)]
    pub id: String,
    pub x: i64,
    pub y: i64,
    #[serde(rename = "tokenId", default)]
    pub token_id: String,
}

#[derive(Debug, Deserialize)]
struct ParcelFile {
    #[serde(default)]
    #[allow(dead_code)]
    ok: bool,
    data: HashMap<String, Parcel>,
}

#[derive(Debug, Default)]
pub struct ParcelDirectory {
    by_token_id: HashMap<String, Parcel>,
}

impl ParcelDirectory {
    pub fn load(
        path: &Path,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let file = File::open(path)
            .map_err(|e| format!("cannot open parcel directory {}: {}", path.display(), e))?;
        let parsed: ParcelFile = serde_json::from_reader(BufReader::new(file))?;

        let mut by_token_id = HashMap::with_capacity(parsed.data.len());
        for (_, parcel) in parsed.data {
            by_token_id.insert(parcel.token_id.clone(), parcel);
        }

        tracing::info!("Loaded {} parcels from {}", by_token_id.len(), path.display());

        Ok(Self { by_token_id })
    }

    pub fn from_parcels(parcels: Vec<Parcel>) -> Self {
        let by_token_id = parcels
            .into_iter()
            .map(|p| (p.token_id.clone(), p))
            .collect();
        Self { by_token_id }
    }

    pub fn get(&self, token_id: &str) -> Option<&Parcel> {
        self.by_token_id.get(token_id)
    }

    pub fn len(&self) -> usize {
        self.by_token_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_token_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_registry_export_and_indexes_by_token_id() {
        let raw = r#"{
            "ok": true,
            "data": {
                "-44,-77": { "id": "-44,-77", "x": -44, "y": -77, "tokenId": "1234" },
                "10,20": { "id": "10,20", "x": 10, "y": 20, "tokenId": "9999" }
            }
        }"#;
        let parsed: ParcelFile = serde_json::from_str(raw).unwrap();
        let directory = ParcelDirectory::from_parcels(parsed.data.into_values().collect());

        assert_eq!(directory.len(), 2);
        let parcel = directory.get("1234").unwrap();
        assert_eq!(parcel.id, "-44,-77");
        assert_eq!((parcel.x, parcel.y), (-44, -77));
        assert!(directory.get("0").is_none());
    }
}

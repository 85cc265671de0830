use filament_core::error::FilamentError;
use filament_core::record::Record;
use serde::{Deserialize, Serialize};

use crate::log::ChainLog;

/// Canonical serialized form of a chain log: the face value plus every
/// record in insertion order. Ids and signatures round-trip verbatim.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChainDump {
    pub value: u64,
    pub records: Vec<Record>,
}

impl ChainLog {
    pub fn to_dump(&self) -> ChainDump {
        ChainDump {
            value: self.value(),
            records: self.records().cloned().collect(),
        }
    }

    /// Restore a chain from a dump, revalidating every invariant: the dump
    /// must open with a well-formed system root and every subsequent record
    /// must pass the same checks `append` applies live.
    pub fn from_dump(dump: ChainDump) -> Result<Self, FilamentError> {
        let mut records = dump.records.into_iter();
        let root = records
            .next()
            .ok_or_else(|| FilamentError::InvalidRootData("dump has no records".into()))?;
        root.verify_basic()?;
        if !root.is_system_root() {
            return Err(FilamentError::InvalidRootData(format!(
                "first record {} is not a system root",
                root.id
            )));
        }

        let mut chain = ChainLog::from_parts(root, None, Vec::new(), dump.value);
        for record in records {
            chain.append(record)?;
        }
        Ok(chain)
    }

    pub fn to_json(&self) -> Result<String, FilamentError> {
        serde_json::to_string(&self.to_dump())
            .map_err(|e| FilamentError::Serialization(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, FilamentError> {
        let dump: ChainDump =
            serde_json::from_str(json).map_err(|e| FilamentError::Serialization(e.to_string()))?;
        Self::from_dump(dump)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filament_core::record::Payload;
    use filament_core::types::{Creator, DefinitionHash};
    use filament_crypto::KeyPair;

    fn transferred_chain() -> ChainLog {
        let u = KeyPair::generate();
        let v = KeyPair::generate();
        let mut chain = ChainLog::create(DefinitionHash([2u8; 32]), 5, 100, 0);
        chain.create_ownership(&u, 0).unwrap();
        let prev = chain.latest().id;
        let mut t = Record::new(
            Payload::Transfer {
                chain: chain.chain_id(),
                next_owner: v.public_key.clone(),
                prev_record: prev,
            },
            Some(prev),
            Creator::User(u.public_key.clone()),
            1,
        );
        u.sign_record(&mut t).unwrap();
        chain.append(t).unwrap();
        chain
    }

    #[test]
    fn json_round_trip_is_lossless() {
        let chain = transferred_chain();
        let json = chain.to_json().unwrap();
        let restored = ChainLog::from_json(&json).unwrap();
        assert_eq!(restored, chain);
        // Every id and signature survives verbatim.
        for (a, b) in chain.records().zip(restored.records()) {
            assert_eq!(a.id, b.id);
            assert_eq!(a.signature, b.signature);
        }
    }

    #[test]
    fn dump_without_root_is_rejected() {
        let err = ChainLog::from_dump(ChainDump {
            value: 1,
            records: vec![],
        })
        .unwrap_err();
        assert!(matches!(err, FilamentError::InvalidRootData(_)));
    }

    #[test]
    fn reordered_dump_is_rejected() {
        let chain = transferred_chain();
        let mut dump = chain.to_dump();
        dump.records.swap(1, 2);
        assert!(ChainLog::from_dump(dump).is_err());
    }

    #[test]
    fn tampered_record_in_dump_is_rejected() {
        let chain = transferred_chain();
        let mut dump = chain.to_dump();
        dump.records[2].tick += 1;
        assert!(ChainLog::from_dump(dump).is_err());
    }
}

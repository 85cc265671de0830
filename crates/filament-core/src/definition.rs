use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::canonical::CanonicalWriter;
use crate::error::FilamentError;
use crate::types::DefinitionHash;

// ── SerialRange ──────────────────────────────────────────────────────────────

/// An inclusive serial-number range mapping to a single face value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialRange {
    pub start: u64,
    pub end: u64,
    /// Face value of every chain in this range. Must be positive.
    pub value: u64,
}

impl SerialRange {
    pub fn contains(&self, serial: u64) -> bool {
        serial >= self.start && serial <= self.end
    }

    pub fn count(&self) -> u64 {
        self.end - self.start + 1
    }
}

// ── ChainDefinition ──────────────────────────────────────────────────────────

/// The textual document every chain batch is minted from: ordered,
/// non-overlapping serial ranges, each with a positive face value. The
/// definition hash seeds every root record, binding each chain to the
/// document that created it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub ranges: Vec<SerialRange>,
}

impl ChainDefinition {
    /// Parse and validate a UTF-8 JSON definition document.
    pub fn parse(text: &str) -> Result<Self, FilamentError> {
        let def: ChainDefinition = serde_json::from_str(text)
            .map_err(|e| FilamentError::MalformedDefinition(e.to_string()))?;
        def.validate()?;
        Ok(def)
    }

    /// Reject empty definitions, inverted ranges, non-positive values, and
    /// overlapping ranges.
    pub fn validate(&self) -> Result<(), FilamentError> {
        if self.ranges.is_empty() {
            return Err(FilamentError::EmptyDefinition);
        }
        for r in &self.ranges {
            if r.start > r.end {
                return Err(FilamentError::InvalidRange {
                    start: r.start,
                    end: r.end,
                });
            }
            if r.value == 0 {
                return Err(FilamentError::NonPositiveValue { start: r.start });
            }
        }
        let sorted = self.sorted_ranges();
        for pair in sorted.windows(2) {
            if pair[1].start <= pair[0].end {
                return Err(FilamentError::OverlappingRanges {
                    a_start: pair[0].start,
                    b_start: pair[1].start,
                });
            }
        }
        Ok(())
    }

    /// Ranges sorted ascending by start — the canonical ordering.
    pub fn sorted_ranges(&self) -> Vec<SerialRange> {
        let mut sorted = self.ranges.clone();
        sorted.sort_by_key(|r| r.start);
        sorted
    }

    /// Canonical bytes: description (empty if absent), range count, then
    /// each sorted range as (start, end, value) in fixed-width big-endian.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut w = CanonicalWriter::new();
        w.put_str(self.description.as_deref().unwrap_or(""));
        let sorted = self.sorted_ranges();
        w.put_u32(sorted.len() as u32);
        for r in &sorted {
            w.put_u64(r.start).put_u64(r.end).put_u64(r.value);
        }
        w.finish()
    }

    /// SHA-256 over the canonical form.
    pub fn hash(&self) -> DefinitionHash {
        let digest = Sha256::digest(self.canonical_bytes());
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&digest);
        DefinitionHash(arr)
    }

    /// Every serial number in the definition, ascending.
    pub fn serials(&self) -> impl Iterator<Item = u64> {
        self.sorted_ranges().into_iter().flat_map(|r| r.start..=r.end)
    }

    /// Face value for a serial, if covered.
    pub fn value_of(&self, serial: u64) -> Option<u64> {
        self.ranges.iter().find(|r| r.contains(serial)).map(|r| r.value)
    }

    /// Total number of chains this definition provisions.
    pub fn total_units(&self) -> u64 {
        self.ranges.iter().map(SerialRange::count).sum()
    }
}

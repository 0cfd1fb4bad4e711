//! Explicit state capture for save states.
//!
//! Every component that survives a save/load implements [`Stateful`] and
//! writes its fields into a flat [`StateMap`]. Nested components are merged
//! under a `"prefix."` scope so keys stay unique across the machine.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::EmuError;

/// Ordered name → value map. `BTreeMap` keeps the serialized payload
/// deterministic, which the checksum relies on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateMap {
    entries: BTreeMap<String, Value>,
}

impl StateMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a field. Anything `serde_json` can represent infallibly goes
    /// in through `Into<Value>` (integers, bools, strings, byte slices).
    pub fn put(&mut self, key: &str, value: impl Into<Value>) {
        self.entries.insert(key.to_string(), value.into());
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T, EmuError> {
        let value = self
            .entries
            .get(key)
            .ok_or_else(|| EmuError::State(format!("missing state field `{key}`")))?;
        T::deserialize(value)
            .map_err(|e| EmuError::State(format!("state field `{key}`: {e}")))
    }

    /// Copy a stored byte array into a fixed-size buffer. The stored length
    /// must match exactly.
    pub fn get_bytes_into(&self, key: &str, target: &mut [u8]) -> Result<(), EmuError> {
        let bytes: Vec<u8> = self.get(key)?;
        if bytes.len() != target.len() {
            return Err(EmuError::State(format!(
                "state field `{key}` holds {} bytes, expected {}",
                bytes.len(),
                target.len()
            )));
        }
        target.copy_from_slice(&bytes);
        Ok(())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Merge `child` under `prefix.`.
    pub fn insert_scope(&mut self, prefix: &str, child: StateMap) {
        for (key, value) in child.entries {
            self.entries.insert(format!("{prefix}.{key}"), value);
        }
    }

    /// Extract every field stored under `prefix.`, with the prefix removed.
    pub fn scope(&self, prefix: &str) -> StateMap {
        let lead = format!("{prefix}.");
        let entries = self
            .entries
            .range(lead.clone()..)
            .take_while(|(key, _)| key.starts_with(&lead))
            .map(|(key, value)| (key[lead.len()..].to_string(), value.clone()))
            .collect();
        StateMap { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

/// A component whose state can be written to and restored from a
/// [`StateMap`]. ROM contents never go into the map.
pub trait Stateful {
    fn capture_state(&self) -> StateMap;

    fn restore_state(&mut self, state: &StateMap) -> Result<(), EmuError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_roundtrip() {
        let mut map = StateMap::new();
        map.put("scanline", 123u16);
        map.put("latched", true);
        map.put("vram", &[1u8, 2, 3][..]);

        assert_eq!(map.get::<u16>("scanline").unwrap(), 123);
        assert!(map.get::<bool>("latched").unwrap());
        assert_eq!(map.get::<Vec<u8>>("vram").unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_missing_field_is_state_error() {
        let map = StateMap::new();
        let err = map.get::<u8>("nope").unwrap_err();
        assert!(matches!(err, EmuError::State(ref msg) if msg.contains("nope")));
    }

    #[test]
    fn test_wrong_type_is_state_error() {
        let mut map = StateMap::new();
        map.put("flag", "yes");
        assert!(matches!(map.get::<u8>("flag"), Err(EmuError::State(_))));
    }

    #[test]
    fn test_bytes_length_checked() {
        let mut map = StateMap::new();
        map.put("ram", vec![0xAAu8; 4]);

        let mut exact = [0u8; 4];
        map.get_bytes_into("ram", &mut exact).unwrap();
        assert_eq!(exact, [0xAA; 4]);

        let mut short = [0u8; 2];
        assert!(map.get_bytes_into("ram", &mut short).is_err());
        assert_eq!(short, [0, 0]);
    }

    #[test]
    fn test_scoping() {
        let mut vdp = StateMap::new();
        vdp.put("status", 0x80u8);
        vdp.put("address", 0x3FFFu16);

        let mut machine = StateMap::new();
        machine.put("model", "sms");
        machine.insert_scope("vdp", vdp.clone());
        machine.insert_scope("vdpx", StateMap::new());

        assert!(machine.contains("vdp.status"));
        assert_eq!(machine.scope("vdp"), vdp);
        assert!(machine.scope("psg").is_empty());
    }

    #[test]
    fn test_keys_are_sorted() {
        let mut map = StateMap::new();
        map.put("b", 1u8);
        map.put("a", 2u8);
        map.put("c", 3u8);
        let keys: Vec<&str> = map.keys().collect();
        assert_eq!(keys, ["a", "b", "c"]);
    }
}

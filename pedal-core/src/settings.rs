//! Persistence adapter: a small key-value store for channel settings.
//!
//! Values are encoded with `postcard`. [`MemorySettings`] keeps the whole
//! table in RAM and can itself be encoded into one image, which is how the
//! firmware stores it in a flash sector.

use heapless::{String, Vec};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use pedal_proto::Role;

/// Longest accepted key.
pub const KEY_CAPACITY: usize = 24;
/// Largest encoded value.
pub const VALUE_CAPACITY: usize = 40;
/// Most distinct keys the table holds.
pub const MAX_ENTRIES: usize = 32;
/// Upper bound of an encoded [`MemorySettings`] image.
pub const SETTINGS_IMAGE_SIZE: usize = MAX_ENTRIES * (KEY_CAPACITY + VALUE_CAPACITY + 2) + 1;

/// Error type for settings storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PersistenceError {
    /// No room for another key.
    Full,
    KeyTooLong,
    ValueTooLarge,
    /// Value could not be encoded.
    Encode,
    /// Stored bytes do not decode.
    Corrupt,
    /// Backing medium failed.
    Io,
}

/// Byte-level key-value storage with typed helpers.
pub trait SettingsStore {
    /// Raw bytes stored under `key`, if any.
    fn read(&self, key: &str) -> Option<&[u8]>;

    /// Store `value` under `key`, replacing any previous value.
    fn write(&mut self, key: &str, value: &[u8]) -> Result<(), PersistenceError>;

    /// Remove every key.
    fn clear(&mut self) -> Result<(), PersistenceError>;

    /// Decode the value under `key`; `Ok(None)` when absent.
    fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, PersistenceError> {
        match self.read(key) {
            None => Ok(None),
            Some(bytes) => postcard::from_bytes(bytes)
                .map(Some)
                .map_err(|_| PersistenceError::Corrupt),
        }
    }

    /// Encode `value` and store it under `key`.
    fn store<T: Serialize>(&mut self, key: &str, value: &T) -> Result<(), PersistenceError> {
        let mut buf = [0u8; VALUE_CAPACITY];
        let used = postcard::to_slice(value, &mut buf).map_err(|e| match e {
            postcard::Error::SerializeBufferFull => PersistenceError::ValueTooLarge,
            _ => PersistenceError::Encode,
        })?;
        self.write(key, used)
    }
}

/// Process-wide keys.
pub mod keys {
    /// Set once defaults have been written.
    pub const INIT_FLAG: &str = "init_flag";
    /// Inversion flags for all roles, `[bool; 3]`.
    pub const INVERTED_MAP: &str = "pedal_inverted_map";
    /// Smoothing flags for all roles, `[bool; 3]`.
    pub const SMOOTH_MAP: &str = "pedal_smooth_map";
}

macro_rules! role_key {
    ($role:expr, $suffix:literal) => {
        match $role {
            Role::Throttle => concat!("throttle_", $suffix),
            Role::Brake => concat!("brake_", $suffix),
            Role::Clutch => concat!("clutch_", $suffix),
        }
    };
}

/// Per-channel keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChannelKey {
    OutputMap,
    Calibration,
    Bits,
    Input,
    On,
    Inverted,
    Smooth,
}

impl ChannelKey {
    /// Key string for `role`, e.g. `brake_calibration`.
    #[must_use]
    pub const fn for_role(self, role: Role) -> &'static str {
        match self {
            ChannelKey::OutputMap => role_key!(role, "output_map"),
            ChannelKey::Calibration => role_key!(role, "calibration"),
            ChannelKey::Bits => role_key!(role, "bits"),
            ChannelKey::Input => role_key!(role, "input"),
            ChannelKey::On => role_key!(role, "on"),
            ChannelKey::Inverted => role_key!(role, "inverted"),
            ChannelKey::Smooth => role_key!(role, "smooth"),
        }
    }
}

/// Decode `key`, falling back to `default` when it is absent or unreadable.
pub fn load_or<S, T>(store: &S, key: &str, default: T) -> T
where
    S: SettingsStore,
    T: DeserializeOwned,
{
    match store.load(key) {
        Ok(Some(value)) => value,
        Ok(None) => default,
        Err(e) => {
            warn!("setting {} unreadable ({:?}), using default", key, e);
            default
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Entry {
    key: String<KEY_CAPACITY>,
    value: Vec<u8, VALUE_CAPACITY>,
}

/// Fixed-capacity settings table held in RAM.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemorySettings {
    entries: Vec<Entry, MAX_ENTRIES>,
}

impl MemorySettings {
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Encode the whole table into `buf`, returning the used prefix.
    pub fn to_image<'a>(&self, buf: &'a mut [u8]) -> Result<&'a mut [u8], PersistenceError> {
        postcard::to_slice(self, buf).map_err(|_| PersistenceError::Encode)
    }

    /// Decode a table previously written by [`MemorySettings::to_image`].
    pub fn from_image(bytes: &[u8]) -> Result<Self, PersistenceError> {
        postcard::from_bytes(bytes).map_err(|_| PersistenceError::Corrupt)
    }
}

impl SettingsStore for MemorySettings {
    fn read(&self, key: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|e| e.key.as_str() == key)
            .map(|e| e.value.as_slice())
    }

    fn write(&mut self, key: &str, value: &[u8]) -> Result<(), PersistenceError> {
        let value = Vec::from_slice(value).map_err(|_| PersistenceError::ValueTooLarge)?;
        if let Some(entry) = self.entries.iter_mut().find(|e| e.key.as_str() == key) {
            entry.value = value;
            return Ok(());
        }
        let key = String::try_from(key).map_err(|_| PersistenceError::KeyTooLong)?;
        self.entries
            .push(Entry { key, value })
            .map_err(|_| PersistenceError::Full)
    }

    fn clear(&mut self) -> Result<(), PersistenceError> {
        self.entries.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    extern crate std;
    use std::format;

    use super::*;
    use pedal_proto::{BitDepths, CalibrationQuad, CurveTable};

    #[test]
    fn test_typed_round_trip() {
        let mut store = MemorySettings::new();
        let curve = CurveTable::new([0, 10, 20, 30, 40, 100]).unwrap();
        store.store("throttle_output_map", &curve).unwrap();
        store.store(keys::INIT_FLAG, &true).unwrap();

        assert_eq!(store.load::<CurveTable>("throttle_output_map"), Ok(Some(curve)));
        assert_eq!(store.load::<bool>(keys::INIT_FLAG), Ok(Some(true)));
        assert_eq!(store.load::<bool>("missing"), Ok(None));
    }

    #[test]
    fn test_overwrite_keeps_one_entry() {
        let mut store = MemorySettings::new();
        store.store("brake_on", &false).unwrap();
        store.store("brake_on", &true).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.load::<bool>("brake_on"), Ok(Some(true)));
    }

    #[test]
    fn test_largest_values_fit() {
        let mut store = MemorySettings::new();
        let wide = CalibrationQuad::full_scale(16_777_215);
        store.store("clutch_calibration", &wide).unwrap();
        let curve = CurveTable::new([100; 6]).unwrap();
        store.store("clutch_output_map", &curve).unwrap();
        store
            .store("clutch_bits", &BitDepths::new(16_777_215, 16_777_215).unwrap())
            .unwrap();
    }

    #[test]
    fn test_limits() {
        let mut store = MemorySettings::new();
        assert_eq!(
            store.write("a_key_that_is_far_too_long_to_fit", &[1]),
            Err(PersistenceError::KeyTooLong)
        );
        assert_eq!(
            store.write("big", &[0u8; VALUE_CAPACITY + 1]),
            Err(PersistenceError::ValueTooLarge)
        );
        for i in 0..MAX_ENTRIES {
            store.write(&format!("k{}", i), &[0]).unwrap();
        }
        assert_eq!(store.write("one_more", &[0]), Err(PersistenceError::Full));
    }

    #[test]
    fn test_corrupt_value_is_reported_and_defaulted() {
        let mut store = MemorySettings::new();
        store.write("throttle_bits", &[0xFF]).unwrap();
        assert_eq!(
            store.load::<BitDepths>("throttle_bits"),
            Err(PersistenceError::Corrupt)
        );
        assert_eq!(
            load_or(&store, "throttle_bits", BitDepths::DEFAULT),
            BitDepths::DEFAULT
        );
    }

    #[test]
    fn test_image_round_trip() {
        let mut store = MemorySettings::new();
        for role in Role::ALL {
            store
                .store(ChannelKey::Calibration.for_role(role), &CalibrationQuad::full_scale(1023))
                .unwrap();
            store.store(ChannelKey::On.for_role(role), &true).unwrap();
        }
        let mut buf = [0u8; SETTINGS_IMAGE_SIZE];
        let image = store.to_image(&mut buf).unwrap();
        let restored = MemorySettings::from_image(image).unwrap();
        assert_eq!(restored, store);
    }

    #[test]
    fn test_channel_keys() {
        assert_eq!(ChannelKey::OutputMap.for_role(Role::Throttle), "throttle_output_map");
        assert_eq!(ChannelKey::Calibration.for_role(Role::Clutch), "clutch_calibration");
        assert_eq!(ChannelKey::Smooth.for_role(Role::Brake), "brake_smooth");
        for role in Role::ALL {
            for key in [
                ChannelKey::OutputMap,
                ChannelKey::Calibration,
                ChannelKey::Bits,
                ChannelKey::Input,
                ChannelKey::On,
                ChannelKey::Inverted,
                ChannelKey::Smooth,
            ] {
                assert!(key.for_role(role).len() <= KEY_CAPACITY);
            }
        }
    }
}

//! Numbered save-state slots.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use crate::logging::{log, LogCategory, LogLevel};
use crate::EmuError;

/// Storage for numbered save-state blobs.
pub trait SlotStore: Send {
    fn read_slot(&mut self, slot: u32) -> Result<Vec<u8>, EmuError>;

    fn write_slot(&mut self, slot: u32, blob: &[u8]) -> Result<(), EmuError>;
}

/// One file per slot: `<dir>/<name>.s<slot>.state`.
#[derive(Debug, Clone)]
pub struct DirectorySlotStore {
    directory: PathBuf,
    base_name: String,
}

impl DirectorySlotStore {
    pub fn new(directory: impl Into<PathBuf>, base_name: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            base_name: base_name.into(),
        }
    }

    /// Slot store named after a ROM file, placed in `directory` or next to
    /// the ROM when no directory is given.
    pub fn for_rom(rom_path: &Path, directory: Option<&Path>) -> Self {
        let base_name = rom_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "untitled".to_string());
        let directory = directory
            .map(Path::to_path_buf)
            .or_else(|| rom_path.parent().map(Path::to_path_buf))
            .unwrap_or_default();
        Self::new(directory, base_name)
    }

    pub fn slot_path(&self, slot: u32) -> PathBuf {
        self.directory
            .join(format!("{}.s{}.state", self.base_name, slot))
    }
}

impl SlotStore for DirectorySlotStore {
    fn read_slot(&mut self, slot: u32) -> Result<Vec<u8>, EmuError> {
        let path = self.slot_path(slot);
        log(LogCategory::SaveState, LogLevel::Debug, || {
            format!("reading slot {slot} from {}", path.display())
        });
        Ok(fs::read(path)?)
    }

    fn write_slot(&mut self, slot: u32, blob: &[u8]) -> Result<(), EmuError> {
        if !self.directory.as_os_str().is_empty() {
            fs::create_dir_all(&self.directory)?;
        }
        let path = self.slot_path(slot);
        log(LogCategory::SaveState, LogLevel::Debug, || {
            format!("writing {} bytes to slot {slot} at {}", blob.len(), path.display())
        });
        fs::write(path, blob)?;
        Ok(())
    }
}

/// In-memory slots. Clones share the same storage, so a test can keep a
/// handle while the scheduler owns another.
#[derive(Debug, Clone, Default)]
pub struct MemorySlotStore {
    slots: Arc<Mutex<HashMap<u32, Vec<u8>>>>,
}

impl MemorySlotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, slot: u32) -> Option<Vec<u8>> {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&slot)
            .cloned()
    }

    pub fn insert(&self, slot: u32, blob: Vec<u8>) {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(slot, blob);
    }
}

impl SlotStore for MemorySlotStore {
    fn read_slot(&mut self, slot: u32) -> Result<Vec<u8>, EmuError> {
        self.get(slot).ok_or_else(|| {
            EmuError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("slot {slot} is empty"),
            ))
        })
    }

    fn write_slot(&mut self, slot: u32, blob: &[u8]) -> Result<(), EmuError> {
        self.insert(slot, blob.to_vec());
        Ok(())
    }
}

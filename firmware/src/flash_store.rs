//! Settings table persisted in the last flash sector.
//!
//! Layout: `PDL1`, the image length as a little-endian `u32`, then the
//! [`MemorySettings`] image. An erased or foreign sector loads as empty,
//! which the bank treats as a first boot.

use defmt::{info, warn};
use embassy_rp::flash::{Blocking, Flash, ERASE_SIZE, PAGE_SIZE};
use embassy_rp::peripherals::FLASH;
use pedal_core::settings::SETTINGS_IMAGE_SIZE;
use pedal_core::{MemorySettings, PersistenceError, SettingsStore};

/// Pico flash size.
pub const FLASH_SIZE: usize = 2 * 1024 * 1024;

/// Offset of the settings sector from the start of flash.
pub const SETTINGS_OFFSET: u32 = (FLASH_SIZE - ERASE_SIZE) as u32;

const MAGIC: [u8; 4] = *b"PDL1";
const HEADER_SIZE: usize = 8;
const BUFFER_SIZE: usize = (HEADER_SIZE + SETTINGS_IMAGE_SIZE).next_multiple_of(PAGE_SIZE);

const _: () = assert!(BUFFER_SIZE <= ERASE_SIZE);

pub type SettingsFlash = Flash<'static, FLASH, Blocking, FLASH_SIZE>;

/// [`MemorySettings`] with write-back to flash.
///
/// Writes only touch RAM; [`FlashSettings::commit`] writes the sector.
pub struct FlashSettings {
    flash: SettingsFlash,
    table: MemorySettings,
    dirty: bool,
}

impl FlashSettings {
    /// Load the table from flash, or start empty.
    pub fn open(mut flash: SettingsFlash) -> Self {
        let table = match read_table(&mut flash) {
            Ok(Some(table)) => {
                info!("settings loaded, {} keys", table.len());
                table
            }
            Ok(None) => {
                info!("settings sector empty");
                MemorySettings::new()
            }
            Err(e) => {
                warn!("settings sector unreadable: {:?}", e);
                MemorySettings::new()
            }
        };
        Self {
            flash,
            table,
            dirty: false,
        }
    }

    /// Rewrite the sector if anything changed since the last commit.
    pub fn commit(&mut self) -> Result<(), PersistenceError> {
        if !self.dirty {
            return Ok(());
        }

        let mut buf = [0xFFu8; BUFFER_SIZE];
        let used = self.table.to_image(&mut buf[HEADER_SIZE..])?.len();
        buf[..4].copy_from_slice(&MAGIC);
        buf[4..HEADER_SIZE].copy_from_slice(&(used as u32).to_le_bytes());
        let len = (HEADER_SIZE + used).next_multiple_of(PAGE_SIZE);

        self.flash
            .blocking_erase(SETTINGS_OFFSET, SETTINGS_OFFSET + ERASE_SIZE as u32)
            .map_err(|_| PersistenceError::Io)?;
        self.flash
            .blocking_write(SETTINGS_OFFSET, &buf[..len])
            .map_err(|_| PersistenceError::Io)?;

        self.dirty = false;
        info!("settings saved, {} bytes", used);
        Ok(())
    }
}

fn read_table(flash: &mut SettingsFlash) -> Result<Option<MemorySettings>, PersistenceError> {
    let mut header = [0u8; HEADER_SIZE];
    flash
        .blocking_read(SETTINGS_OFFSET, &mut header)
        .map_err(|_| PersistenceError::Io)?;
    if header[..4] != MAGIC {
        return Ok(None);
    }

    let len = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;
    if len > SETTINGS_IMAGE_SIZE {
        return Err(PersistenceError::Corrupt);
    }
    let mut image = [0u8; SETTINGS_IMAGE_SIZE];
    flash
        .blocking_read(SETTINGS_OFFSET + HEADER_SIZE as u32, &mut image[..len])
        .map_err(|_| PersistenceError::Io)?;
    MemorySettings::from_image(&image[..len]).map(Some)
}

impl SettingsStore for FlashSettings {
    fn read(&self, key: &str) -> Option<&[u8]> {
        self.table.read(key)
    }

    fn write(&mut self, key: &str, value: &[u8]) -> Result<(), PersistenceError> {
        if self.table.read(key) == Some(value) {
            return Ok(());
        }
        self.table.write(key, value)?;
        self.dirty = true;
        Ok(())
    }

    fn clear(&mut self) -> Result<(), PersistenceError> {
        self.table.clear()?;
        self.dirty = true;
        Ok(())
    }
}

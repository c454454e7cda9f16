//! Save slots for the modification log.
//!
//! A slot file holds the ordered log as length-prefixed, checksummed
//! MessagePack frames:
//!
//! ```text
//! magic "TSL\0" | version u8 | record count u64
//! repeated: len u32 | MessagePack(StateModificationRecord) | crc32 u32
//! ```
//!
//! All integers are little-endian. Writes go to a temporary file that is
//! renamed over the slot, so a crash mid-save leaves the previous slot intact.

use crate::error::{Result, StateError};
use crate::types::StateModificationRecord;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Magic bytes for slot files.
const SLOT_MAGIC: &[u8; 4] = b"TSL\0";

/// Current slot format version.
const SLOT_VERSION: u8 = 1;

/// Upper bound for a single encoded record.
const MAX_RECORD_BYTES: usize = 64 * 1024 * 1024;

/// A named save slot inside a directory.
#[derive(Clone, Debug)]
pub struct SaveSlot {
    dir: PathBuf,
    name: String,
}

impl SaveSlot {
    /// Create a slot handle. The name becomes a file stem, so it must be
    /// non-empty and free of path separators.
    pub fn new(dir: impl AsRef<Path>, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(StateError::Config(format!("invalid slot name: {:?}", name)));
        }
        Ok(Self {
            dir: dir.as_ref().to_path_buf(),
            name,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path of the slot file.
    pub fn path(&self) -> PathBuf {
        self.dir.join(format!("{}.slot", self.name))
    }

    fn temp_path(&self) -> PathBuf {
        self.dir.join(format!("{}.slot.tmp", self.name))
    }

    fn lock_path(&self) -> PathBuf {
        self.dir.join(format!("{}.lock", self.name))
    }

    pub fn exists(&self) -> bool {
        self.path().exists()
    }

    /// Write `records` (in order), replacing any previous contents.
    pub fn save(&self, records: &[StateModificationRecord]) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let _lock = self.acquire_lock()?;

        let temp = self.temp_path();
        {
            let file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&temp)?;
            let mut writer = BufWriter::new(file);

            writer.write_all(SLOT_MAGIC)?;
            writer.write_all(&[SLOT_VERSION])?;
            writer.write_all(&(records.len() as u64).to_le_bytes())?;
            for record in records {
                Self::write_record(&mut writer, record)?;
            }

            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&temp, self.path())?;

        info!(slot = %self.name, records = records.len(), "Saved modification log");
        Ok(())
    }

    /// Read the slot. Returns `None` if it has never been written.
    pub fn load(&self) -> Result<Option<Vec<StateModificationRecord>>> {
        let path = self.path();
        if !path.exists() {
            debug!(slot = %self.name, "Save slot does not exist");
            return Ok(None);
        }
        let _lock = self.acquire_lock()?;

        let mut reader = BufReader::new(File::open(&path)?);

        let mut magic = [0u8; 4];
        read_exact(&mut reader, &mut magic)?;
        if &magic != SLOT_MAGIC {
            return Err(StateError::InvalidFormat("Invalid slot magic".into()));
        }

        let mut version = [0u8; 1];
        read_exact(&mut reader, &mut version)?;
        if version[0] != SLOT_VERSION {
            return Err(StateError::InvalidFormat(format!(
                "Unsupported slot version: {}",
                version[0]
            )));
        }

        let mut count_bytes = [0u8; 8];
        read_exact(&mut reader, &mut count_bytes)?;
        let count = u64::from_le_bytes(count_bytes);

        let mut records = Vec::new();
        for _ in 0..count {
            records.push(Self::read_record(&mut reader)?);
        }

        info!(slot = %self.name, records = records.len(), "Loaded modification log");
        Ok(Some(records))
    }

    /// Remove the slot file. Returns false if there was nothing to remove.
    pub fn delete(&self) -> Result<bool> {
        let path = self.path();
        if !path.exists() {
            return Ok(false);
        }
        let _lock = self.acquire_lock()?;
        fs::remove_file(path)?;
        Ok(true)
    }

    fn acquire_lock(&self) -> Result<File> {
        fs::create_dir_all(&self.dir)?;
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.lock_path())?;

        lock_file.try_lock_exclusive().map_err(|_| StateError::Locked)?;

        Ok(lock_file)
    }

    fn write_record(writer: &mut impl Write, record: &StateModificationRecord) -> Result<()> {
        let encoded = rmp_serde::to_vec(record)?;
        if encoded.len() > MAX_RECORD_BYTES {
            return Err(StateError::Serialization(format!(
                "record {} too large ({} bytes)",
                record.record_id,
                encoded.len()
            )));
        }

        writer.write_all(&(encoded.len() as u32).to_le_bytes())?;
        writer.write_all(&encoded)?;
        writer.write_all(&crc32fast::hash(&encoded).to_le_bytes())?;
        Ok(())
    }

    fn read_record(reader: &mut impl Read) -> Result<StateModificationRecord> {
        let mut len_bytes = [0u8; 4];
        read_exact(reader, &mut len_bytes)?;
        let len = u32::from_le_bytes(len_bytes) as usize;

        if len > MAX_RECORD_BYTES {
            return Err(StateError::Corruption("Slot record too large".into()));
        }

        let mut encoded = vec![0u8; len];
        read_exact(reader, &mut encoded)?;

        let mut checksum_bytes = [0u8; 4];
        read_exact(reader, &mut checksum_bytes)?;
        let stored = u32::from_le_bytes(checksum_bytes);

        let computed = crc32fast::hash(&encoded);
        if stored != computed {
            return Err(StateError::ChecksumMismatch {
                expected: stored,
                got: computed,
            });
        }

        Ok(rmp_serde::from_slice(&encoded)?)
    }
}

/// `read_exact` that reports a short file as corruption.
fn read_exact(reader: &mut impl Read, buf: &mut [u8]) -> Result<()> {
    reader.read_exact(buf).map_err(|e| {
        if e.kind() == ErrorKind::UnexpectedEof {
            StateError::Corruption("Save slot is truncated".into())
        } else {
            StateError::Io(e)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Operation;
    use crate::values::{ItemList, Vector};
    use tempfile::TempDir;

    fn sample_records() -> Vec<StateModificationRecord> {
        vec![
            StateModificationRecord::new(
                Operation::new("Source.Lever", "Door").with_modification("State.Open", true),
            ),
            StateModificationRecord::new(
                Operation::new("Source.Quest", "Npc")
                    .with_modification("Interactions", ItemList::new().with_item(3i64))
                    .with_modification("Spawn", Vector::new(1.0, 2.0, 3.0)),
            ),
        ]
    }

    #[test]
    fn test_save_load() {
        let dir = TempDir::new().unwrap();
        let slot = SaveSlot::new(dir.path(), "main").unwrap();
        assert!(slot.load().unwrap().is_none());

        let records = sample_records();
        slot.save(&records).unwrap();
        assert!(slot.exists());
        assert_eq!(slot.load().unwrap(), Some(records));
    }

    #[test]
    fn test_save_overwrites() {
        let dir = TempDir::new().unwrap();
        let slot = SaveSlot::new(dir.path(), "main").unwrap();
        slot.save(&sample_records()).unwrap();
        slot.save(&[]).unwrap();
        assert_eq!(slot.load().unwrap(), Some(Vec::new()));
        assert!(!slot.temp_path().exists());
    }

    #[test]
    fn test_invalid_names() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(SaveSlot::new(dir.path(), ""), Err(StateError::Config(_))));
        assert!(matches!(SaveSlot::new(dir.path(), "a/b"), Err(StateError::Config(_))));
        assert!(matches!(SaveSlot::new(dir.path(), ".."), Err(StateError::Config(_))));
    }

    #[test]
    fn test_bad_magic() {
        let dir = TempDir::new().unwrap();
        let slot = SaveSlot::new(dir.path(), "main").unwrap();
        fs::write(slot.path(), b"NOPE\x01").unwrap();
        assert!(matches!(slot.load(), Err(StateError::InvalidFormat(_))));
    }

    #[test]
    fn test_checksum_mismatch() {
        let dir = TempDir::new().unwrap();
        let slot = SaveSlot::new(dir.path(), "main").unwrap();
        slot.save(&sample_records()).unwrap();

        let mut bytes = fs::read(slot.path()).unwrap();
        // First payload byte: header (13) + length prefix (4)
        bytes[17] ^= 0xFF;
        fs::write(slot.path(), &bytes).unwrap();

        assert!(matches!(slot.load(), Err(StateError::ChecksumMismatch { .. })));
    }

    #[test]
    fn test_truncated() {
        let dir = TempDir::new().unwrap();
        let slot = SaveSlot::new(dir.path(), "main").unwrap();
        slot.save(&sample_records()).unwrap();

        let bytes = fs::read(slot.path()).unwrap();
        fs::write(slot.path(), &bytes[..bytes.len() - 3]).unwrap();
        assert!(matches!(slot.load(), Err(StateError::Corruption(_))));
    }

    #[test]
    fn test_delete() {
        let dir = TempDir::new().unwrap();
        let slot = SaveSlot::new(dir.path(), "main").unwrap();
        assert!(!slot.delete().unwrap());
        slot.save(&sample_records()).unwrap();
        assert!(slot.delete().unwrap());
        assert!(!slot.exists());
    }
}

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::chunk::ChunkRecord;

/// Errors turning a [`ChunkRecord`] into a storage blob and back
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to encode chunk record: {0}")]
    Encode(String),

    #[error("failed to decompress chunk blob: {0}")]
    Decompress(#[from] lz4_flex::block::DecompressError),

    #[error("failed to decode chunk record: {0}")]
    Decode(String),
}

/// Bincode-encode and LZ4-compress a chunk record
pub fn encode_chunk(record: &ChunkRecord) -> Result<Vec<u8>, CodecError> {
    let serialized = bincode_next::serde::encode_to_vec(record, bincode_next::config::standard())
        .map_err(|e| CodecError::Encode(format!("{e:?}")))?;
    Ok(lz4_flex::compress_prepend_size(&serialized))
}

/// Inverse of [`encode_chunk`]
pub fn decode_chunk(blob: &[u8]) -> Result<ChunkRecord, CodecError> {
    let serialized = lz4_flex::decompress_size_prepended(blob)?;
    let (record, _): (ChunkRecord, _) =
        bincode_next::serde::decode_from_slice(&serialized, bincode_next::config::standard())
            .map_err(|e| CodecError::Decode(format!("{e:?}")))?;
    Ok(record)
}

/// Persistent blob store for chunks
///
/// Failures are reported, never fatal: a failed load falls back to generation
/// and a failed save leaves the chunk dirty for a later retry.
pub trait ChunkStorage {
    /// Stored blob for a chunk, or `None` if the chunk was never saved
    fn load_chunk(&self, world_id: &str, chunk_x: i32, chunk_y: i32) -> Result<Option<Vec<u8>>>;

    fn save_chunk(&mut self, world_id: &str, chunk_x: i32, chunk_y: i32, blob: &[u8])
    -> Result<()>;
}

/// In-memory storage, for tests and ephemeral worlds
#[derive(Debug, Default, Clone)]
pub struct MemoryChunkStorage {
    blobs: HashMap<(String, i32, i32), Vec<u8>>,
}

impl MemoryChunkStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    pub fn contains(&self, world_id: &str, chunk_x: i32, chunk_y: i32) -> bool {
        self.blobs
            .contains_key(&(world_id.to_string(), chunk_x, chunk_y))
    }
}

impl ChunkStorage for MemoryChunkStorage {
    fn load_chunk(&self, world_id: &str, chunk_x: i32, chunk_y: i32) -> Result<Option<Vec<u8>>> {
        Ok(self
            .blobs
            .get(&(world_id.to_string(), chunk_x, chunk_y))
            .cloned())
    }

    fn save_chunk(
        &mut self,
        world_id: &str,
        chunk_x: i32,
        chunk_y: i32,
        blob: &[u8],
    ) -> Result<()> {
        self.blobs
            .insert((world_id.to_string(), chunk_x, chunk_y), blob.to_vec());
        Ok(())
    }
}

/// Storage under `<root>/<world_id>/chunks/chunk_<x>_<y>.bin`
#[derive(Debug, Clone)]
pub struct FileChunkStorage {
    root: PathBuf,
}

impl FileChunkStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn world_dir(&self, world_id: &str) -> PathBuf {
        self.root.join(world_id)
    }

    fn chunk_path(&self, world_id: &str, x: i32, y: i32) -> PathBuf {
        self.world_dir(world_id)
            .join("chunks")
            .join(format!("chunk_{}_{}.bin", x, y))
    }

    /// Save world metadata (RON) to `world.meta`
    pub fn save_metadata(&self, world_id: &str, meta: &WorldMetadata) -> Result<()> {
        let dir = self.world_dir(world_id);
        std::fs::create_dir_all(&dir).context("Failed to create world directory")?;
        let serialized = ron::ser::to_string_pretty(meta, Default::default())
            .context("Failed to serialize metadata")?;
        std::fs::write(dir.join("world.meta"), serialized)
            .context("Failed to write metadata file")?;
        Ok(())
    }

    /// Load world metadata, or `None` for a new world
    pub fn load_metadata(&self, world_id: &str) -> Result<Option<WorldMetadata>> {
        let path = self.world_dir(world_id).join("world.meta");
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path).context("Failed to read metadata file")?;
        let meta = ron::from_str(&contents).context("Failed to parse metadata")?;
        Ok(Some(meta))
    }

    /// Delete all chunks and metadata of a world
    pub fn delete_world(&self, world_id: &str) -> Result<()> {
        let dir = self.world_dir(world_id);
        if dir.exists() {
            std::fs::remove_dir_all(&dir).context("Failed to delete world directory")?;
            log::info!("Deleted world: {}", world_id);
        }
        Ok(())
    }
}

impl ChunkStorage for FileChunkStorage {
    fn load_chunk(&self, world_id: &str, chunk_x: i32, chunk_y: i32) -> Result<Option<Vec<u8>>> {
        let path = self.chunk_path(world_id, chunk_x, chunk_y);
        if !path.exists() {
            return Ok(None);
        }
        let blob = std::fs::read(&path)
            .with_context(|| format!("Failed to read chunk file {}", path.display()))?;
        log::debug!("[LOAD] Read {} bytes from {:?}", blob.len(), path);
        Ok(Some(blob))
    }

    fn save_chunk(
        &mut self,
        world_id: &str,
        chunk_x: i32,
        chunk_y: i32,
        blob: &[u8],
    ) -> Result<()> {
        let path = self.chunk_path(world_id, chunk_x, chunk_y);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create chunk directory")?;
        }

        // Atomic write: write to temp file, then rename
        let temp_path = path.with_extension("tmp");
        std::fs::write(&temp_path, blob).context("Failed to write chunk temp file")?;
        std::fs::rename(&temp_path, &path).context("Failed to rename chunk file")?;

        log::debug!(
            "[SAVE] Chunk ({}, {}) written ({} bytes compressed)",
            chunk_x,
            chunk_y,
            blob.len()
        );
        Ok(())
    }
}

/// World metadata stored in world.meta file (RON format)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldMetadata {
    pub version: u32,
    pub world_id: String,
    pub seed: u64,
    /// Name of the world config the world was created with
    pub config_name: String,
    pub created_at: String,
    pub last_played: String,
    #[serde(default)]
    pub play_time_seconds: u64,
}

impl WorldMetadata {
    pub fn new(world_id: impl Into<String>, seed: u64, config_name: impl Into<String>) -> Self {
        let now = chrono::Local::now().to_rfc3339();
        Self {
            version: 1,
            world_id: world_id.into(),
            seed,
            config_name: config_name.into(),
            created_at: now.clone(),
            last_played: now,
            play_time_seconds: 0,
        }
    }

    /// Stamp `last_played` and add a session's play time
    pub fn touch(&mut self, session_seconds: u64) {
        self.last_played = chrono::Local::now().to_rfc3339();
        self.play_time_seconds = self.play_time_seconds.saturating_add(session_seconds);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::decorations::DecorationStore;
    use crate::world::generation::WorldGenerator;
    use crate::world::structures::{StructureRecord, StructureState};
    use glam::IVec2;

    fn sample_record() -> ChunkRecord {
        let generator = WorldGenerator::new(11);
        let tiles = generator.generate_chunk_tiles(IVec2::new(16, 0), 16, &DecorationStore::new());
        ChunkRecord {
            chunk_x: 1,
            chunk_y: 0,
            tiles: tiles.iter().map(|t| t.to_record()).collect(),
            structures: vec![StructureRecord {
                template_id: "house".into(),
                origin_x: 18,
                origin_y: 4,
                state: StructureState {
                    door_open: true,
                    light_on: false,
                    smoke_active: true,
                },
            }],
        }
    }

    #[test]
    fn test_codec_round_trip() {
        let record = sample_record();
        let blob = encode_chunk(&record).unwrap();
        assert_eq!(decode_chunk(&blob).unwrap(), record);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_chunk(&[1, 2, 3]).is_err());
        let blob = lz4_flex::compress_prepend_size(&[0xff; 4]);
        assert!(matches!(decode_chunk(&blob), Err(CodecError::Decode(_))));
    }

    #[test]
    fn test_memory_storage() {
        let mut storage = MemoryChunkStorage::new();
        assert_eq!(storage.load_chunk("w", 0, 0).unwrap(), None);
        storage.save_chunk("w", 0, 0, b"blob").unwrap();
        assert_eq!(storage.load_chunk("w", 0, 0).unwrap(), Some(b"blob".to_vec()));
        assert_eq!(storage.load_chunk("other", 0, 0).unwrap(), None);
        assert!(storage.contains("w", 0, 0));
    }

    #[test]
    fn test_file_storage_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = FileChunkStorage::new(dir.path());

        let blob = encode_chunk(&sample_record()).unwrap();
        storage.save_chunk("alpha", 1, 0, &blob).unwrap();
        storage.save_chunk("alpha", -3, 7, b"second").unwrap();

        assert!(dir.path().join("alpha/chunks/chunk_1_0.bin").exists());
        assert!(!dir.path().join("alpha/chunks/chunk_1_0.tmp").exists());
        assert_eq!(storage.load_chunk("alpha", 1, 0).unwrap(), Some(blob));
        assert_eq!(storage.load_chunk("alpha", -3, 7).unwrap(), Some(b"second".to_vec()));
        assert_eq!(storage.load_chunk("alpha", 9, 9).unwrap(), None);
    }

    #[test]
    fn test_metadata_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileChunkStorage::new(dir.path());
        assert_eq!(storage.load_metadata("beta").unwrap(), None);

        let mut meta = WorldMetadata::new("beta", 1234, "Meadow");
        meta.touch(90);
        storage.save_metadata("beta", &meta).unwrap();
        assert_eq!(storage.load_metadata("beta").unwrap(), Some(meta));

        storage.delete_world("beta").unwrap();
        assert!(!storage.world_dir("beta").exists());
    }
}

//! Flat node file: the persistent, on-disk companion to the RAM cache
//! (4.C, and the wire format in §6). Grounded on
//! `examples/original_source/node-persistent-cache.{hpp,cpp}`; the slot
//! layout is independently confirmed by
//! `examples/other_examples/a1c8d3b5_jake-low-osmx-rs__src-lib.rs.rs`'s
//! `COORDINATE_PRECISION = 10_000_000` little-endian fixed-point pair.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use geo::Coord;
use thiserror::Error;

/// Bytes per slot: a 4-byte longitude and a 4-byte latitude, each
/// fixed-point with a scale of `1e7` (one unit = `1e-7` degrees).
pub const SLOT_SIZE: u64 = 8;

/// Fixed-point scale applied to each coordinate before encoding.
const FIXED_POINT_SCALE: f64 = 1e7;

/// Sentinel slot value denoting "no location stored here".
const SENTINEL: i32 = i32::MIN;

/// Errors raised by [`FlatNodeStore`] operations.
#[derive(Debug, Error)]
pub enum FlatNodeStoreError {
    /// A negative id was passed where the flat file requires an unsigned
    /// index.
    #[error("flat node file cannot store negative id {id}")]
    InvalidId {
        /// The rejected id.
        id: i64,
    },
    /// Opening the backing file failed.
    #[error("failed to open flat node file {path}: {source}")]
    Open {
        /// Path of the flat node file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// A read or write against the backing file failed.
    #[error("flat node file I/O failure at {path}: {source}")]
    Io {
        /// Path of the flat node file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// A dense, sparse-on-disk array of node locations indexed by unsigned
/// node id (4.C).
///
/// Growth on write-past-end extends the file length with zero-filled
/// (sentinel) slots rather than truncating or rewriting existing data; the
/// file is never truncated in place (§6).
pub struct FlatNodeStore {
    file: File,
    path: PathBuf,
}

impl FlatNodeStore {
    /// Open (creating if absent) the flat node file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`FlatNodeStoreError::Open`] if the file cannot be created
    /// or opened read-write.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, FlatNodeStoreError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|source| FlatNodeStoreError::Open {
                path: path.clone(),
                source,
            })?;
        Ok(Self { file, path })
    }

    /// Store `location` at `id`'s slot, growing the file if necessary.
    ///
    /// # Errors
    ///
    /// Returns [`FlatNodeStoreError::InvalidId`] for negative ids, or
    /// [`FlatNodeStoreError::Io`] on a failed seek/write.
    pub fn set(&mut self, id: i64, location: Coord<f64>) -> Result<(), FlatNodeStoreError> {
        let offset = Self::slot_offset(id)?;
        let current_len = self.io(self.file.metadata().map(|m| m.len()))?;
        if offset + SLOT_SIZE > current_len {
            self.io(self.file.set_len(offset + SLOT_SIZE))?;
        }

        self.io(self.file.seek(SeekFrom::Start(offset)))?;
        let (lon, lat) = encode(location);
        let mut buf = Vec::with_capacity(8);
        buf.write_i32::<LittleEndian>(lon)
            .and_then(|()| buf.write_i32::<LittleEndian>(lat))
            .map_err(|source| self.io_error(source))?;
        self.io(self.file.write_all(&buf))
    }

    /// Delete `id`'s slot by writing back the sentinel value.
    ///
    /// # Errors
    ///
    /// Returns [`FlatNodeStoreError::InvalidId`] or
    /// [`FlatNodeStoreError::Io`] as [`Self::set`] does.
    pub fn delete(&mut self, id: i64) -> Result<(), FlatNodeStoreError> {
        let offset = Self::slot_offset(id)?;
        let current_len = self.io(self.file.metadata().map(|m| m.len()))?;
        if offset >= current_len {
            return Ok(());
        }
        self.io(self.file.seek(SeekFrom::Start(offset)))?;
        let mut buf = Vec::with_capacity(8);
        buf.write_i32::<LittleEndian>(SENTINEL)
            .and_then(|()| buf.write_i32::<LittleEndian>(SENTINEL))
            .map_err(|source| self.io_error(source))?;
        self.io(self.file.write_all(&buf))
    }

    /// Read `id`'s slot, returning `None` for sentinel or never-written
    /// slots.
    ///
    /// # Errors
    ///
    /// Returns [`FlatNodeStoreError::InvalidId`] for negative ids, or
    /// [`FlatNodeStoreError::Io`] on a failed seek/read.
    pub fn get(&mut self, id: i64) -> Result<Option<Coord<f64>>, FlatNodeStoreError> {
        let offset = Self::slot_offset(id)?;
        let current_len = self.io(self.file.metadata().map(|m| m.len()))?;
        if offset + SLOT_SIZE > current_len {
            return Ok(None);
        }
        self.io(self.file.seek(SeekFrom::Start(offset)))?;
        let mut buf = [0_u8; 8];
        self.io(self.file.read_exact(&mut buf))?;
        let mut cursor = &buf[..];
        let lon = cursor
            .read_i32::<LittleEndian>()
            .map_err(|source| self.io_error(source))?;
        let lat = cursor
            .read_i32::<LittleEndian>()
            .map_err(|source| self.io_error(source))?;
        Ok(decode(lon, lat))
    }

    /// Resolve `ids`, preserving order and skipping ids with no stored
    /// location.
    ///
    /// # Errors
    ///
    /// Returns the first [`FlatNodeStoreError`] encountered.
    pub fn get_list(&mut self, ids: &[i64]) -> Result<Vec<Coord<f64>>, FlatNodeStoreError> {
        let mut out = Vec::with_capacity(ids.len());
        for &id in ids {
            if let Some(location) = self.get(id)? {
                out.push(location);
            }
        }
        Ok(out)
    }

    /// Total file size in bytes.
    ///
    /// # Errors
    ///
    /// Returns [`FlatNodeStoreError::Io`] if the file's metadata cannot be
    /// read.
    pub fn len_bytes(&self) -> Result<u64, FlatNodeStoreError> {
        self.io(self.file.metadata().map(|m| m.len()))
    }

    fn slot_offset(id: i64) -> Result<u64, FlatNodeStoreError> {
        let unsigned_id = u64::try_from(id).map_err(|_| FlatNodeStoreError::InvalidId { id })?;
        Ok(unsigned_id * SLOT_SIZE)
    }

    fn io<T>(&self, result: std::io::Result<T>) -> Result<T, FlatNodeStoreError> {
        result.map_err(|source| self.io_error(source))
    }

    fn io_error(&self, source: std::io::Error) -> FlatNodeStoreError {
        FlatNodeStoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "fixed-point coordinates are clamped to i32 range by valid WGS84 bounds times the 1e7 scale"
)]
#[expect(
    clippy::float_arithmetic,
    reason = "fixed-point encoding requires multiplying by the scale factor"
)]
fn encode(location: Coord<f64>) -> (i32, i32) {
    let lon = (location.x * FIXED_POINT_SCALE).round() as i32;
    let lat = (location.y * FIXED_POINT_SCALE).round() as i32;
    (lon, lat)
}

#[expect(
    clippy::float_arithmetic,
    reason = "fixed-point decoding requires dividing by the scale factor"
)]
#[expect(
    clippy::cast_precision_loss,
    reason = "i32 fixed-point values convert back to f64 degrees without observable precision loss"
)]
fn decode(lon: i32, lat: i32) -> Option<Coord<f64>> {
    if lon == SENTINEL && lat == SENTINEL {
        return None;
    }
    Some(Coord {
        x: f64::from(lon) / FIXED_POINT_SCALE,
        y: f64::from(lat) / FIXED_POINT_SCALE,
    })
}

#[cfg(test)]
mod tests {
    use super::{FlatNodeStore, SLOT_SIZE};
    use geo::Coord;
    use tempfile::NamedTempFile;

    fn store() -> (NamedTempFile, FlatNodeStore) {
        let file = NamedTempFile::new().expect("create temp file");
        let store = FlatNodeStore::open(file.path()).expect("open flat node store");
        (file, store)
    }

    #[test]
    fn round_trips_a_written_slot() {
        let (_file, mut store) = store();
        let location = Coord { x: 13.405, y: 52.52 };
        store.set(7, location).expect("store slot 7");
        let got = store.get(7).expect("read slot 7").expect("slot present");
        assert!((got.x - location.x).abs() < 1e-6);
        assert!((got.y - location.y).abs() < 1e-6);
    }

    #[test]
    fn never_written_slot_reads_as_invalid() {
        let (_file, mut store) = store();
        store.set(5, Coord { x: 1.0, y: 1.0 }).expect("store slot 5");
        assert_eq!(store.get(100).expect("read unwritten slot"), None);
    }

    #[test]
    fn rejects_negative_ids() {
        let (_file, mut store) = store();
        let err = store.set(-1, Coord { x: 0.0, y: 0.0 }).unwrap_err();
        assert!(matches!(
            err,
            super::FlatNodeStoreError::InvalidId { id: -1 }
        ));
    }

    #[test]
    fn file_size_matches_highest_written_id_plus_one() {
        let (_file, mut store) = store();
        store.set(3, Coord { x: 0.0, y: 0.0 }).expect("store slot 3");
        assert_eq!(store.len_bytes().expect("read length"), 4 * SLOT_SIZE);
    }

    #[test]
    fn delete_restores_sentinel() {
        let (_file, mut store) = store();
        store.set(2, Coord { x: 9.0, y: 9.0 }).expect("store slot 2");
        store.delete(2).expect("delete slot 2");
        assert_eq!(store.get(2).expect("read deleted slot"), None);
    }

    #[test]
    fn max_i32_id_round_trips() {
        let (_file, mut store) = store();
        let id = i64::from(i32::MAX);
        let location = Coord { x: -122.4, y: 37.8 };
        store.set(id, location).expect("store max id");
        let got = store.get(id).expect("read max id").expect("slot present");
        assert!((got.x - location.x).abs() < 1e-6);
        assert!((got.y - location.y).abs() < 1e-6);
    }
}

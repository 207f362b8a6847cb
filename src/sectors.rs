use crate::error::{Result, VtsError};
use crate::types::{MediaFile, SECTOR_SIZE};
use log::trace;
use std::{
    collections::HashMap,
    fs::File,
    io::{Read, Seek, SeekFrom},
};

/// The concatenation of a title's media files, addressable as one contiguous
/// run of 2048-byte sectors.
///
/// Read handles are opened lazily on first access to a file and stay open
/// for the life of the space, which is scoped to one demux session. Sector
/// lookups are frequent and revisit the same files constantly, so handles
/// are cached rather than reopened.
pub struct SectorSpace<'a> {
    files: &'a [MediaFile],
    readers: HashMap<usize, File>,
}

impl<'a> SectorSpace<'a> {
    pub fn new(files: &'a [MediaFile]) -> Self {
        SectorSpace {
            files,
            readers: HashMap::new(),
        }
    }

    /// Maps a virtual sector to the media file holding it and the byte
    /// offset of that sector within the file.
    ///
    /// The `[first_sector, last_sector)` ranges of a title's media files
    /// are disjoint and gap-free by construction, so at most one file can
    /// match; a sector outside all of them is an error.
    pub fn resolve(&self, sector: u64) -> Result<(&'a MediaFile, u64)> {
        let (index, offset) = self.resolve_index(sector)?;
        Ok((&self.files[index], offset))
    }

    fn resolve_index(&self, sector: u64) -> Result<(usize, u64)> {
        for (index, file) in self.files.iter().enumerate() {
            if sector >= file.first_sector && sector < file.last_sector() {
                return Ok((index, (sector - file.first_sector) * SECTOR_SIZE as u64));
            }
        }
        Err(VtsError::SectorOutOfRange { sector })
    }

    /// Reads one whole sector into `buf`.
    pub fn read_sector(&mut self, sector: u64, buf: &mut [u8; SECTOR_SIZE]) -> Result<()> {
        self.read_at(sector, 0, buf)
    }

    /// Reads `buf.len()` bytes starting `offset` bytes into a sector.
    ///
    /// Used when only a few header fields are needed, so a caller doesn't
    /// have to pull the whole sector.
    pub fn read_at(&mut self, sector: u64, offset: u64, buf: &mut [u8]) -> Result<()> {
        let (index, base) = self.resolve_index(sector)?;
        let reader = self.reader(index)?;
        reader.seek(SeekFrom::Start(base + offset))?;
        reader.read_exact(buf)?;
        Ok(())
    }

    fn reader(&mut self, index: usize) -> Result<&mut File> {
        use std::collections::hash_map::Entry;
        match self.readers.entry(index) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let path = &self.files[index].path;
                trace!("opening media file {:?}", path);
                Ok(entry.insert(File::open(path)?))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn files() -> Vec<MediaFile> {
        vec![
            MediaFile {
                path: PathBuf::from("VTS_01_1.VOB"),
                sectors: 10,
                first_sector: 0,
            },
            MediaFile {
                path: PathBuf::from("VTS_01_2.VOB"),
                sectors: 5,
                first_sector: 10,
            },
        ]
    }

    #[test]
    fn resolve_covers_every_sector_exactly_once() {
        let files = files();
        let space = SectorSpace::new(&files);
        for sector in 0..15 {
            let (file, _) = space.resolve(sector).unwrap();
            let matches = files
                .iter()
                .filter(|f| sector >= f.first_sector && sector < f.last_sector())
                .count();
            assert_eq!(matches, 1);
            assert!(sector >= file.first_sector && sector < file.last_sector());
        }
    }

    #[test]
    fn resolve_boundary_crosses_into_second_file() {
        let files = files();
        let space = SectorSpace::new(&files);

        let (file, offset) = space.resolve(9).unwrap();
        assert_eq!(file.first_sector, 0);
        assert_eq!(offset, 9 * SECTOR_SIZE as u64);

        let (file, offset) = space.resolve(10).unwrap();
        assert_eq!(file.first_sector, 10);
        assert_eq!(offset, 0);
    }

    #[test]
    fn resolve_out_of_range() {
        let files = files();
        let space = SectorSpace::new(&files);
        assert!(matches!(
            space.resolve(15),
            Err(VtsError::SectorOutOfRange { sector: 15 })
        ));
    }
}

use thiserror::Error;

/// Errors produced while parsing a title set or demuxing its media files.
///
/// Every error is fatal to its enclosing operation: a format error aborts the
/// parse of that one navigation file, a sector error aborts the current demux
/// session. Callers batch-processing discs are expected to catch per title
/// and move on.
#[derive(Error, Debug)]
pub enum VtsError {
    /// The file does not begin with the `DVDVIDEO-VTS` signature.
    #[error("not a video title set: expected signature {expected:?}, found {found:?}")]
    Signature {
        expected: &'static str,
        found: String,
    },

    /// The title set version byte is not one of the supported revisions.
    #[error("unsupported title set version {found:#04x} (expected 0x10 or 0x11)")]
    Version { found: u8 },

    /// A field read ran past the end of the navigation file.
    #[error("title set truncated at byte offset {offset:#x}")]
    Truncated { offset: u64 },

    /// A cell's sector range runs backwards.
    #[error(
        "malformed cell at byte offset {offset:#x}: first sector {first_sector} is past last sector {last_sector}"
    )]
    InvertedCellRange {
        offset: u64,
        first_sector: u32,
        last_sector: u32,
    },

    /// A sector fell outside the range of every known media file.
    #[error("sector {sector} is outside every media file of this title")]
    SectorOutOfRange { sector: u64 },

    /// A filesystem open/read/write failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, VtsError>;

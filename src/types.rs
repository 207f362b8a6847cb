use crate::parser;
use crate::VtsError;
use std::{
    fmt::Display,
    ops::RangeInclusive,
    path::{Path, PathBuf},
};

/// The fixed DVD-Video sector size, in bytes. Every sector address in this
/// crate is in units of this size.
pub const SECTOR_SIZE: usize = 2048;

/// One parsed navigation file (`VTS_##_0.IFO`) together with the media files
/// backing its sector space.
///
/// A title set is parsed once, top to bottom, by [`open`], and never mutated
/// afterward. See the [crate-level docs] for a usage example.
///
/// [`open`]: #method.open
/// [crate-level docs]: ../index.html
#[derive(Debug, Clone)]
pub struct TitleSet {
    pub path: PathBuf,
    pub video: VideoAttributes,
    pub audio: AudioAttributes,
    pub program_chains: Vec<ProgramChain>,
    pub media_files: Vec<MediaFile>,
}

impl TitleSet {
    /// Parses the navigation file at `path` and discovers its sibling media
    /// files.
    ///
    /// Construction is all-or-nothing: any malformed or truncated field
    /// fails the whole parse and no partially populated title set is ever
    /// returned.
    ///
    /// # Examples
    /// ```no_run
    /// # fn main() -> vts::Result<()> {
    /// use vts::TitleSet;
    ///
    /// let title = TitleSet::open("VIDEO_TS/VTS_01_0.IFO")?;
    /// println!("{} chains", title.program_chains.len());
    /// # Ok(())
    /// # }
    /// ```
    pub fn open<P: AsRef<Path>>(path: P) -> Result<TitleSet, VtsError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let nav = parser::parse_navigation(&bytes)?;
        let media_files = parser::discover_media_files(path)?;

        Ok(TitleSet {
            path: path.to_path_buf(),
            video: nav.video,
            audio: nav.audio,
            program_chains: nav.program_chains,
            media_files,
        })
    }

    /// Gets a borrow handle for every program chain, in navigation-file
    /// order.
    ///
    /// The handles are what a selection UI lists (their `Display` output is
    /// an index/duration summary) and what [`Demuxer::demux`] consumes.
    ///
    /// [`Demuxer::demux`]: ../struct.Demuxer.html#method.demux
    pub fn chains(&self) -> Vec<Chain> {
        (0..self.program_chains.len())
            .map(|index| Chain { index, title: self })
            .collect()
    }

    /// The whole-title playing time in seconds, over all program chains.
    ///
    /// Partial frames are folded in at the first chain's frame rate, when
    /// one is known.
    pub fn duration_seconds(&self) -> u32 {
        let duration: u32 = self.program_chains.iter().map(|c| c.duration).sum();
        let partial: i32 = self.program_chains.iter().map(|c| c.partial_frames).sum();
        let rate = self
            .program_chains
            .first()
            .and_then(|c| c.frame_rate)
            .unwrap_or(0);
        if rate == 0 {
            duration
        } else {
            (duration as i32 + partial.div_euclid(rate as i32)) as u32
        }
    }
}

/// A non-owning handle to one program chain of a [`TitleSet`].
///
/// The handle carries the back-reference to its owning title set, so a
/// demuxer handed a chain can reach the title's media files.
///
/// [`TitleSet`]: struct.TitleSet.html
#[derive(Copy, Clone, Debug)]
pub struct Chain<'title> {
    /// The chain's position in the navigation file, starting at 0.
    pub index: usize,
    title: &'title TitleSet,
}

impl<'title> Chain<'title> {
    pub fn title(&self) -> &'title TitleSet {
        self.title
    }

    pub fn program_chain(&self) -> &'title ProgramChain {
        // index is always in range: handles only come out of TitleSet::chains
        &self.title.program_chains[self.index]
    }

    pub fn cells(&self) -> &'title [Cell] {
        &self.program_chain().cells
    }
}

impl Display for Chain<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.index + 1, self.program_chain().timecode())
    }
}

/// One selectable playback sequence, composed of cells.
#[derive(Debug, Clone)]
pub struct ProgramChain {
    /// Playing time in whole seconds.
    pub duration: u32,
    /// The leftover frame count that didn't make a whole second.
    pub partial_frames: i32,
    /// Nominal frame rate, when the playback-time field declares one.
    pub frame_rate: Option<u32>,
    /// Always 1: multi-angle bookkeeping is intentionally not decoded.
    pub angles: u32,
    pub cells: Vec<Cell>,
}

impl ProgramChain {
    /// Formats the chain duration as `HH:MM:SS`.
    pub fn timecode(&self) -> String {
        let seconds = self.duration % 60;
        let minutes = (self.duration / 60) % 60;
        let hours = self.duration / 3600;
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    }
}

/// A contiguous-by-sector-range playback unit within a program chain.
#[derive(Debug, Copy, Clone)]
pub struct Cell {
    pub duration: u32,
    pub partial_frames: i32,
    pub first_sector: u32,
    pub last_sector: u32,
    pub vob_id: u16,
    pub cell_id: u8,
}

impl Cell {
    /// The sector range the demuxer walks for this cell.
    ///
    /// The upper bound is inclusive: the demux loop reads one sector past
    /// the exclusive `[first, last)` convention used for media-file
    /// resolution and for the timing pass. The asymmetry is inherited
    /// behavior and affects byte-exact output, so it is kept.
    pub fn demux_sectors(&self) -> RangeInclusive<u64> {
        self.first_sector as u64..=self.last_sector as u64
    }

    /// Sector count under the exclusive `[first, last)` convention.
    pub fn sector_count(&self) -> u64 {
        (self.last_sector - self.first_sector) as u64
    }
}

/// One physical media file (VOB) of a title's sector space.
#[derive(Debug, Clone)]
pub struct MediaFile {
    pub path: PathBuf,
    /// File length divided by [`SECTOR_SIZE`], truncated.
    ///
    /// [`SECTOR_SIZE`]: constant.SECTOR_SIZE.html
    pub sectors: u64,
    /// This file's offset in the title's virtual sector space: the running
    /// cumulative sector count of the files discovered before it.
    pub first_sector: u64,
}

impl MediaFile {
    /// One past the last sector this file holds.
    pub fn last_sector(&self) -> u64 {
        self.first_sector + self.sectors
    }
}

/// The video attribute summary of a title set.
#[derive(Debug, Copy, Clone)]
pub struct VideoAttributes {
    pub mode: Option<VideoMode>,
    pub aspect_ratio: Option<AspectRatio>,
    pub resolution: Option<Resolution>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum VideoMode {
    Ntsc,
    Pal,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AspectRatio {
    Standard,
    Widescreen,
}

impl Display for AspectRatio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AspectRatio::Standard => write!(f, "4:3"),
            AspectRatio::Widescreen => write!(f, "16:9"),
        }
    }
}

/// A video resolution in pixels; one of the four fixed DVD-Video sizes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// The audio attribute summary of a title set.
#[derive(Debug, Copy, Clone)]
pub struct AudioAttributes {
    pub stream_count: u8,
    pub format: Option<AudioFormat>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AudioFormat {
    Ac3,
    Mpeg1,
    Mpeg2,
    Lpcm,
    Dts,
}

/// The result of demuxing one program chain: the elementary stream files
/// kept in the output directory, ready for an external remux step.
///
/// At most one video and one audio file survive a demux run; every other
/// candidate sink created along the way is deleted before this is returned.
///
/// The two PTS fields are the first presentation timestamps the demux loop
/// saw, in 90 kHz ticks. They overlap with, but are computed independently
/// of, [`sync_offset_ms`]; both are exposed on purpose.
///
/// [`sync_offset_ms`]: ../fn.sync_offset_ms.html
#[derive(Debug, Clone, Default)]
pub struct ElementaryStreams {
    pub video: Option<PathBuf>,
    pub audio: Option<PathBuf>,
    pub first_video_pts: Option<u64>,
    pub first_audio_pts: Option<u64>,
}

use crate::error::{Result, VtsError};
use crate::types::{
    AspectRatio, AudioAttributes, AudioFormat, Cell, MediaFile, ProgramChain, Resolution,
    VideoAttributes, VideoMode, SECTOR_SIZE,
};
use log::debug;
use nom::{
    bytes::complete::tag,
    number::complete::{be_u16, be_u32, be_u8},
};
use std::path::Path;

type NomError<'a> = (&'a [u8], nom::error::ErrorKind);

const SIGNATURE: &[u8; 12] = b"DVDVIDEO-VTS";
const SUPPORTED_VERSIONS: [u8; 2] = [0x10, 0x11];

// field offsets within the navigation file
const VERSION: usize = 0x21;
const CHAIN_TABLE_POINTER: usize = 0xCC;
const VIDEO_ATTRIBUTES: usize = 0x200;
const AUDIO_STREAM_COUNT: usize = 0x203;
const AUDIO_ATTRIBUTES: usize = 0x204;

// field offsets relative to one program chain's start
const CHAIN_CELL_COUNT: usize = 0x3;
const CHAIN_PLAYBACK_TIME: usize = 0x4;
const CHAIN_CELL_PLAYBACK_TABLE: usize = 0xE8;
const CHAIN_CELL_POSITION_TABLE: usize = 0xEA;

// per-cell entry layout
const CELL_PLAYBACK_STRIDE: usize = 24;
const CELL_PLAYBACK_TIME: usize = 4;
const CELL_FIRST_SECTOR: usize = 8;
const CELL_LAST_SECTOR: usize = 20;
const CELL_POSITION_STRIDE: usize = 4;
const CELL_POSITION_ID: usize = 3;

/// Everything `parse_navigation` pulls out of the navigation file itself;
/// media-file discovery happens separately because it touches the
/// filesystem.
#[derive(Debug)]
pub(crate) struct Navigation {
    pub video: VideoAttributes,
    pub audio: AudioAttributes,
    pub program_chains: Vec<ProgramChain>,
}

/// A bounds-checked reader over the navigation file bytes.
///
/// The format is random-access: tables live at offsets given by other
/// fields. Every read names its absolute byte offset, so a table pointer
/// running past the end of the file surfaces as `Truncated { offset }`
/// instead of a silent out-of-range access.
struct NavReader<'a> {
    data: &'a [u8],
}

impl<'a> NavReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        NavReader { data }
    }

    fn bytes(&self, offset: usize, len: usize) -> Result<&'a [u8]> {
        self.data
            .get(offset..offset + len)
            .ok_or(VtsError::Truncated {
                offset: offset as u64,
            })
    }

    fn be_u8(&self, offset: usize) -> Result<u8> {
        let field = self.bytes(offset, 1)?;
        let (_, v) = be_u8::<NomError>(field).map_err(|_| VtsError::Truncated {
            offset: offset as u64,
        })?;
        Ok(v)
    }

    fn be_u16(&self, offset: usize) -> Result<u16> {
        let field = self.bytes(offset, 2)?;
        let (_, v) = be_u16::<NomError>(field).map_err(|_| VtsError::Truncated {
            offset: offset as u64,
        })?;
        Ok(v)
    }

    fn be_u32(&self, offset: usize) -> Result<u32> {
        let field = self.bytes(offset, 4)?;
        let (_, v) = be_u32::<NomError>(field).map_err(|_| VtsError::Truncated {
            offset: offset as u64,
        })?;
        Ok(v)
    }
}

/// The decoded 4-byte packed-BCD playback time field.
pub(crate) struct PlaybackTime {
    pub seconds: u32,
    pub partial_frames: i32,
    pub frame_rate: Option<u32>,
}

fn bcd(byte: u32) -> u32 {
    ((byte >> 4) & 0x0f) * 10 + (byte & 0x0f)
}

/// Decodes a playback time: hour/minute/second as BCD digit pairs, then a
/// frame pair with a fixed bias of −120 (the nominal-frame-rate bits in the
/// top of the last byte leak into the tens digit, which is where the bias
/// comes from). Rate bits `11` mean 30 fps, `01` mean 25 fps, anything else
/// leaves the rate unset.
pub(crate) fn playback_time(raw: u32) -> PlaybackTime {
    let hours = bcd(raw >> 24);
    let minutes = bcd(raw >> 16);
    let seconds = bcd(raw >> 8);
    let frames = ((raw >> 4) & 0x0f) * 10 + (raw & 0x0f);

    let frame_rate = match (raw & 0xC0) >> 6 {
        0b11 => Some(30),
        0b01 => Some(25),
        _ => None,
    };

    PlaybackTime {
        seconds: hours * 3600 + minutes * 60 + seconds,
        partial_frames: frames as i32 - 120,
        frame_rate,
    }
}

fn video_attributes(field: u16) -> VideoAttributes {
    let hi = (field >> 8) as u8;
    let lo = field as u8;

    let mode = match (hi & 0x30) >> 4 {
        0 => Some(VideoMode::Ntsc),
        1 => Some(VideoMode::Pal),
        _ => None,
    };
    let aspect_ratio = match (hi & 0x0C) >> 2 {
        0 => Some(AspectRatio::Standard),
        3 => Some(AspectRatio::Widescreen),
        _ => None,
    };
    let resolution = match (lo & 0x38) >> 3 {
        0 => Some(Resolution {
            width: 720,
            height: 480,
        }),
        1 => Some(Resolution {
            width: 704,
            height: 480,
        }),
        2 => Some(Resolution {
            width: 352,
            height: 480,
        }),
        3 => Some(Resolution {
            width: 352,
            height: 240,
        }),
        _ => None,
    };

    VideoAttributes {
        mode,
        aspect_ratio,
        resolution,
    }
}

fn audio_format(byte: u8) -> Option<AudioFormat> {
    match (byte & 0xE0) >> 5 {
        0 => Some(AudioFormat::Ac3),
        2 => Some(AudioFormat::Mpeg1),
        3 => Some(AudioFormat::Mpeg2),
        4 => Some(AudioFormat::Lpcm),
        6 => Some(AudioFormat::Dts),
        _ => None,
    }
}

fn signature(input: &[u8]) -> Result<()> {
    let head = input.get(..SIGNATURE.len()).unwrap_or(input);
    tag::<_, _, NomError>(&SIGNATURE[..])(head).map_err(|_| VtsError::Signature {
        expected: "DVDVIDEO-VTS",
        found: String::from_utf8_lossy(head).into_owned(),
    })?;
    Ok(())
}

fn program_chain(reader: &NavReader, chain_start: usize) -> Result<ProgramChain> {
    let time = playback_time(reader.be_u32(chain_start + CHAIN_PLAYBACK_TIME)?);
    let cell_count = reader.be_u8(chain_start + CHAIN_CELL_COUNT)?;
    let playback_table = reader.be_u16(chain_start + CHAIN_CELL_PLAYBACK_TABLE)? as usize;
    let position_table = reader.be_u16(chain_start + CHAIN_CELL_POSITION_TABLE)? as usize;

    // a zero pointer means the table is absent; cells need both
    let mut cells = Vec::new();
    if playback_table != 0 && position_table != 0 {
        let playback_table = chain_start + playback_table;
        let position_table = chain_start + position_table;
        for n in 0..cell_count as usize {
            let entry = playback_table + n * CELL_PLAYBACK_STRIDE;
            let time = playback_time(reader.be_u32(entry + CELL_PLAYBACK_TIME)?);
            let first_sector = reader.be_u32(entry + CELL_FIRST_SECTOR)?;
            let last_sector = reader.be_u32(entry + CELL_LAST_SECTOR)?;
            if first_sector > last_sector {
                return Err(VtsError::InvertedCellRange {
                    offset: entry as u64,
                    first_sector,
                    last_sector,
                });
            }

            let position = position_table + n * CELL_POSITION_STRIDE;
            let vob_id = reader.be_u16(position)?;
            let cell_id = reader.be_u8(position + CELL_POSITION_ID)?;

            cells.push(Cell {
                duration: time.seconds,
                partial_frames: time.partial_frames,
                first_sector,
                last_sector,
                vob_id,
                cell_id,
            });
        }
    }

    Ok(ProgramChain {
        duration: time.seconds,
        partial_frames: time.partial_frames,
        frame_rate: time.frame_rate,
        angles: 1,
        cells,
    })
}

/// Parses the navigation file bytes into attributes and program chains.
///
/// The parse is all-or-nothing: the first malformed or out-of-bounds field
/// fails the whole call.
pub(crate) fn parse_navigation(input: &[u8]) -> Result<Navigation> {
    signature(input)?;

    let reader = NavReader::new(input);
    let version = reader.be_u8(VERSION)?;
    if !SUPPORTED_VERSIONS.contains(&version) {
        return Err(VtsError::Version { found: version });
    }

    // the chain table pointer is a sector index
    let chain_table = reader.be_u32(CHAIN_TABLE_POINTER)? as usize * SECTOR_SIZE;
    let chain_count = reader.be_u16(chain_table)?;

    let mut program_chains = Vec::with_capacity(chain_count as usize);
    for i in 1..=chain_count as usize {
        // 8-byte directory entry per chain; its offset field is relative to
        // the table start
        let chain_start = reader.be_u32(chain_table + i * 8 + 4)? as usize;
        program_chains.push(program_chain(&reader, chain_table + chain_start)?);
    }

    let video = video_attributes(reader.be_u16(VIDEO_ATTRIBUTES)?);
    let audio = AudioAttributes {
        stream_count: reader.be_u8(AUDIO_STREAM_COUNT)?,
        format: audio_format(reader.be_u8(AUDIO_ATTRIBUTES)?),
    };

    Ok(Navigation {
        video,
        audio,
        program_chains,
    })
}

/// Finds the media files backing the title whose navigation file lives at
/// `nav_path`.
///
/// `VTS_##_0.IFO` style names probe sequentially numbered `.VOB` siblings
/// starting at index 1, stopping at the first missing file. Names without a
/// numeric suffix are backed by a single monolithic `.VOB`. Each file's
/// first sector is the cumulative sector count of the files before it.
pub(crate) fn discover_media_files(nav_path: &Path) -> Result<Vec<MediaFile>> {
    let dir = nav_path.parent().unwrap_or_else(|| Path::new("."));
    let stem = nav_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();

    let suffix = stem
        .rfind('_')
        .and_then(|idx| stem[idx + 1..].parse::<u32>().ok().map(|n| (idx, n)));

    let (base, start) = match suffix {
        Some((idx, n)) => (&stem[..idx], n.max(1)),
        None => {
            // a straight file like TRAILER.IFO, backed by TRAILER.VOB
            let path = dir.join(format!("{}.VOB", stem.to_uppercase()));
            debug!("monolithic media file {:?}", path);
            return Ok(vec![media_file(&path, 0)?]);
        }
    };

    let mut files = Vec::new();
    let mut first_sector = 0;
    for index in start.. {
        let path = dir.join(format!("{}_{}.VOB", base, index));
        if !path.is_file() {
            break;
        }
        let file = media_file(&path, first_sector)?;
        debug!(
            "media file {:?}: {} sectors at {}",
            file.path, file.sectors, file.first_sector
        );
        first_sector += file.sectors;
        files.push(file);
    }

    Ok(files)
}

fn media_file(path: &Path, first_sector: u64) -> Result<MediaFile> {
    let len = std::fs::metadata(path)?.len();
    Ok(MediaFile {
        path: path.to_path_buf(),
        sectors: len / SECTOR_SIZE as u64,
        first_sector,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn playback_time_ntsc() {
        // 01:02:03 + frame digit 04, rate bits 11 (30 fps)
        let time = playback_time(0x010203C4);
        assert_eq!(time.seconds, 3723);
        assert_eq!(time.partial_frames, 4);
        assert_eq!(time.frame_rate, Some(30));
    }

    #[test]
    fn playback_time_pal() {
        let time = playback_time(0x00103044);
        assert_eq!(time.seconds, 630);
        assert_eq!(time.frame_rate, Some(25));
    }

    #[test]
    fn playback_time_rate_unset() {
        let time = playback_time(0x00000304);
        assert_eq!(time.seconds, 3);
        assert_eq!(time.frame_rate, None);
    }

    #[test]
    fn video_attributes_ntsc_standard() {
        let attrs = video_attributes(0x0000);
        assert_eq!(attrs.mode, Some(VideoMode::Ntsc));
        assert_eq!(attrs.aspect_ratio, Some(AspectRatio::Standard));
        assert_eq!(
            attrs.resolution,
            Some(Resolution {
                width: 720,
                height: 480
            })
        );
    }

    #[test]
    fn video_attributes_pal_widescreen() {
        // mode 1, aspect 3, resolution code 1
        let attrs = video_attributes(0x1C08);
        assert_eq!(attrs.mode, Some(VideoMode::Pal));
        assert_eq!(attrs.aspect_ratio, Some(AspectRatio::Widescreen));
        assert_eq!(
            attrs.resolution,
            Some(Resolution {
                width: 704,
                height: 480
            })
        );
    }

    #[test]
    fn audio_format_codes() {
        assert_eq!(audio_format(0x00), Some(AudioFormat::Ac3));
        assert_eq!(audio_format(0x40), Some(AudioFormat::Mpeg1));
        assert_eq!(audio_format(0x60), Some(AudioFormat::Mpeg2));
        assert_eq!(audio_format(0x80), Some(AudioFormat::Lpcm));
        assert_eq!(audio_format(0xC0), Some(AudioFormat::Dts));
        assert_eq!(audio_format(0x20), None);
    }

    #[test]
    fn signature_wrong() {
        let err = parse_navigation(b"DVDVIDEO-VMG rest doesn't matter").unwrap_err();
        match err {
            VtsError::Signature { found, .. } => assert_eq!(found, "DVDVIDEO-VMG"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn signature_short_input() {
        assert!(matches!(
            parse_navigation(b"DVD"),
            Err(VtsError::Signature { .. })
        ));
    }

    #[test]
    fn version_unsupported() {
        let mut data = vec![0u8; 0x40];
        data[..12].copy_from_slice(SIGNATURE);
        data[VERSION] = 0x12;
        assert!(matches!(
            parse_navigation(&data),
            Err(VtsError::Version { found: 0x12 })
        ));
    }

    #[test]
    fn truncated_names_offset() {
        // valid signature and version, but the file ends before the chain
        // table pointer
        let mut data = vec![0u8; 0x30];
        data[..12].copy_from_slice(SIGNATURE);
        data[VERSION] = 0x10;
        match parse_navigation(&data) {
            Err(VtsError::Truncated { offset }) => assert_eq!(offset, 0xCC),
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }
}

use crate::error::{Result, VtsError};
use crate::pcm::SampleByteSwapper;
use crate::sectors::SectorSpace;
use crate::types::{Cell, Chain, ElementaryStreams, SECTOR_SIZE};
use log::{debug, trace};
use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

// MPEG program stream start codes, as laid down on DVD-Video discs
const PACK_START_CODE: u32 = 0x0000_01BA;
const VIDEO_STREAM: u32 = 0x0000_01E0;
const MPEG_AUDIO_STREAM: u32 = 0x0000_01C0;
const PRIVATE_STREAM_1: u32 = 0x0000_01BD;
const NAV_PACK: u32 = 0x0000_01BB;

/// Offset of the packet stream id within a pack-marked sector.
const STREAM_ID_OFFSET: usize = 0x0E;

const PROGRESS_STRIDE: u64 = 3000;

/// Room reserved at the start of a PCM sink for the WAV header, which is
/// finalized by the remux step, not here.
const WAV_HEADER_RESERVED: usize = 44;

/// Calibration fudge applied to the audio/video skew, in 90 kHz ticks.
const SYNC_CALIBRATION_TICKS: i64 = 44;

const VIDEO_SINK: &str = "video.m2v";
const MPEG_AUDIO_SINK: &str = "vob.mp2";

fn read_code(buf: &[u8], offset: usize) -> u32 {
    ((buf[offset] as u32) << 24)
        | ((buf[offset + 1] as u32) << 16)
        | ((buf[offset + 2] as u32) << 8)
        | buf[offset + 3] as u32
}

fn read_word(buf: &[u8], offset: usize) -> u16 {
    ((buf[offset] as u16) << 8) | buf[offset + 1] as u16
}

/// The flags/stuffing prefix shared by every PES packet kind we route.
struct PesHeader {
    /// First byte past the stuffed header data.
    payload_start: usize,
    /// The header-data length byte; payload lengths subtract it.
    stuffing: usize,
    /// Presentation timestamp in 90 kHz ticks, when the flag word declares
    /// one.
    pts: Option<u64>,
}

fn pes_header(buf: &[u8], start: usize) -> PesHeader {
    let flags = read_word(buf, start);
    let stuffing = buf[start + 2] as usize;

    let pts = if (flags & 0xC000) == 0x8000 && (flags & 0x00FF) >= 0x80 {
        let i = start + 3;
        let mut pts = ((buf[i] as u64) & 0x0E) << 29;
        pts += ((read_word(buf, i + 1) as u64) & 0xFFFE) << 14;
        pts += ((read_word(buf, i + 3) as u64) >> 1) & 0x7FFF;
        Some(pts)
    } else {
        None
    };

    PesHeader {
        payload_start: start + 3 + stuffing,
        stuffing,
        pts,
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum SinkKind {
    Video,
    MpegAudio,
    Ac3,
    Dts,
    Pcm,
}

impl SinkKind {
    fn is_audio(self) -> bool {
        !matches!(self, SinkKind::Video)
    }
}

struct Sink {
    kind: SinkKind,
    name: String,
    path: PathBuf,
    writer: BufWriter<File>,
    swapper: Option<SampleByteSwapper>,
}

/// Picks the surviving sinks out of a demux run: the first-created video
/// sink and the first-created audio-kind sink, by creation order (which
/// equals first occurrence in the stream).
fn select_streams(kinds: &[SinkKind]) -> (Option<usize>, Option<usize>) {
    let video = kinds.iter().position(|k| *k == SinkKind::Video);
    let audio = kinds.iter().position(|k| k.is_audio());
    (video, audio)
}

/// Per-run demux state: the open sinks and the once-only timestamp
/// captures.
struct Session<'d> {
    out_dir: &'d Path,
    sinks: Vec<Sink>,
    first_video_pts: Option<u64>,
    first_audio_pts: Option<u64>,
}

impl<'d> Session<'d> {
    fn new(out_dir: &'d Path) -> Self {
        Session {
            out_dir,
            sinks: Vec::new(),
            first_video_pts: None,
            first_audio_pts: None,
        }
    }

    fn process_sector(&mut self, buf: &[u8; SECTOR_SIZE]) -> Result<()> {
        // a sector without the pack marker carries nothing demuxable
        if read_code(buf, 0) != PACK_START_CODE {
            return Ok(());
        }

        let stream_id = read_code(buf, STREAM_ID_OFFSET);
        let header_len = read_word(buf, STREAM_ID_OFFSET + 4) as usize;
        let header = pes_header(buf, STREAM_ID_OFFSET + 6);

        match stream_id {
            PRIVATE_STREAM_1 => self.private_stream(buf, header, header_len),
            VIDEO_STREAM => {
                if self.first_video_pts.is_none() {
                    self.first_video_pts = header.pts;
                }
                let len = header_len.saturating_sub(3 + header.stuffing);
                self.write_payload(
                    SinkKind::Video,
                    VIDEO_SINK.to_string(),
                    buf,
                    header.payload_start,
                    len,
                )
            }
            MPEG_AUDIO_STREAM => {
                if self.first_audio_pts.is_none() {
                    self.first_audio_pts = header.pts;
                }
                let len = header_len.saturating_sub(3 + header.stuffing);
                self.write_payload(
                    SinkKind::MpegAudio,
                    MPEG_AUDIO_SINK.to_string(),
                    buf,
                    header.payload_start,
                    len,
                )
            }
            NAV_PACK => {
                trace!(
                    "nav pack: vob {} cell {}",
                    read_word(buf, 0x41F),
                    buf[0x422]
                );
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Non-MPEG audio rides in private stream 1; a sub-stream id byte after
    /// the PES header selects the actual kind.
    fn private_stream(
        &mut self,
        buf: &[u8; SECTOR_SIZE],
        header: PesHeader,
        header_len: usize,
    ) -> Result<()> {
        if self.first_audio_pts.is_none() {
            self.first_audio_pts = header.pts;
        }

        let mut i = header.payload_start;
        if i + 4 > SECTOR_SIZE {
            return Ok(());
        }
        let substream = buf[i];
        // sub-stream id, frame-header count, first-access-unit pointer
        i += 4;

        let mut consumed = header.stuffing;
        let (kind, name) = match substream {
            0xA0..=0xA7 => {
                // emphasis/mute byte, sample details, dynamic range; the
                // details are zeroed on the discs we have seen
                i += 3;
                consumed += 3;
                (SinkKind::Pcm, format!("{:03}.wav", substream))
            }
            0x88..=0x8F => (SinkKind::Dts, format!("{:03}.dts", substream)),
            0x80..=0x87 => (SinkKind::Ac3, format!("{:03}.ac3", substream)),
            _ => return Ok(()),
        };

        let len = header_len.saturating_sub(7 + consumed);
        self.write_payload(kind, name, buf, i, len)
    }

    fn write_payload(
        &mut self,
        kind: SinkKind,
        name: String,
        buf: &[u8; SECTOR_SIZE],
        start: usize,
        len: usize,
    ) -> Result<()> {
        if len == 0 || start >= SECTOR_SIZE {
            return Ok(());
        }
        let end = (start + len).min(SECTOR_SIZE);
        let payload = &buf[start..end];

        let index = match self.sinks.iter().position(|s| s.name == name) {
            Some(index) => index,
            None => self.create_sink(kind, name)?,
        };
        let sink = &mut self.sinks[index];
        match &mut sink.swapper {
            Some(swapper) => swapper.write_swapped(&mut sink.writer, payload)?,
            None => sink.writer.write_all(payload)?,
        }
        Ok(())
    }

    fn create_sink(&mut self, kind: SinkKind, name: String) -> Result<usize> {
        let path = self.out_dir.join(&name);
        debug!("creating {:?} sink {:?}", kind, path);
        let mut writer = BufWriter::new(File::create(&path)?);

        let swapper = if kind == SinkKind::Pcm {
            writer.write_all(&[0u8; WAV_HEADER_RESERVED])?;
            Some(SampleByteSwapper::new())
        } else {
            None
        };

        self.sinks.push(Sink {
            kind,
            name,
            path,
            writer,
            swapper,
        });
        Ok(self.sinks.len() - 1)
    }

    /// Flushes and closes every sink exactly once, keeps the selected
    /// survivors, and deletes every other sink file. Runs on success and
    /// failure paths alike; the first error is remembered but teardown
    /// continues past it.
    fn finish(self) -> Result<ElementaryStreams> {
        let mut sinks = self.sinks;
        let mut failure: Option<VtsError> = None;

        for sink in &mut sinks {
            let flushed = match &mut sink.swapper {
                Some(swapper) => swapper
                    .finish(&mut sink.writer)
                    .and_then(|_| sink.writer.flush()),
                None => sink.writer.flush(),
            };
            if let Err(e) = flushed {
                failure.get_or_insert_with(|| e.into());
            }
        }

        let kinds: Vec<SinkKind> = sinks.iter().map(|s| s.kind).collect();
        let (video, audio) = select_streams(&kinds);

        let mut result = ElementaryStreams {
            first_video_pts: self.first_video_pts,
            first_audio_pts: self.first_audio_pts,
            ..ElementaryStreams::default()
        };
        for (index, sink) in sinks.into_iter().enumerate() {
            drop(sink.writer);
            if Some(index) == video {
                result.video = Some(sink.path);
            } else if Some(index) == audio {
                result.audio = Some(sink.path);
            } else {
                debug!("deleting unselected sink {:?}", sink.path);
                if let Err(e) = fs::remove_file(&sink.path) {
                    failure.get_or_insert_with(|| e.into());
                }
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(result),
        }
    }
}

/// Splits one program chain into elementary stream files.
///
/// # Examples
/// ```no_run
/// # fn main() -> vts::Result<()> {
/// use std::path::Path;
/// use vts::{Demuxer, TitleSet};
///
/// let title = TitleSet::open("VIDEO_TS/VTS_01_0.IFO")?;
/// let chain = title.chains()[0];
///
/// let streams = Demuxer::new()
///     .on_progress(|current, total| eprintln!("{}/{}", current, total))
///     .demux(chain, Path::new("out"))?;
///
/// println!("video: {:?}, audio: {:?}", streams.video, streams.audio);
/// # Ok(())
/// # }
/// ```
pub struct Demuxer<'a> {
    progress: Option<Box<dyn FnMut(u64, u64) + 'a>>,
}

impl<'a> Demuxer<'a> {
    pub fn new() -> Self {
        Demuxer { progress: None }
    }

    /// Installs a `(processed, total)` sector progress callback.
    ///
    /// It fires about every 3000 sectors and exactly once with
    /// `processed == total` when the run completes. It runs synchronously
    /// on the caller's thread. The external remux step reports its own
    /// frame-level progress through the same shape, so the plumbing
    /// composes across both.
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: FnMut(u64, u64) + 'a,
    {
        self.progress = Some(Box::new(callback));
        self
    }

    /// Demuxes `chain` into `out_dir` and returns the surviving elementary
    /// stream files.
    ///
    /// Sinks are created lazily as stream kinds appear, and all of them are
    /// flushed and closed before this returns, on success and on error.
    /// Only the first-seen video sink and first-seen audio sink are kept;
    /// the rest are deleted. A sector outside the title's media files
    /// aborts the run with [`VtsError::SectorOutOfRange`] and no result.
    ///
    /// [`VtsError::SectorOutOfRange`]: enum.VtsError.html#variant.SectorOutOfRange
    pub fn demux(&mut self, chain: Chain<'_>, out_dir: &Path) -> Result<ElementaryStreams> {
        let cells = chain.cells();
        let mut space = SectorSpace::new(&chain.title().media_files);
        let mut session = Session::new(out_dir);

        // the demux loop walks cells with an inclusive upper bound, so one
        // more sector per cell than the exclusive count
        let total: u64 = cells.iter().map(|c| c.sector_count() + 1).sum();

        let scanned = scan(cells, &mut space, &mut session, total, &mut self.progress);
        let finished = session.finish();
        scanned?;
        finished
    }
}

impl Default for Demuxer<'_> {
    fn default() -> Self {
        Demuxer::new()
    }
}

fn scan(
    cells: &[Cell],
    space: &mut SectorSpace,
    session: &mut Session,
    total: u64,
    progress: &mut Option<Box<dyn FnMut(u64, u64) + '_>>,
) -> Result<()> {
    let mut buf = [0u8; SECTOR_SIZE];
    let mut processed = 0u64;

    for cell in cells {
        for sector in cell.demux_sectors() {
            space.read_sector(sector, &mut buf)?;
            if processed % PROGRESS_STRIDE == 0 && processed < total {
                if let Some(callback) = progress {
                    callback(processed, total);
                }
            }
            session.process_sector(&buf)?;
            processed += 1;
        }
    }

    if let Some(callback) = progress {
        callback(total, total);
    }
    Ok(())
}

/// Bytes of a sector the timing pass needs: through the nav pack timing
/// field at 0x39.
const SYNC_HEADER_BYTES: usize = 0x3D;

fn read_pts_field(buf: &[u8], offset: usize) -> u64 {
    let a1 = ((buf[offset] & 0x0E) >> 1) as u64;
    let a2 = (((buf[offset + 1] as u64) << 8) | buf[offset + 2] as u64) >> 1;
    let a3 = (((buf[offset + 3] as u64) << 8) | buf[offset + 4] as u64) >> 1;
    (a1 << 30) | (a2 << 15) | a3
}

/// Computes the audio/video start skew for `chain`, in milliseconds.
///
/// This is a standalone timing pass over the chain's cells (with the
/// exclusive sector bound): the video offset comes from the first nav
/// pack's timing field, the audio offset from the first private-stream or
/// MPEG-audio presentation timestamp, both in 90 kHz ticks. The skew is
/// widened by a 44-tick calibration constant in its own sign direction,
/// then converted to milliseconds.
///
/// The main demux loop captures first-seen timestamps of its own (see
/// [`ElementaryStreams`]); the two computations overlap but are not
/// guaranteed to agree, and both are exposed. The remux step takes this
/// one.
///
/// [`ElementaryStreams`]: types/struct.ElementaryStreams.html
pub fn sync_offset_ms(chain: Chain<'_>) -> Result<i64> {
    let mut space = SectorSpace::new(&chain.title().media_files);
    let mut head = [0u8; SYNC_HEADER_BYTES];
    let mut audio: Option<u64> = None;
    let mut video: Option<u64> = None;

    'cells: for cell in chain.cells() {
        for sector in cell.first_sector as u64..cell.last_sector as u64 {
            space.read_at(sector, 0, &mut head)?;
            if read_code(&head, 0) != PACK_START_CODE {
                continue;
            }
            match read_code(&head, STREAM_ID_OFFSET) {
                MPEG_AUDIO_STREAM | PRIVATE_STREAM_1 => {
                    if audio.is_none() && head[0x15] & 0x80 != 0 {
                        audio = Some(read_pts_field(&head, 0x17));
                    }
                }
                NAV_PACK => {
                    if video.is_none() {
                        video = Some(read_code(&head, 0x39) as u64);
                    }
                }
                _ => {}
            }
            if audio.is_some() && video.is_some() {
                break 'cells;
            }
        }
    }

    let skew = audio.unwrap_or(0) as i64 - video.unwrap_or(0) as i64;
    let adjusted = if skew < 0 {
        skew - SYNC_CALIBRATION_TICKS
    } else {
        skew + SYNC_CALIBRATION_TICKS
    };
    Ok(adjusted / 90)
}

//! A DVD-Video title set (IFO) parser and VOB elementary stream demuxer.
//!
//! The entry point into this crate is the [`TitleSet`] struct, obtained
//! through its [`open`] method. A title set describes a disc title's
//! playback structure: its program chains and cells, a video/audio
//! attribute summary, and the ordered media files whose concatenation forms
//! the title's 2048-byte-sector address space.
//!
//! A [`Demuxer`] then splits one selected program chain into separate
//! elementary video and audio stream files, reporting sector-level
//! progress along the way, and [`sync_offset_ms`] computes the audio/video
//! start skew handed to an external remux step.
//!
//! Only the field layouts and stream-id conventions used by DVD-Video
//! discs are handled; this is not a general MPEG container library.
//! Documentation of the IFO layout is scarce — the format is not
//! officially published, and this parser follows the widely mirrored
//! third-party field tables at [dvd.sourceforge.net].
//!
//! [`TitleSet`]: types/struct.TitleSet.html
//! [`open`]: types/struct.TitleSet.html#method.open
//! [`Demuxer`]: struct.Demuxer.html
//! [`sync_offset_ms`]: fn.sync_offset_ms.html
//! [dvd.sourceforge.net]: http://dvd.sourceforge.net/dvdinfo/
//!
//! # Examples
//! ```no_run
//! # fn main() -> vts::Result<()> {
//! use std::path::Path;
//! use vts::{Demuxer, TitleSet};
//!
//! // parse the navigation file and discover its VOBs
//! let title = TitleSet::open("VIDEO_TS/VTS_01_0.IFO")?;
//!
//! // list the selectable program chains
//! for chain in title.chains() {
//!     println!("{}", chain);
//! }
//!
//! // demux the first chain into elementary streams
//! let chain = title.chains()[0];
//! let streams = Demuxer::new()
//!     .on_progress(|current, total| eprintln!("{}/{}", current, total))
//!     .demux(chain, Path::new("out"))?;
//!
//! let skew_ms = vts::sync_offset_ms(chain)?;
//! println!("{:?} + {:?}, audio shifted {} ms", streams.video, streams.audio, skew_ms);
//! # Ok(())
//! # }
//! ```
mod demux;
mod error;
mod parser;
mod pcm;
mod sectors;
pub mod types;

pub use demux::{sync_offset_ms, Demuxer};
pub use error::{Result, VtsError};
pub use pcm::SampleByteSwapper;
pub use sectors::SectorSpace;
pub use types::*;

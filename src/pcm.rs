use std::io::{self, Write};

/// Swaps pairs of bytes on their way into a writer, converting big-endian
/// 16-bit PCM samples to the little-endian order a WAV sink expects.
///
/// Payload arrives in arbitrary-length runs that don't respect sample
/// boundaries, so an odd trailing byte is held back until its partner shows
/// up in the next run. [`finish`] emits a still-dangling byte as the high
/// byte of a final sample whose low byte is zero.
///
/// [`finish`]: #method.finish
#[derive(Debug, Default)]
pub struct SampleByteSwapper {
    held: Option<u8>,
}

impl SampleByteSwapper {
    pub fn new() -> Self {
        SampleByteSwapper::default()
    }

    /// Writes `bytes` to `writer` with each 16-bit sample byte-swapped.
    pub fn write_swapped<W: Write>(&mut self, writer: &mut W, bytes: &[u8]) -> io::Result<()> {
        for &byte in bytes {
            match self.held.take() {
                Some(high) => writer.write_all(&[byte, high])?,
                None => self.held = Some(byte),
            }
        }
        Ok(())
    }

    /// Flushes a dangling unpaired byte, if any, as a sample with a zero
    /// low byte.
    pub fn finish<W: Write>(&mut self, writer: &mut W) -> io::Result<()> {
        if let Some(high) = self.held.take() {
            writer.write_all(&[0, high])?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swaps_pairs() {
        let mut swapper = SampleByteSwapper::new();
        let mut out = Vec::new();
        swapper.write_swapped(&mut out, &[1, 2, 3, 4]).unwrap();
        swapper.finish(&mut out).unwrap();
        assert_eq!(out, vec![2, 1, 4, 3]);
    }

    #[test]
    fn pairs_across_runs() {
        let mut swapper = SampleByteSwapper::new();
        let mut out = Vec::new();
        swapper.write_swapped(&mut out, &[1]).unwrap();
        swapper.write_swapped(&mut out, &[2, 3]).unwrap();
        swapper.write_swapped(&mut out, &[4]).unwrap();
        swapper.finish(&mut out).unwrap();
        assert_eq!(out, vec![2, 1, 4, 3]);
    }

    #[test]
    fn finish_pads_dangling_byte() {
        let mut swapper = SampleByteSwapper::new();
        let mut out = Vec::new();
        swapper.write_swapped(&mut out, &[7]).unwrap();
        swapper.finish(&mut out).unwrap();
        assert_eq!(out, vec![0, 7]);
    }

    #[test]
    fn finish_is_idempotent() {
        let mut swapper = SampleByteSwapper::new();
        let mut out = Vec::new();
        swapper.write_swapped(&mut out, &[7]).unwrap();
        swapper.finish(&mut out).unwrap();
        swapper.finish(&mut out).unwrap();
        assert_eq!(out, vec![0, 7]);
    }
}

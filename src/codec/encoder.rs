// Encoding coder: dispatched chunks to VCDIFF (or JSON) windows.

use crate::config::{EncodeConfig, FormatFlags};
use crate::error::VcdiffError;
use crate::hash::Matcher;
use crate::hash::matching::MAX_INSTRUCTION;
use crate::vcdiff::header::{VERSION_EXTENDED, VERSION_STANDARD};
use crate::vcdiff::json::JsonWriter;
use crate::vcdiff::{FileHeader, Instruction, Layout, WindowEncoder, adler32};

use super::coder::Coder;

pub(crate) struct EncoderCoder {
    matcher: Matcher,
    flags: FormatFlags,
    window_size: usize,
    json: Option<JsonWriter>,
    windows: u64,
}

impl EncoderCoder {
    pub(crate) fn new(config: &EncodeConfig) -> Self {
        let flags = config.flags();
        Self {
            matcher: Matcher::new(config.dictionary().clone(), config.target_matches()),
            flags,
            window_size: config.encode_window_size().min(MAX_INSTRUCTION),
            json: flags.contains(FormatFlags::JSON).then(JsonWriter::new),
            windows: 0,
        }
    }

    fn encode_window(&mut self, target: &[u8], out: &mut Vec<u8>) -> Result<(), VcdiffError> {
        let instructions = self.matcher.window(target);
        self.windows += 1;
        log::trace!(
            "window {}: {} target bytes, {} instructions",
            self.windows,
            target.len(),
            instructions.len()
        );

        if let Some(json) = self.json.as_mut() {
            return json
                .window(&instructions, target, out)
                .map_err(|e| VcdiffError::encode(format!("JSON serialisation failed: {e}")));
        }

        let layout = if self.flags.contains(FormatFlags::INTERLEAVED) {
            Layout::Interleaved
        } else {
            Layout::Separate
        };
        let dict_len = self.matcher.dictionary().len() as u64;
        let mut enc = WindowEncoder::new(layout, dict_len);
        let mut pos = 0usize;
        for inst in &instructions {
            match *inst {
                Instruction::Add { len } => enc.add(&target[pos..pos + len as usize]),
                Instruction::Copy { addr, len } => enc.copy(addr, len),
                Instruction::Run { byte, len } => enc.run(byte, len),
            }
            pos += inst.len() as usize;
        }
        debug_assert_eq!(enc.target_len(), target.len() as u64);

        let checksum = self.flags.contains(FormatFlags::CHECKSUM).then(|| adler32(target));
        enc.finish(checksum, out);
        Ok(())
    }
}

impl Coder for EncoderCoder {
    fn start(&mut self, out: &mut Vec<u8>) -> Result<(), VcdiffError> {
        if self.json.is_none() {
            let extended = self.flags.intersects(FormatFlags::INTERLEAVED | FormatFlags::CHECKSUM);
            FileHeader {
                version: if extended { VERSION_EXTENDED } else { VERSION_STANDARD },
            }
            .write(out);
        }
        Ok(())
    }

    fn process(&mut self, chunk: &[u8], out: &mut Vec<u8>) -> Result<(), VcdiffError> {
        for window in chunk.chunks(self.window_size) {
            self.encode_window(window, out)?;
        }
        Ok(())
    }

    fn finish(&mut self, out: &mut Vec<u8>) -> Result<(), VcdiffError> {
        if let Some(json) = self.json.as_mut() {
            json.finish(out);
        }
        log::debug!("encoder finished after {} windows", self.windows);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::EncodeOptions;
    use crate::hash::HashedDictionary;

    fn coder(opts: impl FnOnce(&mut EncodeOptions)) -> EncoderCoder {
        let dict = Arc::new(HashedDictionary::new(&b"0123456789abcdefghijklmnopqrstuvwxyz"[..]).unwrap());
        let mut options = EncodeOptions::new(dict);
        opts(&mut options);
        EncoderCoder::new(&options.validate().unwrap())
    }

    #[test]
    fn header_version_follows_flags() {
        let mut out = Vec::new();
        coder(|_| {}).start(&mut out).unwrap();
        assert_eq!(out, [0xD6, 0xC3, 0xC4, 0x00, 0x00]);

        let mut out = Vec::new();
        coder(|o| o.checksum = true).start(&mut out).unwrap();
        assert_eq!(out[3], b'S');

        let mut out = Vec::new();
        coder(|o| o.json = true).start(&mut out).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn chunks_split_into_windows() {
        let mut c = coder(|o| o.encode_window_size = Some(64));
        let mut out = Vec::new();
        c.process(&[7u8; 200], &mut out).unwrap();
        assert_eq!(c.windows, 4);
    }

    #[test]
    fn empty_chunk_produces_nothing() {
        let mut c = coder(|_| {});
        let mut out = Vec::new();
        c.process(&[], &mut out).unwrap();
        assert!(out.is_empty());
        assert_eq!(c.windows, 0);
    }

    #[test]
    fn json_output_is_an_array() {
        let mut c = coder(|o| o.json = true);
        let mut out = Vec::new();
        c.start(&mut out).unwrap();
        c.process(b"hello", &mut out).unwrap();
        c.finish(&mut out).unwrap();
        assert_eq!(out, br#"[["hello"]]"#);
    }
}

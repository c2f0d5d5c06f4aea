// Decoding coder: a chunk-fed `StreamDecoder` behind the `Coder` lifecycle.

use crate::config::DecodeConfig;
use crate::error::VcdiffError;
use crate::vcdiff::StreamDecoder;

use super::coder::Coder;

pub(crate) struct DecoderCoder {
    decoder: StreamDecoder,
}

impl DecoderCoder {
    pub(crate) fn new(config: &DecodeConfig) -> Self {
        Self {
            decoder: StreamDecoder::new(config.dictionary().clone(), config.limits()),
        }
    }
}

impl Coder for DecoderCoder {
    fn start(&mut self, _out: &mut Vec<u8>) -> Result<(), VcdiffError> {
        Ok(())
    }

    fn process(&mut self, chunk: &[u8], out: &mut Vec<u8>) -> Result<(), VcdiffError> {
        self.decoder.decode_chunk(chunk, out)?;
        Ok(())
    }

    fn finish(&mut self, out: &mut Vec<u8>) -> Result<(), VcdiffError> {
        self.decoder.finish(out)?;
        log::debug!(
            "decoder finished: {} windows, {} bytes",
            self.decoder.windows(),
            self.decoder.decoded_len()
        );
        Ok(())
    }
}

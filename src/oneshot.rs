// Whole-buffer encode and decode.
//
// The synchronous functions make one engine call on the caller's thread.
// The callback functions validate their options up front, then stream the
// input through a `VcdiffStream` on a dedicated thread and hand the
// concatenated output (or the first error) to the callback.

use std::thread::{self, JoinHandle};

use bytes::{Bytes, BytesMut};

use crate::config::{DecodeOptions, EncodeOptions, SessionConfig};
use crate::error::VcdiffError;
use crate::stream::{StreamState, VcdiffStream};

/// Streaming encoder for `options`.
pub fn create_encoder(options: &EncodeOptions) -> Result<VcdiffStream, VcdiffError> {
    VcdiffStream::encoder(options)
}

/// Streaming decoder for `options`.
pub fn create_decoder(options: &DecodeOptions) -> Result<VcdiffStream, VcdiffError> {
    VcdiffStream::decoder(options)
}

pub fn vcdiff_encode_sync(input: impl AsRef<[u8]>, options: &EncodeOptions) -> Result<Bytes, VcdiffError> {
    create_encoder(options)?.process_sync(input)
}

pub fn vcdiff_decode_sync(input: impl AsRef<[u8]>, options: &DecodeOptions) -> Result<Bytes, VcdiffError> {
    create_decoder(options)?.process_sync(input)
}

/// Encode `input` off the calling thread and pass the delta to `callback`.
///
/// Invalid options are reported here and `callback` is never called.
pub fn vcdiff_encode<F>(
    input: impl Into<Bytes>,
    options: &EncodeOptions,
    callback: F,
) -> Result<JoinHandle<()>, VcdiffError>
where
    F: FnOnce(Result<Bytes, VcdiffError>) + Send + 'static,
{
    spawn_drain(options.validate()?.into(), input.into(), callback)
}

/// Decode `input` off the calling thread and pass the target to `callback`.
pub fn vcdiff_decode<F>(
    input: impl Into<Bytes>,
    options: &DecodeOptions,
    callback: F,
) -> Result<JoinHandle<()>, VcdiffError>
where
    F: FnOnce(Result<Bytes, VcdiffError>) + Send + 'static,
{
    spawn_drain(options.validate()?.into(), input.into(), callback)
}

fn spawn_drain<F>(config: SessionConfig, input: Bytes, callback: F) -> Result<JoinHandle<()>, VcdiffError>
where
    F: FnOnce(Result<Bytes, VcdiffError>) + Send + 'static,
{
    let mode = config.mode();
    thread::Builder::new()
        .name(format!("vcdiff-{mode}"))
        .spawn(move || callback(VcdiffStream::new(config).and_then(|s| drain(s, input))))
        .map_err(|e| VcdiffError::init(format!("could not start {mode} thread: {e}")))
}

/// Feed `input` as the only chunk and collect every output chunk.
pub(crate) fn drain(mut stream: VcdiffStream, input: Bytes) -> Result<Bytes, VcdiffError> {
    stream.end_with(input)?;
    let mut out = BytesMut::new();
    loop {
        while let Some(chunk) = stream.read() {
            out.extend_from_slice(&chunk);
        }
        match stream.state() {
            StreamState::Closed => return Ok(out.freeze()),
            StreamState::Errored => {
                return Err(stream
                    .error()
                    .cloned()
                    .unwrap_or_else(|| VcdiffError::closed("stream failed")));
            }
            _ => {
                stream.wait();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::error::ErrorKind;
    use crate::hash::HashedDictionary;

    fn options(dict: &'static [u8]) -> (EncodeOptions, DecodeOptions) {
        let hashed = Arc::new(HashedDictionary::new(dict).unwrap());
        (EncodeOptions::new(hashed), DecodeOptions::new(dict))
    }

    #[test]
    fn sync_round_trip() {
        let (enc, dec) = options(b"abcabc");
        let delta = vcdiff_encode_sync(b"abcabcabc", &enc).unwrap();
        assert!(!delta.is_empty());
        assert_eq!(vcdiff_decode_sync(&delta, &dec).unwrap().as_ref(), b"abcabcabc");
    }

    #[test]
    fn callback_round_trip() {
        let (enc, dec) = options(b"the quick brown fox");
        let (tx, rx) = crossbeam_channel::bounded(1);
        vcdiff_encode(&b"the quick brown fox jumps"[..], &enc, move |r| {
            let _ = tx.send(r);
        })
        .unwrap()
        .join()
        .unwrap();
        let delta = rx.recv().unwrap().unwrap();

        let (tx, rx) = crossbeam_channel::bounded(1);
        vcdiff_decode(delta, &dec, move |r| {
            let _ = tx.send(r);
        })
        .unwrap();
        assert_eq!(rx.recv().unwrap().unwrap().as_ref(), b"the quick brown fox jumps");
    }

    #[test]
    fn callback_variant_validates_up_front() {
        let err = vcdiff_decode(Bytes::new(), &DecodeOptions::default(), |_| panic!("called")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn decode_failure_reaches_the_callback() {
        let (_, dec) = options(b"dictionary");
        let (tx, rx) = crossbeam_channel::bounded(1);
        vcdiff_decode(&b"definitely not vcdiff"[..], &dec, move |r| {
            let _ = tx.send(r);
        })
        .unwrap();
        let err = rx.recv().unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decode);
        assert_eq!(err.native_code(), Some(3));
    }
}

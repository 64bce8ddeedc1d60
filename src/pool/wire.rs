//! Framed CBOR codec for the parent/worker stdio channel.
//!
//! Each message is one CBOR document behind a 4-byte big-endian length
//! prefix. The parent writes [`Request`] frames to the child's stdin and
//! reads [`Reply`] frames from its stdout, one reply per request.

use std::io::{self, Read};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// Enforced on both ends: encoders refuse a larger body, readers treat a
// larger length prefix as stream corruption.
const MAX_FRAME_LEN: usize = 1 << 28;

/// One job shipped to a worker process.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Request<J> {
    pub task: u64,
    pub job: J,
}

/// Outcome of one job, shipped back to the parent.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Reply<T> {
    pub task: u64,
    pub outcome: Outcome<T>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) enum Outcome<T> {
    /// The job ran and produced a value.
    Ok(T),
    /// The job panicked; the captured message travels instead.
    Panicked(String),
    /// The worker could not encode the real reply.
    Fault(String),
}

/// Encode `value` as one length-prefixed frame. A body over the frame
/// cap is refused here, before anything reaches the wire.
pub(crate) fn encode_frame<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    ciborium::into_writer(value, &mut body).map_err(|e| Error::serialization(e.to_string()))?;

    if body.len() > MAX_FRAME_LEN {
        return Err(Error::serialization(format!(
            "frame of {} bytes exceeds the {} byte cap",
            body.len(),
            MAX_FRAME_LEN
        )));
    }

    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Decode one frame body.
pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    ciborium::from_reader(bytes).map_err(|e| Error::serialization(e.to_string()))
}

/// Read the next frame body from `reader`.
///
/// `Ok(None)` is a clean end of stream: the peer closed the pipe between
/// frames. End of stream inside a frame is an error like any other read
/// failure.
pub(crate) fn read_frame_bytes<R: Read>(reader: &mut R) -> io::Result<Option<Vec<u8>>> {
    let mut header = [0u8; 4];
    if let Err(err) = reader.read_exact(&mut header) {
        return if err.kind() == io::ErrorKind::UnexpectedEof {
            Ok(None)
        } else {
            Err(err)
        };
    }

    let len = u32::from_be_bytes(header) as usize;
    if len > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "frame length out of range",
        ));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body)?;
    Ok(Some(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_frame_roundtrip() {
        let frame = encode_frame(&Request {
            task: 9,
            job: vec![1u8, 2, 3],
        })
        .unwrap();

        let mut cursor = Cursor::new(frame);
        let bytes = read_frame_bytes(&mut cursor).unwrap().unwrap();
        let request: Request<Vec<u8>> = decode(&bytes).unwrap();
        assert_eq!(request.task, 9);
        assert_eq!(request.job, vec![1, 2, 3]);

        // Nothing left behind the frame.
        assert!(read_frame_bytes(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn test_clean_eof_between_frames_is_none() {
        let mut cursor = Cursor::new(Vec::<u8>::new());
        assert!(read_frame_bytes(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn test_eof_inside_frame_is_an_error() {
        let mut frame = encode_frame(&Reply {
            task: 1,
            outcome: Outcome::Ok(7u32),
        })
        .unwrap();
        frame.truncate(frame.len() - 1);

        let mut cursor = Cursor::new(frame);
        assert!(read_frame_bytes(&mut cursor).is_err());
    }

    #[test]
    fn test_oversized_length_is_rejected() {
        let mut cursor = Cursor::new(u32::MAX.to_be_bytes().to_vec());
        assert!(read_frame_bytes(&mut cursor).is_err());
    }

    // Serializes as `0` repeated `len` times without holding a source
    // buffer that size.
    struct Blob(usize);

    impl Serialize for Blob {
        fn serialize<S: serde::Serializer>(
            &self,
            serializer: S,
        ) -> std::result::Result<S::Ok, S::Error> {
            serializer.collect_seq(std::iter::repeat(0u8).take(self.0))
        }
    }

    #[test]
    fn test_oversized_body_is_rejected_at_encode_time() {
        let result = encode_frame(&Blob(MAX_FRAME_LEN + 1));
        assert!(matches!(result, Err(Error::Serialization(_))));
    }

    #[test]
    fn test_decode_garbage_is_a_serialization_error() {
        let result: Result<Reply<u32>> = decode(&[0xff, 0x00, 0x13]);
        assert!(matches!(result, Err(Error::Serialization(_))));
    }
}

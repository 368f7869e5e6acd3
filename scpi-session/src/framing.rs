//! Response framing codec
//!
//! Stateless encode/decode between the wire and the two reply shapes a
//! line-oriented instrument produces:
//!
//! 1. **Text line** — bytes delimited by the configured terminator
//!    sequence; decoding strips exactly one trailing occurrence and leaves
//!    interior terminator bytes untouched.
//! 2. **Definite-length binary block** — `'#' <n:1 digit> <length:n digits>
//!    <payload:length bytes> <terminator:1 byte>`; the payload is opaque
//!    (waveform samples, a bitmap) and is returned unchanged.
//!
//! A single receive is never guaranteed to deliver everything requested, so
//! both decode paths accumulate across arbitrarily small partial reads.

use bytes::BytesMut;
use scpi_core::{ScpiError, ScpiResult};
use scpi_transport::LinkStream;

/// First byte of a definite-length binary block header
pub const BLOCK_INTRODUCER: u8 = b'#';

/// Encode an outgoing command: the text plus exactly one terminator
pub fn encode_command(command: &str, terminator: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(command.len() + terminator.len());
    out.extend_from_slice(command.as_bytes());
    out.extend_from_slice(terminator);
    out
}

/// Strip exactly one trailing terminator occurrence, if present
///
/// Interior terminator bytes are part of the payload and stay untouched.
pub fn strip_terminator<'a>(data: &'a [u8], terminator: &[u8]) -> &'a [u8] {
    if !terminator.is_empty() && data.ends_with(terminator) {
        &data[..data.len() - terminator.len()]
    } else {
        data
    }
}

/// Read a text-line reply from the stream
///
/// Accumulates receives until the data ends with the terminator, the far
/// end signals EOF, or `max_len` bytes have arrived. A timeout before any
/// byte arrives is [`ScpiError::ReadTimeout`]; a timeout after part of the
/// line arrived yields the partial line, matching the single-receive
/// semantics instruments with unterminated replies rely on. With an empty
/// terminator configured the reply is whatever one receive returns.
pub async fn read_line<S: LinkStream + ?Sized>(
    stream: &mut S,
    max_len: usize,
    terminator: &[u8],
) -> ScpiResult<String> {
    let mut buf = BytesMut::new();
    let mut chunk = vec![0u8; max_len.max(1)];

    loop {
        let n = match stream.read(&mut chunk).await {
            Ok(n) => n,
            Err(ScpiError::ReadTimeout) if !buf.is_empty() => break,
            Err(e) => return Err(e),
        };
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if !terminator.is_empty() && buf.ends_with(terminator) {
            break;
        }
        if terminator.is_empty() || buf.len() >= max_len {
            break;
        }
    }

    let line = strip_terminator(&buf, terminator);
    Ok(String::from_utf8_lossy(line).into_owned())
}

/// Read a raw reply from the stream
///
/// The first receive decides the shape: a leading [`BLOCK_INTRODUCER`]
/// enters the definite-length block decoder (bytes already received are
/// consumed first), anything else is returned as-is. `max_chunk` bounds a
/// single receive, not the total reply length, which for blocks is driven
/// by the header. Block replies always close with a single terminator
/// byte, independent of the configured line terminator sequence.
pub async fn read_reply<S: LinkStream + ?Sized>(
    stream: &mut S,
    max_chunk: usize,
) -> ScpiResult<Vec<u8>> {
    let max_chunk = max_chunk.max(2);
    let mut chunk = vec![0u8; max_chunk];

    let n = stream.read(&mut chunk).await?;
    if n == 0 {
        return Ok(Vec::new());
    }

    if chunk[0] == BLOCK_INTRODUCER {
        let mut pending = BytesMut::from(&chunk[..n]);
        read_block(stream, &mut pending, max_chunk).await
    } else {
        Ok(chunk[..n].to_vec())
    }
}

/// Decode a definite-length binary block
///
/// `pending` holds bytes already received, starting at the introducer.
/// Reads never extend past the end of the declared frame.
async fn read_block<S: LinkStream + ?Sized>(
    stream: &mut S,
    pending: &mut BytesMut,
    max_chunk: usize,
) -> ScpiResult<Vec<u8>> {
    // Introducer plus the digit-count byte.
    fill_to(stream, pending, 2, max_chunk).await?;

    let digits = match (pending[1] as char).to_digit(10) {
        Some(0) => {
            return Err(ScpiError::Framing(
                "indefinite-length block (#0) is not supported".into(),
            ));
        }
        Some(d) => d as usize,
        None => {
            return Err(ScpiError::Framing(format!(
                "block digit count {:?} is not a decimal digit",
                pending[1] as char
            )));
        }
    };

    // The decimal length field.
    fill_to(stream, pending, 2 + digits, max_chunk).await?;
    let length_field = &pending[2..2 + digits];
    let payload_len = std::str::from_utf8(length_field)
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or_else(|| {
            ScpiError::Framing(format!(
                "block length field {:?} is not a decimal number",
                String::from_utf8_lossy(length_field)
            ))
        })?;

    // Payload plus the single trailing terminator byte.
    let total = 2 + digits + payload_len + 1;
    fill_to(stream, pending, total, max_chunk).await?;

    Ok(pending[2 + digits..2 + digits + payload_len].to_vec())
}

/// Accumulate receives until `pending` holds at least `needed` bytes
///
/// Each receive is bounded both by `max_chunk` and by the bytes still
/// missing, so the decoder never consumes data past the declared frame.
async fn fill_to<S: LinkStream + ?Sized>(
    stream: &mut S,
    pending: &mut BytesMut,
    needed: usize,
    max_chunk: usize,
) -> ScpiResult<()> {
    while pending.len() < needed {
        let want = (needed - pending.len()).min(max_chunk);
        let mut chunk = vec![0u8; want];
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(ScpiError::Read(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "stream ended inside a framed reply",
            )));
        }
        pending.extend_from_slice(&chunk[..n]);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;

    /// What a scripted stream does once its data runs out
    enum Tail {
        Timeout,
        Eof,
    }

    /// Scripted [`LinkStream`]: serves queued chunks one receive at a time
    struct ChunkStream {
        chunks: VecDeque<Vec<u8>>,
        tail: Tail,
    }

    impl ChunkStream {
        fn new(chunks: Vec<Vec<u8>>, tail: Tail) -> Self {
            Self {
                chunks: chunks.into(),
                tail,
            }
        }

        /// One chunk per receive, `size` bytes each
        fn split(data: &[u8], size: usize, tail: Tail) -> Self {
            let chunks = data.chunks(size.max(1)).map(|c| c.to_vec()).collect();
            Self::new(chunks, tail)
        }
    }

    #[async_trait]
    impl LinkStream for ChunkStream {
        async fn read(&mut self, buf: &mut [u8]) -> ScpiResult<usize> {
            let Some(mut chunk) = self.chunks.pop_front() else {
                return match self.tail {
                    Tail::Timeout => Err(ScpiError::ReadTimeout),
                    Tail::Eof => Ok(0),
                };
            };
            // Hand back what does not fit this receive.
            if chunk.len() > buf.len() {
                let rest = chunk.split_off(buf.len());
                self.chunks.push_front(rest);
            }
            buf[..chunk.len()].copy_from_slice(&chunk);
            Ok(chunk.len())
        }

        async fn write_all(&mut self, _buf: &[u8]) -> ScpiResult<()> {
            Ok(())
        }

        async fn flush(&mut self) -> ScpiResult<()> {
            Ok(())
        }

        fn is_open(&self) -> bool {
            true
        }

        async fn close(&mut self) {}
    }

    fn block_wire(payload: &[u8]) -> Vec<u8> {
        let length = payload.len().to_string();
        let mut wire = Vec::new();
        wire.push(BLOCK_INTRODUCER);
        wire.push(b'0' + length.len() as u8);
        wire.extend_from_slice(length.as_bytes());
        wire.extend_from_slice(payload);
        wire.push(b'\n');
        wire
    }

    #[test]
    fn test_encode_appends_exactly_one_terminator() {
        assert_eq!(encode_command("*IDN?", b"\n"), b"*IDN?\n");
        assert_eq!(encode_command("MEAS:VOLT?", b"\r\n"), b"MEAS:VOLT?\r\n");
        assert_eq!(encode_command("A0", b""), b"A0");
    }

    #[test]
    fn test_strip_exactly_one_trailing_terminator() {
        assert_eq!(strip_terminator(b"5.0E-1\n", b"\n"), b"5.0E-1");
        // One occurrence only.
        assert_eq!(strip_terminator(b"x\n\n", b"\n"), b"x\n");
        // Interior terminators are payload.
        assert_eq!(strip_terminator(b"a\nb\n", b"\n"), b"a\nb");
        // No terminator, nothing stripped.
        assert_eq!(strip_terminator(b"raw", b"\n"), b"raw");
        assert_eq!(strip_terminator(b"data\r\n", b"\r\n"), b"data");
    }

    #[tokio::test]
    async fn test_read_line_across_partial_reads() {
        let mut stream = ChunkStream::new(
            vec![b"ACME,".to_vec(), b"4000X".to_vec(), b",0,1.0\n".to_vec()],
            Tail::Timeout,
        );
        let line = read_line(&mut stream, 4096, b"\n").await.unwrap();
        assert_eq!(line, "ACME,4000X,0,1.0");
    }

    #[tokio::test]
    async fn test_read_line_empty_reply_is_ok_not_timeout() {
        let mut stream = ChunkStream::new(vec![b"\n".to_vec()], Tail::Timeout);
        let line = read_line(&mut stream, 4096, b"\n").await.unwrap();
        assert_eq!(line, "");
    }

    #[tokio::test]
    async fn test_read_line_timeout_with_no_data_is_an_error() {
        let mut stream = ChunkStream::new(vec![], Tail::Timeout);
        match read_line(&mut stream, 4096, b"\n").await {
            Err(ScpiError::ReadTimeout) => {}
            other => panic!("expected ReadTimeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_read_line_timeout_after_partial_line_yields_partial() {
        let mut stream = ChunkStream::new(vec![b"A1 0023.4".to_vec()], Tail::Timeout);
        let line = read_line(&mut stream, 4096, b"\n").await.unwrap();
        assert_eq!(line, "A1 0023.4");
    }

    #[tokio::test]
    async fn test_read_line_empty_terminator_is_single_receive() {
        let mut stream = ChunkStream::new(
            vec![b"A0 0025.0 0085.0".to_vec(), b"ignored".to_vec()],
            Tail::Timeout,
        );
        let line = read_line(&mut stream, 4096, b"").await.unwrap();
        assert_eq!(line, "A0 0025.0 0085.0");
    }

    #[tokio::test]
    async fn test_block_round_trip_lengths() {
        for len in [0usize, 1, 999, 100_000] {
            let payload: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            let mut stream = ChunkStream::split(&block_wire(&payload), 4096, Tail::Timeout);
            let decoded = read_reply(&mut stream, 4096).await.unwrap();
            assert_eq!(decoded, payload, "length {}", len);
        }
    }

    #[tokio::test]
    async fn test_block_reassembled_from_one_byte_reads() {
        let payload: Vec<u8> = (0..5000usize).map(|i| (i % 256) as u8).collect();
        let mut stream = ChunkStream::split(&block_wire(&payload), 1, Tail::Timeout);
        let decoded = read_reply(&mut stream, 4096).await.unwrap();
        assert_eq!(decoded.len(), 5000);
        assert_eq!(decoded, payload);
    }

    #[tokio::test]
    async fn test_block_payload_is_opaque() {
        // Payload containing terminators and introducers must survive.
        let payload = b"#\n\n#9raw\r\n".to_vec();
        let mut stream = ChunkStream::split(&block_wire(&payload), 3, Tail::Timeout);
        let decoded = read_reply(&mut stream, 4096).await.unwrap();
        assert_eq!(decoded, payload);
    }

    #[tokio::test]
    async fn test_non_block_reply_passes_through() {
        let mut stream = ChunkStream::new(vec![b"1.25E+0\n".to_vec()], Tail::Timeout);
        let raw = read_reply(&mut stream, 4096).await.unwrap();
        assert_eq!(raw, b"1.25E+0\n");
    }

    #[tokio::test]
    async fn test_block_with_nonnumeric_digit_count_is_a_framing_fault() {
        let mut stream = ChunkStream::new(vec![b"#x123\n".to_vec()], Tail::Timeout);
        match read_reply(&mut stream, 4096).await {
            Err(ScpiError::Framing(_)) => {}
            other => panic!("expected Framing fault, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_indefinite_block_is_a_framing_fault() {
        let mut stream = ChunkStream::new(vec![b"#0payload".to_vec()], Tail::Timeout);
        match read_reply(&mut stream, 4096).await {
            Err(ScpiError::Framing(_)) => {}
            other => panic!("expected Framing fault, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_block_with_nonnumeric_length_is_a_framing_fault() {
        let mut stream = ChunkStream::new(vec![b"#3a2cdata\n".to_vec()], Tail::Timeout);
        match read_reply(&mut stream, 4096).await {
            Err(ScpiError::Framing(_)) => {}
            other => panic!("expected Framing fault, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_block_timeout_mid_payload_propagates() {
        // Declares 10 bytes, delivers 4, then goes quiet.
        let mut stream = ChunkStream::new(vec![b"#210abcd".to_vec()], Tail::Timeout);
        match read_reply(&mut stream, 4096).await {
            Err(ScpiError::ReadTimeout) => {}
            other => panic!("expected ReadTimeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_block_eof_mid_payload_is_a_read_failure() {
        let mut stream = ChunkStream::new(vec![b"#210abcd".to_vec()], Tail::Eof);
        match read_reply(&mut stream, 4096).await {
            Err(ScpiError::Read(_)) => {}
            other => panic!("expected Read failure, got {:?}", other),
        }
    }
}

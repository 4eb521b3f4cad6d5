//! Server-sent events decoding for streaming providers.

use super::ProviderError;
use futures::{stream, Stream, StreamExt};
use std::collections::VecDeque;

/// Incremental SSE decoder yielding the `data` payload of each complete event.
///
/// Bytes are buffered until an event terminator arrives, so multi-byte
/// characters split across network chunks decode correctly.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes, returning the payloads of events completed by them.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend(chunk.iter().copied().filter(|b| *b != b'\r'));

        let mut events = Vec::new();
        while let Some(end) = find_event_end(&self.buffer) {
            let raw: Vec<u8> = self.buffer.drain(..end + 2).collect();
            if let Some(data) = parse_event(&raw[..end]) {
                events.push(data);
            }
        }
        events
    }

    /// Flush a trailing event that was not followed by a blank line.
    pub fn finish(&mut self) -> Option<String> {
        let raw = std::mem::take(&mut self.buffer);
        parse_event(&raw)
    }
}

fn find_event_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\n\n")
}

/// Join the `data:` lines of one event; `None` for events without data.
fn parse_event(raw: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(raw);
    let data: Vec<&str> = text
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|value| value.strip_prefix(' ').unwrap_or(value))
        .collect();

    if data.is_empty() {
        None
    } else {
        Some(data.join("\n"))
    }
}

struct DecodeState<S> {
    body: S,
    decoder: SseDecoder,
    pending: VecDeque<String>,
    done: bool,
}

/// Turn a byte stream into a lazy stream of event payloads.
///
/// The stream ends after the body ends or after the first transport error.
pub fn event_stream<S, B, E>(body: S) -> impl Stream<Item = Result<String, ProviderError>>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: Into<ProviderError>,
{
    let state = DecodeState {
        body,
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        done: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(data) = st.pending.pop_front() {
                return Some((Ok(data), st));
            }
            if st.done {
                return None;
            }
            match st.body.next().await {
                Some(Ok(chunk)) => {
                    let events = st.decoder.push(chunk.as_ref());
                    st.pending.extend(events);
                }
                Some(Err(e)) => {
                    st.done = true;
                    return Some((Err(e.into()), st));
                }
                None => {
                    st.done = true;
                    st.pending.extend(st.decoder.finish());
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_events_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {\"a\":").is_empty());
        let events = decoder.push(b"1}\n\ndata: two\n\n");
        assert_eq!(events, vec!["{\"a\":1}".to_string(), "two".to_string()]);
    }

    #[test]
    fn handles_crlf_and_multiline_data() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b"event: x\r\ndata: line1\r\ndata: line2\r\n\r\n");
        assert_eq!(events, vec!["line1\nline2".to_string()]);
    }

    #[test]
    fn keeps_multibyte_characters_split_across_chunks() {
        let bytes = "data: héllo\n\n".as_bytes();
        // Split inside the two-byte 'é'.
        let split = bytes.iter().position(|b| *b == 0xC3).unwrap() + 1;
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(&bytes[..split]).is_empty());
        assert_eq!(decoder.push(&bytes[split..]), vec!["héllo".to_string()]);
    }

    #[test]
    fn finish_flushes_unterminated_event() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: tail").is_empty());
        assert_eq!(decoder.finish().as_deref(), Some("tail"));
        assert!(decoder.finish().is_none());
    }

    #[tokio::test]
    async fn event_stream_yields_payloads_in_order() {
        let chunks: Vec<Result<&[u8], ProviderError>> = vec![
            Ok(&b"data: one\n\nda"[..]),
            Ok(&b"ta: two\n\n"[..]),
            Ok(&b"data: three"[..]),
        ];
        let events: Vec<String> = event_stream(stream::iter(chunks))
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(events, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn event_stream_stops_after_error() {
        let chunks: Vec<Result<&[u8], ProviderError>> = vec![
            Ok(&b"data: one\n\n"[..]),
            Err(ProviderError::Timeout),
            Ok(&b"data: never\n\n"[..]),
        ];
        let items: Vec<Result<String, ProviderError>> =
            event_stream(stream::iter(chunks)).collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[1], Err(ProviderError::Timeout));
    }
}

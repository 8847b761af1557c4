//! Streaming redaction writer
//!
//! Sits between a child process pipe and the real destination and replaces
//! every known secret with its surrogate before bytes are forwarded, even when
//! a secret arrives split across several writes.
//!
//! Retention invariant: with `L` the length of the longest secret, nothing is
//! forwarded until at least `2 * L` bytes are buffered. Each flush sanitizes
//! the buffer up to its last `L` bytes, forwards the result and keeps the
//! trailing window as raw input, because it may hold the start of a secret
//! whose tail has not arrived yet. Longer secrets take precedence over
//! shorter ones they overlap. A match that begins before the window and runs
//! into it stays in the buffer until the next flush, so the window can grow
//! past `L`. Retained bytes are never surrogate text and are never rescanned
//! after replacement. `close` sanitizes and forwards whatever is left.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::RedactError;
use crate::policy::RedactionMode;

/// Secret name -> secret value
pub type SecretMap = BTreeMap<String, String>;

/// A literal secret value and what replaces it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedactionPair {
    pub pattern: Vec<u8>,
    pub surrogate: Vec<u8>,
}

/// Immutable redaction table, shared by every writer of one run
#[derive(Debug, Clone, Default)]
pub struct Redactor {
    /// Sorted longest pattern first
    pairs: Vec<RedactionPair>,
    longest_pattern_len: usize,
}

impl Redactor {
    pub fn new(secrets: &SecretMap, mode: RedactionMode) -> Self {
        if mode.is_pass_through() {
            return Self::pass_through();
        }

        let longest_pattern_len = secrets.values().map(String::len).max().unwrap_or(0);

        let mut pairs: Vec<RedactionPair> = secrets
            .iter()
            .filter(|(name, value)| !name.is_empty() && !value.is_empty())
            .filter_map(|(name, value)| {
                mode.surrogate(name, value).map(|surrogate| RedactionPair {
                    pattern: value.as_bytes().to_vec(),
                    surrogate: surrogate.into_bytes(),
                })
            })
            .collect();

        pairs.sort_by(|a, b| {
            b.pattern
                .len()
                .cmp(&a.pattern.len())
                .then_with(|| a.pattern.cmp(&b.pattern))
        });

        Self {
            pairs,
            longest_pattern_len,
        }
    }

    /// A table that forwards everything untouched
    pub fn pass_through() -> Self {
        Self::default()
    }

    pub fn pairs(&self) -> &[RedactionPair] {
        &self.pairs
    }

    pub fn longest_pattern_len(&self) -> usize {
        self.longest_pattern_len
    }

    pub fn is_pass_through(&self) -> bool {
        self.longest_pattern_len == 0
    }

    /// Replace every occurrence of every pattern
    pub fn sanitize(&self, data: &[u8]) -> Vec<u8> {
        self.sanitize_prefix(data, data.len()).0
    }

    /// Sanitize `data` from the front, deciding only at positions before
    /// `limit`.
    ///
    /// Patterns are applied longest first over the whole region: each pair
    /// claims its non-overlapping occurrences that start before `limit` and
    /// don't touch bytes a longer pattern already claimed. Returns the
    /// sanitized bytes and how much of `data` they cover; the rest is
    /// untouched input. A claimed match that runs past `limit` is left in
    /// the uncovered rest. With `limit <= data.len() - longest_pattern_len`
    /// every committed match had all overlapping candidates fully buffered.
    pub fn sanitize_prefix(&self, data: &[u8], limit: usize) -> (Vec<u8>, usize) {
        let limit = limit.min(data.len());

        let mut claimed = vec![false; data.len()];
        // match start -> index into pairs
        let mut matches: BTreeMap<usize, usize> = BTreeMap::new();

        for (index, pair) in self.pairs.iter().enumerate() {
            let len = pair.pattern.len();
            let mut pos = 0;
            while pos < limit && pos + len <= data.len() {
                let span = pos..pos + len;
                if data[span.clone()] == pair.pattern[..] && !claimed[span.clone()].contains(&true)
                {
                    claimed[span].fill(true);
                    matches.insert(pos, index);
                    pos += len;
                } else {
                    pos += 1;
                }
            }
        }

        let mut end = limit;
        if let Some((&start, &index)) = matches.range(..limit).next_back() {
            if start + self.pairs[index].pattern.len() > limit {
                end = start;
            }
        }

        let mut out = Vec::with_capacity(end);
        let mut pos = 0;
        while pos < end {
            match matches.get(&pos) {
                Some(&index) => {
                    let pair = &self.pairs[index];
                    out.extend_from_slice(&pair.surrogate);
                    pos += pair.pattern.len();
                }
                None => {
                    out.push(data[pos]);
                    pos += 1;
                }
            }
        }

        (out, end)
    }
}

/// Redacting wrapper around an async destination
///
/// Owned by exactly one pump task, so it carries no locking. Must be closed
/// exactly once; data still buffered at that point is only delivered by
/// [`RedactingWriter::close`].
pub struct RedactingWriter<W> {
    buffer: Vec<u8>,
    closed: bool,
    redactor: Arc<Redactor>,
    output: W,
}

impl<W> RedactingWriter<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(output: W, redactor: Arc<Redactor>) -> Self {
        Self {
            buffer: Vec::new(),
            closed: false,
            redactor,
            output,
        }
    }

    /// Build a writer with its own redaction table
    pub fn from_secrets(output: W, secrets: &SecretMap, mode: RedactionMode) -> Self {
        Self::new(output, Arc::new(Redactor::new(secrets, mode)))
    }

    /// Accept `data` for eventual delivery
    ///
    /// Returns the full input length on success even when nothing was
    /// forwarded yet.
    pub async fn write(&mut self, data: &[u8]) -> Result<usize, RedactError> {
        if self.closed {
            return Err(RedactError::Closed);
        }

        self.buffer.extend_from_slice(data);

        let keep = self.redactor.longest_pattern_len();
        if self.buffer.len() < keep * 2 {
            return Ok(data.len());
        }

        let limit = self.buffer.len() - keep;
        let (clean, consumed) = self.redactor.sanitize_prefix(&self.buffer, limit);

        // Nothing decided yet, keep the whole buffer
        if consumed == 0 {
            return Ok(data.len());
        }

        // Decided bytes leave the buffer before the write so a failed
        // destination never sees them twice
        self.buffer.drain(..consumed);
        self.output.write_all(&clean).await?;
        self.output.flush().await?;

        Ok(data.len())
    }

    /// Sanitize and forward everything still buffered, then mark closed
    pub async fn close(&mut self) -> Result<(), RedactError> {
        if self.closed {
            return Err(RedactError::Closed);
        }
        self.closed = true;

        let remaining = std::mem::take(&mut self.buffer);
        let clean = self.redactor.sanitize(&remaining);
        self.output.write_all(&clean).await?;
        self.output.flush().await?;

        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Bytes accepted but not yet forwarded
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn get_ref(&self) -> &W {
        &self.output
    }

    pub fn into_inner(self) -> W {
        self.output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    const LONG_SECRET: &str = "this very long secret with some special #$% chars in it";

    fn secrets() -> SecretMap {
        let mut map = SecretMap::new();
        map.insert("mysecret".to_string(), "secret".to_string());
        map.insert("longsecret".to_string(), LONG_SECRET.to_string());
        map
    }

    async fn redact_chunks(map: &SecretMap, mode: RedactionMode, chunks: &[&[u8]]) -> Vec<u8> {
        let mut writer = RedactingWriter::from_secrets(Vec::new(), map, mode);
        for chunk in chunks {
            let n = writer.write(chunk).await.unwrap();
            assert_eq!(n, chunk.len());
        }
        writer.close().await.unwrap();
        writer.into_inner()
    }

    async fn redact(input: &str, mode: RedactionMode) -> String {
        let out = redact_chunks(&secrets(), mode, &[input.as_bytes()]).await;
        String::from_utf8(out).unwrap()
    }

    /// Sink that rejects every write
    struct BrokenSink;

    impl AsyncWrite for BrokenSink {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink closed")))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    /// Sink whose first write fails, later writes succeed
    struct FlakySink {
        fail_next: bool,
        data: Vec<u8>,
    }

    impl AsyncWrite for FlakySink {
        fn poll_write(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            if self.fail_next {
                self.fail_next = false;
                return Poll::Ready(Err(io::Error::other("hiccup")));
            }
            self.data.extend_from_slice(buf);
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_redacts_embedded_secret() {
        assert_eq!(
            redact(
                "this is a longer string with a secret embedded inside",
                RedactionMode::Asterisk
            )
            .await,
            "this is a longer string with a **** embedded inside"
        );
    }

    #[tokio::test]
    async fn test_short_input_without_secret() {
        assert_eq!(
            redact("this is very short", RedactionMode::Asterisk).await,
            "this is very short"
        );
        assert_eq!(redact("foo", RedactionMode::Asterisk).await, "foo");
    }

    #[tokio::test]
    async fn test_secret_alone() {
        assert_eq!(redact("secret", RedactionMode::Asterisk).await, "****");
    }

    #[tokio::test]
    async fn test_repeated_secret() {
        assert_eq!(
            redact("secretsecret", RedactionMode::Asterisk).await,
            "********"
        );
    }

    #[tokio::test]
    async fn test_long_secret_with_special_chars() {
        assert_eq!(
            redact(
                "can we have this very long secret with some special #$% chars in it obfuscated?",
                RedactionMode::Asterisk
            )
            .await,
            "can we have **** obfuscated?"
        );
    }

    #[tokio::test]
    async fn test_pass_through_mode() {
        assert_eq!(redact("secret", RedactionMode::None).await, "secret");
    }

    #[tokio::test]
    async fn test_name_and_hash_modes() {
        assert_eq!(
            redact("token=secret;", RedactionMode::Name).await,
            "token=mysecret;"
        );

        let hashed = redact("token=secret;", RedactionMode::Hash).await;
        assert!(hashed.starts_with("token=sha256:"));
        assert!(hashed.ends_with(';'));
        assert!(!hashed.contains("=secret"));
    }

    #[tokio::test]
    async fn test_longest_match_wins() {
        let mut map = SecretMap::new();
        map.insert("short".to_string(), "abc".to_string());
        map.insert("long".to_string(), "xxabcxx".to_string());

        let out = redact_chunks(&map, RedactionMode::Name, &[b"--xxabcxx-- abc".as_slice()]).await;
        assert_eq!(String::from_utf8(out).unwrap(), "--long-- short");
    }

    #[tokio::test]
    async fn test_longer_secret_wins_when_shorter_starts_first() {
        let mut map = SecretMap::new();
        map.insert("A".to_string(), "cb".to_string());
        map.insert("B".to_string(), "bcb".to_string());

        let out = redact_chunks(&map, RedactionMode::Name, &[b"cbcb".as_slice()]).await;
        assert_eq!(String::from_utf8(out).unwrap(), "cB");

        let input = b"xxxxxx cbcb yyyyyy";
        for size in 1..=input.len() {
            let chunks: Vec<&[u8]> = input.chunks(size).collect();
            let out = redact_chunks(&map, RedactionMode::Name, &chunks).await;
            assert_eq!(
                String::from_utf8(out).unwrap(),
                "xxxxxx cB yyyyyy",
                "chunk size {size}"
            );
        }
    }

    #[tokio::test]
    async fn test_secret_split_at_midpoint() {
        let mut map = SecretMap::new();
        map.insert("mysecret".to_string(), "secret".to_string());

        let mut writer = RedactingWriter::from_secrets(Vec::new(), &map, RedactionMode::Asterisk);
        writer.write(b"prefix data sec").await.unwrap();
        // Threshold reached: everything but the retained window is forwarded
        assert_eq!(writer.get_ref().as_slice(), b"prefix da");

        writer.write(b"ret suffix").await.unwrap();
        writer.close().await.unwrap();
        assert_eq!(
            String::from_utf8(writer.into_inner()).unwrap(),
            "prefix data **** suffix"
        );
    }

    #[tokio::test]
    async fn test_short_secret_inside_incomplete_long_one() {
        let mut map = SecretMap::new();
        map.insert("short".to_string(), "abc".to_string());
        map.insert("long".to_string(), "xxxxabcxxxxx".to_string());

        let out = redact_chunks(
            &map,
            RedactionMode::Name,
            &[b"0123456789abcdefghij xxxxabc".as_slice(), b"xxxxx done".as_slice()],
        )
        .await;
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "0123456789shortdefghij long done"
        );
    }

    #[tokio::test]
    async fn test_surrogate_is_not_redacted_again() {
        let mut map = SecretMap::new();
        map.insert("mysecret".to_string(), "secret".to_string());

        let out = redact_chunks(
            &map,
            RedactionMode::Name,
            &[b"a secret".as_slice(), b" and more text here".as_slice()],
        )
        .await;
        assert_eq!(String::from_utf8(out).unwrap(), "a mysecret and more text here");
    }

    #[tokio::test]
    async fn test_no_leak_for_any_chunk_size() {
        let input = format!(
            "start {LONG_SECRET} middle secret and again {LONG_SECRET}secret end of the stream"
        );
        let expected = "start **** middle **** and again ******** end of the stream";

        for size in 1..=input.len() {
            let chunks: Vec<&[u8]> = input.as_bytes().chunks(size).collect();
            let out = redact_chunks(&secrets(), RedactionMode::Asterisk, &chunks).await;
            let out = String::from_utf8(out).unwrap();
            assert_eq!(out, expected, "chunk size {size}");
            assert!(!out.contains("secret"));
        }
    }

    #[tokio::test]
    async fn test_byte_by_byte_pass_through_is_identical() {
        let input = b"secret output with \xff raw bytes secret";
        let chunks: Vec<&[u8]> = input.chunks(1).collect();

        let out = redact_chunks(&secrets(), RedactionMode::None, &chunks).await;
        assert_eq!(out, input.to_vec());

        let out = redact_chunks(&SecretMap::new(), RedactionMode::Asterisk, &chunks).await;
        assert_eq!(out, input.to_vec());
    }

    #[tokio::test]
    async fn test_pass_through_forwards_immediately() {
        let mut writer = RedactingWriter::from_secrets(Vec::new(), &secrets(), RedactionMode::None);
        writer.write(b"abc").await.unwrap();
        assert_eq!(writer.get_ref().as_slice(), b"abc");
        assert_eq!(writer.buffered_len(), 0);
    }

    #[tokio::test]
    async fn test_holds_back_until_threshold() {
        let mut writer =
            RedactingWriter::from_secrets(Vec::new(), &secrets(), RedactionMode::Asterisk);
        let longest = LONG_SECRET.len();

        writer.write(&vec![b'a'; longest]).await.unwrap();
        assert!(writer.get_ref().is_empty());
        assert_eq!(writer.buffered_len(), longest);

        writer.write(&vec![b'b'; longest]).await.unwrap();
        assert_eq!(writer.get_ref().len(), longest);
        assert_eq!(writer.buffered_len(), longest);
    }

    #[tokio::test]
    async fn test_flush_on_close() {
        let mut writer =
            RedactingWriter::from_secrets(Vec::new(), &secrets(), RedactionMode::Asterisk);
        writer.write(b"a secret").await.unwrap();
        assert!(writer.get_ref().is_empty());

        writer.close().await.unwrap();
        assert!(writer.is_closed());
        assert_eq!(writer.get_ref().as_slice(), b"a ****");
    }

    #[tokio::test]
    async fn test_write_after_close_is_rejected() {
        let mut writer =
            RedactingWriter::from_secrets(Vec::new(), &secrets(), RedactionMode::Asterisk);
        writer.close().await.unwrap();

        let err = writer.write(b"late").await.unwrap_err();
        assert!(err.is_closed());
        assert!(writer.close().await.unwrap_err().is_closed());
        assert!(writer.get_ref().is_empty());
    }

    #[tokio::test]
    async fn test_destination_failure_is_surfaced() {
        let mut writer = RedactingWriter::from_secrets(BrokenSink, &secrets(), RedactionMode::None);
        let err = writer.write(b"data").await.unwrap_err();
        assert!(matches!(err, RedactError::Io(_)));

        let mut writer =
            RedactingWriter::from_secrets(BrokenSink, &secrets(), RedactionMode::Asterisk);
        writer.write(b"short").await.unwrap();
        let err = writer.close().await.unwrap_err();
        assert!(matches!(err, RedactError::Io(_)));
    }

    #[tokio::test]
    async fn test_failed_write_is_not_repeated() {
        let mut map = SecretMap::new();
        map.insert("mysecret".to_string(), "secret".to_string());

        let sink = FlakySink {
            fail_next: true,
            data: Vec::new(),
        };
        let mut writer = RedactingWriter::from_secrets(sink, &map, RedactionMode::Asterisk);

        let err = writer.write(b"prefix data sec").await.unwrap_err();
        assert!(matches!(err, RedactError::Io(_)));
        assert_eq!(writer.buffered_len(), 6);

        writer.close().await.unwrap();
        assert_eq!(writer.into_inner().data, b"ta sec".to_vec());
    }

    #[test]
    fn test_redactor_skips_empty_entries() {
        let mut map = SecretMap::new();
        map.insert(String::new(), "orphan".to_string());
        map.insert("EMPTY".to_string(), String::new());
        map.insert("OK".to_string(), "value".to_string());

        let redactor = Redactor::new(&map, RedactionMode::Asterisk);
        assert_eq!(redactor.pairs().len(), 1);
        assert_eq!(redactor.pairs()[0].pattern, b"value");
        assert_eq!(redactor.longest_pattern_len(), 6);
    }

    #[test]
    fn test_redactor_sorts_longest_first() {
        let redactor = Redactor::new(&secrets(), RedactionMode::Asterisk);
        let lens: Vec<usize> = redactor.pairs().iter().map(|p| p.pattern.len()).collect();
        assert_eq!(lens, vec![LONG_SECRET.len(), 6]);
        assert_eq!(redactor.longest_pattern_len(), LONG_SECRET.len());
    }

    #[test]
    fn test_pass_through_has_no_retention() {
        let redactor = Redactor::new(&secrets(), RedactionMode::None);
        assert!(redactor.is_pass_through());
        assert!(redactor.pairs().is_empty());
        assert_eq!(redactor.longest_pattern_len(), 0);
        assert_eq!(redactor.sanitize(b"secret"), b"secret".to_vec());
    }
}

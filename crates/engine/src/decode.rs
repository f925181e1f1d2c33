use std::sync::Arc;

use futures::stream::BoxStream;
use futures::StreamExt;

use crate::{AdapterError, Row};

/// JsonRowStream lazily decodes a JSON-each-row response body into row
/// batches. Each polled chunk yields the complete lines it closes over;
/// a trailing partial line is buffered across chunks and flushed when the
/// body ends.
pub struct JsonRowStream {
    inner: BoxStream<'static, Result<bytes::Bytes, reqwest::Error>>,
    buffer: Vec<u8>,
    line: usize,
    done: bool,
}

impl JsonRowStream {
    pub fn new(inner: BoxStream<'static, Result<bytes::Bytes, reqwest::Error>>) -> JsonRowStream {
        JsonRowStream {
            inner,
            buffer: Vec::new(),
            line: 0,
            done: false,
        }
    }

    /// Drain complete lines out of the buffer into parsed rows.
    fn drain_complete(&mut self) -> Result<Vec<Row>, AdapterError> {
        let mut rows = Vec::new();
        while let Some(at) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=at).collect();
            self.line += 1;
            if let Some(row) = parse_line(&line, self.line)? {
                rows.push(row);
            }
        }
        Ok(rows)
    }

    fn flush_trailing(&mut self) -> Result<Option<Row>, AdapterError> {
        let trailing = std::mem::take(&mut self.buffer);
        self.line += 1;
        parse_line(&trailing, self.line)
    }
}

fn parse_line(line: &[u8], number: usize) -> Result<Option<Row>, AdapterError> {
    let text = std::str::from_utf8(line).unwrap_or("").trim();
    if text.is_empty() {
        return Ok(None);
    }
    serde_json::from_str::<Row>(text)
        .map(Some)
        .map_err(|err| AdapterError::Decode {
            line: number,
            source: Arc::new(err),
        })
}

impl futures::Stream for JsonRowStream {
    type Item = Result<Vec<Row>, AdapterError>;

    fn poll_next(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        use std::task::Poll;

        loop {
            if self.done {
                return Poll::Ready(None);
            }

            match self.inner.poll_next_unpin(cx) {
                Poll::Ready(Some(Ok(chunk))) => {
                    self.buffer.extend_from_slice(&chunk);
                    match self.drain_complete() {
                        Ok(rows) if rows.is_empty() => continue, // Requires more chunks.
                        Ok(rows) => return Poll::Ready(Some(Ok(rows))),
                        Err(err) => {
                            self.done = true;
                            return Poll::Ready(Some(Err(err)));
                        }
                    }
                }
                Poll::Ready(Some(Err(err))) => {
                    self.done = true;
                    return Poll::Ready(Some(Err(err.into())));
                }
                Poll::Ready(None) => {
                    self.done = true;
                    match self.flush_trailing() {
                        Ok(Some(row)) => return Poll::Ready(Some(Ok(vec![row]))),
                        Ok(None) => return Poll::Ready(None),
                        Err(err) => return Poll::Ready(Some(Err(err))),
                    }
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use futures::TryStreamExt;

    fn chunks(parts: Vec<&'static str>) -> BoxStream<'static, Result<bytes::Bytes, reqwest::Error>>
    {
        futures::stream::iter(parts.into_iter().map(|p| Ok(bytes::Bytes::from(p)))).boxed()
    }

    #[tokio::test]
    async fn lines_split_across_chunks_reassemble() {
        let stream = JsonRowStream::new(chunks(vec![
            "{\"a\": 1}\n{\"a\"",
            ": 2}\n",
            "{\"a\": 3}",
        ]));
        let batches: Vec<Vec<Row>> = stream.try_collect().await.unwrap();

        let rows: Vec<i64> = batches
            .iter()
            .flatten()
            .map(|row| row["a"].as_i64().unwrap())
            .collect();
        assert_eq!(rows, vec![1, 2, 3]);

        // The trailing partial line flushed as its own final batch.
        assert_eq!(batches.last().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn malformed_lines_terminate_the_stream() {
        let stream = JsonRowStream::new(chunks(vec!["{\"a\": 1}\nnot json\n{\"a\": 2}\n"]));
        let result: Result<Vec<Vec<Row>>, _> = stream.try_collect().await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn empty_body_yields_no_batches() {
        let stream = JsonRowStream::new(chunks(vec![""]));
        let batches: Vec<Vec<Row>> = stream.try_collect().await.unwrap();
        assert!(batches.is_empty());
    }
}

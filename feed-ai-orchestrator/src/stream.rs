//! Transcript streaming.
//!
//! A chat transcript is a lazily growing ordered sequence: a stream first
//! replays the turns already appended, then yields each new turn as it lands.
//! It ends when the session it was taken from is torn down.

use futures::Stream;
use pin_project_lite::pin_project;
use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::warn;

use crate::types::{ChatTurn, SessionId};

pin_project! {
    /// Stream of turns from one chat session.
    pub struct TranscriptStream {
        #[pin]
        live: BroadcastStream<ChatTurn>,
        session_id: SessionId,
        // Turns appended before the stream was opened
        backlog: VecDeque<ChatTurn>,
        // Turns yielded so far
        yielded: usize,
        // Live turns lost because this reader fell behind
        skipped: u64,
        complete: bool,
    }
}

impl TranscriptStream {
    /// Create a stream over `backlog` followed by everything `receiver` sees.
    ///
    /// The receiver must have been subscribed while the backlog snapshot was
    /// taken under the same lock, or turns may be duplicated or lost.
    pub(crate) fn new(
        session_id: SessionId,
        backlog: Vec<ChatTurn>,
        receiver: broadcast::Receiver<ChatTurn>,
    ) -> Self {
        Self {
            live: BroadcastStream::new(receiver),
            session_id,
            backlog: backlog.into(),
            yielded: 0,
            skipped: 0,
            complete: false,
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Number of turns yielded so far.
    pub fn yielded(&self) -> usize {
        self.yielded
    }

    /// Number of live turns this reader missed by lagging.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Whether the session has been torn down and every turn delivered.
    pub fn is_complete(&self) -> bool {
        self.complete
    }
}

impl Stream for TranscriptStream {
    type Item = ChatTurn;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        if let Some(turn) = this.backlog.pop_front() {
            *this.yielded += 1;
            return Poll::Ready(Some(turn));
        }

        loop {
            match this.live.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(turn))) => {
                    *this.yielded += 1;
                    return Poll::Ready(Some(turn));
                }
                Poll::Ready(Some(Err(BroadcastStreamRecvError::Lagged(missed)))) => {
                    *this.skipped += missed;
                    warn!(session_id = %this.session_id, missed, "Transcript reader lagged");
                }
                Poll::Ready(None) => {
                    *this.complete = true;
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_backlog_then_live_turns() {
        let (sender, receiver) = broadcast::channel(8);
        let backlog = vec![ChatTurn::user("Hi"), ChatTurn::assistant("Hello")];
        let mut stream = TranscriptStream::new(SessionId::new("s1"), backlog, receiver);

        sender.send(ChatTurn::user("How is AAPL?")).unwrap();
        drop(sender);

        let texts: Vec<String> = (&mut stream).map(|turn| turn.text).collect().await;

        assert_eq!(texts, vec!["Hi", "Hello", "How is AAPL?"]);
        assert_eq!(stream.yielded(), 3);
        assert!(stream.is_complete());
    }

    #[tokio::test]
    async fn test_lagging_reader_skips_and_continues() {
        let (sender, receiver) = broadcast::channel(2);
        let mut stream = TranscriptStream::new(SessionId::new("s1"), Vec::new(), receiver);

        for i in 0..4 {
            sender.send(ChatTurn::user(format!("q{i}"))).unwrap();
        }
        drop(sender);

        let texts: Vec<String> = (&mut stream).map(|turn| turn.text).collect().await;

        assert_eq!(texts, vec!["q2", "q3"]);
        assert_eq!(stream.skipped(), 2);
    }
}

//! Racing combinators that tell "no value" apart from "failed".
//!
//! Every candidate gets its own child of the caller's cancellation token.
//! As soon as one candidate produces a value, the tokens of all other
//! candidates are cancelled and their futures dropped. Side effects a
//! loser already issued are not undone.
//!
//! ```text
//!   outcomes of the candidates        result
//!   ─────────────────────────────     ─────────────────────────────
//!   any value                         Ok(Some(first value))
//!   only empties                      Ok(None)
//!   empties and errors, no value      Err(all errors aggregated)
//! ```

use futures::FutureExt;
use futures::future::BoxFuture;
use futures::stream::{self, FuturesUnordered, StreamExt};
use sponge_types::{BlockStream, ProviderError};
use tokio_util::sync::CancellationToken;

/// Race zero-or-one-value candidates.
///
/// Each element of `launch` starts one candidate given its cancellation
/// token. The first `Ok(Some(_))` wins.
///
/// # Errors
///
/// The aggregated candidate errors when no candidate produced a value
/// and at least one failed.
pub async fn any_first<T, I, F>(parent: &CancellationToken, launch: I) -> Result<Option<T>, ProviderError>
where
    I: IntoIterator<Item = F>,
    F: FnOnce(CancellationToken) -> BoxFuture<'static, Result<Option<T>, ProviderError>>,
{
    let mut tokens = Vec::new();
    let mut pending = FuturesUnordered::new();
    for (index, start) in launch.into_iter().enumerate() {
        let token = parent.child_token();
        tokens.push(token.clone());
        pending.push(start(token).map(move |outcome| (index, outcome)));
    }

    let mut errors = Vec::new();
    while let Some((index, outcome)) = pending.next().await {
        match outcome {
            Ok(Some(value)) => {
                cancel_losers(&tokens, index);
                return Ok(Some(value));
            }
            Ok(None) => {}
            Err(err) => errors.push(err),
        }
    }

    ProviderError::aggregate(errors).map_or(Ok(None), Err)
}

/// Race block streams.
///
/// The first stream to yield a block wins; the block is put back in front
/// of the rest of that stream and the combined stream is returned. Streams
/// that end without a block count as empty, and a stream whose first item
/// is an error counts as failed.
///
/// # Errors
///
/// The aggregated errors when no stream yielded a block and at least one
/// failed.
pub async fn any_first_stream<I, F>(parent: &CancellationToken, launch: I) -> Result<Option<BlockStream>, ProviderError>
where
    I: IntoIterator<Item = F>,
    F: FnOnce(CancellationToken) -> BlockStream,
{
    let mut tokens = Vec::new();
    let mut pending = FuturesUnordered::new();
    for (index, start) in launch.into_iter().enumerate() {
        let token = parent.child_token();
        tokens.push(token.clone());
        pending.push(start(token).into_future().map(move |outcome| (index, outcome)));
    }

    let mut errors = Vec::new();
    while let Some((index, (first, rest))) = pending.next().await {
        match first {
            Some(Ok(block)) => {
                cancel_losers(&tokens, index);
                return Ok(Some(stream::once(async move { Ok(block) }).chain(rest).boxed()));
            }
            Some(Err(err)) => errors.push(err),
            None => {}
        }
    }

    ProviderError::aggregate(errors).map_or(Ok(None), Err)
}

fn cancel_losers(tokens: &[CancellationToken], winner: usize) {
    for (index, token) in tokens.iter().enumerate() {
        if index != winner {
            token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use futures::future;
    use futures::TryStreamExt;
    use sponge_types::{Block, Metadata};

    use super::*;

    type Launch<T> = Box<dyn FnOnce(CancellationToken) -> BoxFuture<'static, Result<Option<T>, ProviderError>>>;

    fn value(v: u64) -> Launch<Metadata> {
        Box::new(move |_| future::ready(Ok(Some(Metadata::known(v)))).boxed())
    }

    fn empty() -> Launch<Metadata> {
        Box::new(|_| future::ready(Ok(None)).boxed())
    }

    fn failing(msg: &'static str) -> Launch<Metadata> {
        Box::new(move |_| future::ready(Err(ProviderError::upstream(std::io::Error::other(msg)))).boxed())
    }

    /// Resolves to a value only after yielding to the executor a few times,
    /// so every ready candidate finishes first.
    fn late_value(v: u64) -> Launch<Metadata> {
        Box::new(move |_| {
            async move {
                for _ in 0..4 {
                    tokio::task::yield_now().await;
                }
                Ok(Some(Metadata::known(v)))
            }
            .boxed()
        })
    }

    fn blocks(ids: &[u32]) -> BlockStream {
        let items: Vec<_> = ids
            .iter()
            .map(|&id| Ok(Block::from_id(id, vec![u8::try_from(id).unwrap()]).unwrap()))
            .collect();
        stream::iter(items).boxed()
    }

    fn failing_stream() -> BlockStream {
        stream::iter([Err(ProviderError::upstream(std::io::Error::other("down")))]).boxed()
    }

    #[tokio::test]
    async fn value_among_empties_wins() {
        let result = any_first(&CancellationToken::new(), vec![empty(), value(7), empty()]).await;
        assert_eq!(result.unwrap(), Some(Metadata::known(7)));
    }

    #[tokio::test]
    async fn all_empty_is_empty_not_error() {
        let result = any_first(&CancellationToken::new(), vec![empty(), empty(), empty()]).await;
        assert_eq!(result.unwrap(), None);
    }

    #[tokio::test]
    async fn empties_and_one_error_is_that_error() {
        let result = any_first(&CancellationToken::new(), vec![empty(), failing("boom"), empty()]).await;
        let err = result.unwrap_err();
        assert!(matches!(err, ProviderError::Upstream(_)));
        assert_eq!(err.to_string(), "upstream provider failed: boom");
    }

    #[tokio::test]
    async fn value_beats_an_earlier_error() {
        let result = any_first(&CancellationToken::new(), vec![failing("boom"), late_value(3), empty()]).await;
        assert_eq!(result.unwrap(), Some(Metadata::known(3)));
    }

    #[tokio::test]
    async fn several_errors_are_aggregated() {
        let result = any_first(&CancellationToken::new(), vec![failing("a"), empty(), failing("b")]).await;
        let err = result.unwrap_err();
        assert!(matches!(err, ProviderError::Multiple { .. }));
        assert_eq!(err.leaves().count(), 2);
    }

    #[tokio::test]
    async fn no_candidates_is_empty() {
        let result = any_first(&CancellationToken::new(), Vec::<Launch<Metadata>>::new()).await;
        assert_eq!(result.unwrap(), None);
    }

    #[tokio::test]
    async fn winner_cancels_losers() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let launches: Vec<Launch<Metadata>> = (0..3u64)
            .map(|i| {
                let seen = Arc::clone(&seen);
                Box::new(move |token: CancellationToken| {
                    seen.lock().unwrap().push(token.clone());
                    async move {
                        if i == 1 {
                            return Ok(Some(Metadata::known(i)));
                        }
                        token.cancelled().await;
                        Ok(None)
                    }
                    .boxed()
                }) as Launch<Metadata>
            })
            .collect();

        let result = any_first(&CancellationToken::new(), launches).await;
        assert_eq!(result.unwrap(), Some(Metadata::known(1)));

        let tokens = seen.lock().unwrap();
        let cancelled: Vec<_> = tokens.iter().map(CancellationToken::is_cancelled).collect();
        assert_eq!(cancelled, vec![true, false, true]);
    }

    #[tokio::test]
    async fn parent_cancellation_reaches_candidates() {
        let parent = CancellationToken::new();
        parent.cancel();
        let launch: Launch<Metadata> = Box::new(|token: CancellationToken| {
            async move {
                token.cancelled().await;
                Ok(None)
            }
            .boxed()
        });
        assert_eq!(any_first(&parent, vec![launch]).await.unwrap(), None);
    }

    #[tokio::test]
    async fn first_stream_to_yield_wins_and_keeps_its_tail() {
        let launches: Vec<Box<dyn FnOnce(CancellationToken) -> BlockStream>> = vec![
            Box::new(|_| stream::pending().boxed()),
            Box::new(|_| blocks(&[0, 1, 2])),
            Box::new(|_| stream::empty().boxed()),
        ];
        let winner = any_first_stream(&CancellationToken::new(), launches).await.unwrap().unwrap();
        let ids: Vec<_> = winner.map_ok(|b| b.id()).try_collect().await.unwrap();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn stream_value_beats_stream_errors() {
        let launches: Vec<Box<dyn FnOnce(CancellationToken) -> BlockStream>> = vec![
            Box::new(|_| failing_stream()),
            Box::new(|_| stream::empty().boxed()),
            Box::new(|_| blocks(&[4])),
        ];
        let winner = any_first_stream(&CancellationToken::new(), launches).await.unwrap().unwrap();
        let ids: Vec<_> = winner.map_ok(|b| b.id()).try_collect().await.unwrap();
        assert_eq!(ids, vec![4]);
    }

    #[tokio::test]
    async fn empty_streams_give_no_winner() {
        let launches: Vec<Box<dyn FnOnce(CancellationToken) -> BlockStream>> =
            vec![Box::new(|_| stream::empty().boxed()), Box::new(|_| stream::empty().boxed())];
        let winner = any_first_stream(&CancellationToken::new(), launches).await.unwrap();
        assert!(winner.is_none());
    }

    #[tokio::test]
    async fn failing_streams_without_winner_fail() {
        let launches: Vec<Box<dyn FnOnce(CancellationToken) -> BlockStream>> =
            vec![Box::new(|_| failing_stream()), Box::new(|_| stream::empty().boxed())];
        let result = any_first_stream(&CancellationToken::new(), launches).await;
        assert!(matches!(result, Err(ProviderError::Upstream(_))));
    }
}

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::Bytes;
use futures::Stream;
use tokio::runtime::Handle;
use tracing::{debug, warn};
use visualfoundry_core::RenderArtifacts;

/// Response body that owns the render's temp files and releases them once the
/// client has received the last chunk, hit a read error, or gone away.
pub struct CleanupStream<S> {
    inner: S,
    artifacts: Option<RenderArtifacts>,
}

impl<S> CleanupStream<S> {
    pub fn new(inner: S, artifacts: RenderArtifacts) -> Self {
        Self {
            inner,
            artifacts: Some(artifacts),
        }
    }

    /// Releases the artifacts. Their removal is blocking file IO, so it runs on
    /// the blocking pool whenever a runtime is available.
    fn finish(&mut self) {
        let Some(artifacts) = self.artifacts.take() else {
            return;
        };
        debug!(output = ?artifacts.output_path(), "render stream finished");
        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || drop(artifacts));
            }
            Err(_) => drop(artifacts),
        }
    }
}

impl<S> Drop for CleanupStream<S> {
    fn drop(&mut self) {
        self.finish();
    }
}

impl<S> Stream for CleanupStream<S>
where
    S: Stream<Item = io::Result<Bytes>> + Unpin,
{
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let polled = Pin::new(&mut self.inner).poll_next(cx);
        match &polled {
            Poll::Ready(None) => self.finish(),
            Poll::Ready(Some(Err(error))) => {
                warn!(%error, "unable to stream render");
                self.finish();
            }
            _ => {}
        }
        polled
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::time::Duration;

    use futures::{stream, StreamExt};
    use tempfile::TempDir;

    use super::*;

    async fn wait_until_removed(path: &Path) {
        for _ in 0..200 {
            if !path.exists() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("{} was not removed", path.display());
    }

    #[tokio::test]
    async fn files_survive_until_stream_ends() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in.png");
        let output = dir.path().join("out.mp4");
        std::fs::write(&input, b"png").unwrap();
        std::fs::write(&output, b"mp4").unwrap();
        let mut artifacts = RenderArtifacts::new(input.clone());
        artifacts.track_output(output.clone());

        let chunks: Vec<io::Result<Bytes>> =
            vec![Ok(Bytes::from_static(b"a")), Ok(Bytes::from_static(b"b"))];
        let mut body = CleanupStream::new(stream::iter(chunks), artifacts);

        assert!(body.next().await.is_some());
        assert!(input.exists() && output.exists());
        assert!(body.next().await.is_some());
        assert!(body.next().await.is_none());
        wait_until_removed(&input).await;
        wait_until_removed(&output).await;
    }

    #[test]
    fn finishing_outside_a_runtime_removes_inline() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in.png");
        std::fs::write(&input, b"png").unwrap();
        let chunks: Vec<io::Result<Bytes>> = Vec::new();
        drop(CleanupStream::new(stream::iter(chunks), RenderArtifacts::new(input.clone())));
        assert!(!input.exists());
    }

    #[tokio::test]
    async fn dropped_stream_releases_files() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in.png");
        std::fs::write(&input, b"png").unwrap();
        let chunks: Vec<io::Result<Bytes>> = vec![Ok(Bytes::from_static(b"a"))];
        let body = CleanupStream::new(stream::iter(chunks), RenderArtifacts::new(input.clone()));
        drop(body);
        wait_until_removed(&input).await;
    }
}

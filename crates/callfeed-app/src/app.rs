//! Main application logic.

use crate::config::AppConfig;
use crate::error::AppResult;
use crate::render::Renderer;
use callfeed_feed::{spawn_feed, FeedError, FeedHandle, FeedStatus, FeedView};
use callfeed_snapshot::SnapshotClient;
use callfeed_ws::WsStreamSource;
use std::future::Future;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Terminal feed client.
pub struct Application {
    config: AppConfig,
    renderer: Renderer,
}

impl Application {
    pub fn new(config: AppConfig) -> AppResult<Self> {
        config.validate()?;
        let renderer = Renderer::new(config.render.clone());
        Ok(Self { config, renderer })
    }

    /// Activate the feed against the configured origin.
    pub fn activate(&self) -> AppResult<FeedHandle> {
        let snapshots = SnapshotClient::new(&self.config.origin, self.config.snapshot_timeout())?;
        let streams = WsStreamSource::new(self.config.stream_config());

        info!(
            origin = %self.config.origin,
            stream_url = %streams.config().url,
            limit = self.config.snapshot.limit,
            "Activating feed"
        );

        let (handle, _join) = spawn_feed(
            self.config.feed_config(),
            Arc::new(snapshots),
            Arc::new(streams),
        );
        Ok(handle)
    }

    /// Run until Ctrl-C, drawing to stdout.
    pub async fn run(self) -> AppResult<()> {
        let shutdown = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(?e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            info!("Shutdown signal received");
        };
        let mut stdout = std::io::stdout();
        self.run_until(shutdown, &mut stdout).await
    }

    /// Run until `shutdown` resolves, drawing every new view to `out`.
    pub async fn run_until<F, W>(mut self, shutdown: F, out: &mut W) -> AppResult<()>
    where
        F: Future<Output = ()>,
        W: Write,
    {
        let handle = self.activate()?;
        let mut views = handle.subscribe();

        let retry_every = Duration::from_millis(self.config.feed.snapshot_retry_interval_ms);
        let mut retry_interval = tokio::time::interval(retry_every.max(Duration::from_millis(1)));
        retry_interval.reset();

        tokio::pin!(shutdown);

        self.draw(&handle.view(), out)?;

        info!("Entering main event loop");
        loop {
            tokio::select! {
                changed = views.changed() => {
                    if changed.is_err() {
                        warn!("Feed stopped unexpectedly");
                        break;
                    }
                    let view = views.borrow_and_update().clone();
                    self.draw(&view, out)?;
                }

                _ = retry_interval.tick(), if !retry_every.is_zero() => {
                    if wants_snapshot_retry(&handle.view()) {
                        debug!("Requesting snapshot retry");
                        handle.retry_snapshot().await;
                    }
                }

                () = &mut shutdown => break,
            }
        }

        let final_view = handle.view();
        info!(
            messages = final_view.len(),
            status = %final_view.status,
            "Shutting down"
        );
        handle.shutdown().await;
        Ok(())
    }

    fn draw<W: Write>(&mut self, view: &FeedView, out: &mut W) -> AppResult<()> {
        if let Some(frame) = self.renderer.next_frame(view) {
            out.write_all(frame.as_bytes())?;
            out.flush()?;
        }
        Ok(())
    }
}

/// Whether the owner should ask for another snapshot.
fn wants_snapshot_retry(view: &FeedView) -> bool {
    view.status == FeedStatus::Error
        && matches!(&view.last_error, Some(FeedError::Fetch(e)) if e.is_retryable())
}

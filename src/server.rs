//! TCP listener that hands each connection its own session task.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, info, info_span, warn};

use crate::logging::generate_session_id;
use crate::session::{SessionContext, run_session};

/// How long running sessions get to finish on their own after shutdown starts.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);
/// How long cancelled sessions get to wind down before shutdown fails.
pub const FORCE_DEADLINE: Duration = Duration::from_secs(5);

/// Pause after a failed accept so a persistent error does not spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

pub struct Server {
    listener: TcpListener,
    context: Arc<SessionContext>,
    tracker: TaskTracker,
    force: CancellationToken,
    grace: Duration,
    force_deadline: Duration,
}

impl Server {
    /// Bind the listening socket. Failure here is fatal for the process.
    pub async fn bind(address: &str, context: Arc<SessionContext>) -> Result<Self> {
        let listener = TcpListener::bind(address)
            .await
            .with_context(|| format!("failed to bind {}", address))?;
        Ok(Self {
            listener,
            context,
            tracker: TaskTracker::new(),
            force: CancellationToken::new(),
            grace: SHUTDOWN_GRACE,
            force_deadline: FORCE_DEADLINE,
        })
    }

    #[cfg(test)]
    pub fn with_shutdown_timeouts(mut self, grace: Duration, force_deadline: Duration) -> Self {
        self.grace = grace;
        self.force_deadline = force_deadline;
        self
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until `shutdown` resolves, then drain sessions.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<()> {
        tokio::pin!(shutdown);
        info!(address = %self.local_addr()?, "server_listening");

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => self.spawn_session(stream, peer),
                    Err(err) => {
                        warn!(error = %err, "accept_failed");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
            }
        }

        let Server {
            listener,
            tracker,
            force,
            grace,
            force_deadline,
            ..
        } = self;
        drop(listener);
        tracker.close();
        info!(active_sessions = tracker.len(), "shutdown_started");

        if tokio::time::timeout(grace, tracker.wait()).await.is_ok() {
            info!("shutdown_complete");
            return Ok(());
        }

        warn!(
            active_sessions = tracker.len(),
            grace_secs = grace.as_secs_f64(),
            "shutdown_grace_expired"
        );
        force.cancel();
        if tokio::time::timeout(force_deadline, tracker.wait())
            .await
            .is_err()
        {
            bail!(
                "{} session(s) still running after forced shutdown",
                tracker.len()
            );
        }
        info!("shutdown_complete");
        Ok(())
    }

    fn spawn_session(&self, stream: TcpStream, peer: SocketAddr) {
        if let Err(err) = stream.set_nodelay(true) {
            warn!(peer = %peer, error = %err, "set_nodelay_failed");
        }
        let id = generate_session_id();
        let span = info_span!("session", id = %id, peer = %peer);
        let context = Arc::clone(&self.context);
        let cancel = self.force.child_token();

        self.tracker.spawn(
            async move {
                info!("session_start");
                let started = tokio::time::Instant::now();
                let result = run_session(stream, context, cancel).await;
                let duration_secs = started.elapsed().as_secs_f64();
                match result {
                    Ok(end) => info!(reason = end.as_str(), duration_secs, "session_end"),
                    Err(err) => warn!(error = %err, duration_secs, "session_end"),
                }
            }
            .instrument(span),
        );
    }
}

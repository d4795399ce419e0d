//! Background daemon: request queue, inactivity timer and shutdown.
//!
//! The tokio runtime only accepts connections and runs the timer. Menu
//! cycles run on one blocking worker thread that owns the database.

use crate::controller::DefaultAction;
use crate::ipc::{self, AuthToken};
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Flags shared between the worker, the timer and the listener.
#[derive(Debug, Default)]
pub struct DaemonState {
    kill: AtomicBool,
    cache_expired: AtomicBool,
}

impl DaemonState {
    pub fn request_kill(&self) {
        self.kill.store(true, Ordering::SeqCst);
    }

    pub fn kill_requested(&self) -> bool {
        self.kill.load(Ordering::SeqCst)
    }

    pub fn expire_cache(&self) {
        self.cache_expired.store(true, Ordering::SeqCst);
    }

    pub fn cache_expired(&self) -> bool {
        self.cache_expired.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    Show(DefaultAction),
    /// Wakes the worker so it notices the kill flag.
    Shutdown,
}

/// Sending half of the capacity-one request queue.
#[derive(Debug, Clone)]
pub struct RequestQueue {
    tx: mpsc::Sender<Request>,
}

pub fn request_channel() -> (RequestQueue, mpsc::Receiver<Request>) {
    let (tx, rx) = mpsc::channel(1);
    (RequestQueue { tx }, rx)
}

impl RequestQueue {
    /// Enqueue `request`, waiting while another one is pending.
    ///
    /// Returns `false` once the worker has stopped.
    pub async fn submit(&self, request: Request) -> bool {
        self.tx.send(request).await.is_ok()
    }

    pub fn try_submit(&self, request: Request) -> bool {
        self.tx.try_send(request).is_ok()
    }

    /// No request is waiting to be picked up.
    pub fn is_empty(&self) -> bool {
        self.tx.capacity() == self.tx.max_capacity()
    }
}

/// Fires once after `period` without a reset.
pub struct InactivityTimer {
    runtime: Handle,
    period: Duration,
    state: Arc<DaemonState>,
    queue: RequestQueue,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl InactivityTimer {
    pub fn new(runtime: Handle, period: Duration, state: Arc<DaemonState>, queue: RequestQueue) -> Self {
        Self {
            runtime,
            period,
            state,
            queue,
            task: Mutex::new(None),
        }
    }

    /// Restart the countdown. Callable from any thread.
    pub fn reset(&self) {
        let period = self.period;
        let state = self.state.clone();
        let queue = self.queue.clone();
        let task = self.runtime.spawn(async move {
            tokio::time::sleep(period).await;
            expire(&state, &queue);
        });

        let previous = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(task);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    pub fn cancel(&self) {
        let task = self.task.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(task) = task {
            task.abort();
        }
    }
}

fn expire(state: &DaemonState, queue: &RequestQueue) {
    tracing::info!("Inactivity timeout reached");
    state.expire_cache();
    if queue.is_empty() {
        state.request_kill();
        queue.try_submit(Request::Shutdown);
    }
}

/// Receiving side handed to the blocking worker thread.
pub struct Worker {
    requests: mpsc::Receiver<Request>,
    state: Arc<DaemonState>,
    timer: Arc<InactivityTimer>,
}

impl Worker {
    pub fn state(&self) -> Arc<DaemonState> {
        self.state.clone()
    }

    /// Run `cycle` for each request, one at a time, until killed.
    ///
    /// Must be called from a blocking thread.
    pub fn drive(mut self, mut cycle: impl FnMut(DefaultAction)) {
        while let Some(request) = self.requests.blocking_recv() {
            if self.state.kill_requested() {
                break;
            }
            if let Request::Show(action) = request {
                self.timer.reset();
                cycle(action);
            }
            if self.state.cache_expired() {
                self.state.request_kill();
            }
            if self.state.kill_requested() {
                break;
            }
        }
        self.timer.cancel();
        tracing::debug!("Worker loop finished");
    }
}

pub struct Daemon {
    queue: RequestQueue,
    worker: Worker,
}

impl Daemon {
    /// Must be called inside the tokio runtime.
    pub fn new(period: Duration) -> Self {
        let state = Arc::new(DaemonState::default());
        let (queue, requests) = request_channel();
        let timer = Arc::new(InactivityTimer::new(
            Handle::current(),
            period,
            state.clone(),
            queue.clone(),
        ));
        Self {
            queue,
            worker: Worker {
                requests,
                state,
                timer,
            },
        }
    }

    /// Serve until `work` returns, then stop listening and remove the auth file.
    ///
    /// `work` runs on a blocking thread and is expected to drive the
    /// [`Worker`] it is given. The initial request is queued before any
    /// connection is accepted.
    pub async fn run<F>(
        self,
        listener: TcpListener,
        token: AuthToken,
        auth_path: PathBuf,
        initial: DefaultAction,
        work: F,
    ) -> Result<()>
    where
        F: FnOnce(Worker) -> Result<()> + Send + 'static,
    {
        let Daemon { queue, worker } = self;
        queue.submit(Request::Show(initial)).await;

        tracing::info!("Daemon listening on 127.0.0.1:{}", token.port);
        let listening = tokio::spawn(ipc::accept_loop(listener, token.authkey, queue));

        let result = tokio::task::spawn_blocking(move || work(worker))
            .await
            .context("Worker thread panicked");

        listening.abort();
        ipc::remove_auth_file(&auth_path);
        tracing::info!("Daemon stopped");
        result?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    fn timer(period: Duration) -> (Arc<DaemonState>, RequestQueue, mpsc::Receiver<Request>, InactivityTimer) {
        let state = Arc::new(DaemonState::default());
        let (queue, rx) = request_channel();
        let timer = InactivityTimer::new(Handle::current(), period, state.clone(), queue.clone());
        (state, queue, rx, timer)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_idle_expiry_kills_daemon() {
        let (state, _queue, mut rx, timer) = timer(Duration::from_millis(20));
        timer.reset();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(state.cache_expired());
        assert!(state.kill_requested());
        assert_eq!(rx.try_recv().unwrap(), Request::Shutdown);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_reset_postpones_expiry() {
        let (state, _queue, _rx, timer) = timer(Duration::from_millis(300));
        timer.reset();
        tokio::time::sleep(Duration::from_millis(150)).await;
        timer.reset();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(!state.cache_expired());

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(state.cache_expired());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_cancelled_timer_never_fires() {
        let (state, _queue, _rx, timer) = timer(Duration::from_millis(20));
        timer.reset();
        timer.cancel();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!state.cache_expired());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_pending_request_only_marks_expired() {
        let (state, queue, mut rx, timer) = timer(Duration::from_millis(20));
        assert!(queue.try_submit(Request::Show(DefaultAction::TypeEntry)));
        timer.reset();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(state.cache_expired());
        assert!(!state.kill_requested());
        assert_eq!(rx.try_recv().unwrap(), Request::Show(DefaultAction::TypeEntry));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_worker_handles_requests_one_at_a_time() {
        let daemon = Daemon::new(Duration::from_secs(3600));
        let Daemon { queue, worker } = daemon;
        let state = worker.state();

        let submitters: Vec<_> = (0..3)
            .map(|_| {
                let queue = queue.clone();
                tokio::spawn(async move { queue.submit(Request::Show(DefaultAction::TypePassword)).await })
            })
            .collect();

        let active = Arc::new(AtomicUsize::new(0));
        let handled = Arc::new(AtomicUsize::new(0));
        let worker_state = state.clone();
        let (active_in, handled_in) = (active.clone(), handled.clone());
        let driving = tokio::task::spawn_blocking(move || {
            worker.drive(|_| {
                assert_eq!(active_in.fetch_add(1, Ordering::SeqCst), 0);
                std::thread::sleep(Duration::from_millis(20));
                active_in.fetch_sub(1, Ordering::SeqCst);
                if handled_in.fetch_add(1, Ordering::SeqCst) == 2 {
                    worker_state.request_kill();
                }
            })
        });

        for submitter in submitters {
            assert!(submitter.await.unwrap());
        }
        driving.await.unwrap();
        assert_eq!(handled.load(Ordering::SeqCst), 3);
        assert!(!queue.submit(Request::Shutdown).await);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_expired_cache_stops_after_cycle() {
        let daemon = Daemon::new(Duration::from_secs(3600));
        let Daemon { queue, worker } = daemon;
        let state = worker.state();
        queue.submit(Request::Show(DefaultAction::None)).await;

        let seen = Arc::new(AtomicUsize::new(0));
        let (seen_in, state_in) = (seen.clone(), state.clone());
        tokio::task::spawn_blocking(move || {
            worker.drive(|_| {
                seen_in.fetch_add(1, Ordering::SeqCst);
                state_in.expire_cache();
            })
        })
        .await
        .unwrap();

        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert!(state.kill_requested());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_run_serves_initial_request_and_removes_auth_file() {
        let dir = TempDir::new().unwrap();
        let auth_path = dir.path().join(".keepmenu-auth");
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let token = AuthToken {
            port: listener.local_addr().unwrap().port(),
            authkey: "key".to_string(),
        };
        token.save(&auth_path).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_in = seen.clone();
        let daemon = Daemon::new(Duration::from_secs(3600));
        daemon
            .run(listener, token, auth_path.clone(), DefaultAction::ViewEntry, move |worker| {
                let state = worker.state();
                worker.drive(|action| {
                    seen_in.lock().unwrap().push(action);
                    state.request_kill();
                });
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), [DefaultAction::ViewEntry]);
        assert!(!auth_path.exists());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_run_reports_worker_error() {
        let dir = TempDir::new().unwrap();
        let auth_path = dir.path().join(".keepmenu-auth");
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let token = AuthToken {
            port: listener.local_addr().unwrap().port(),
            authkey: "key".to_string(),
        };

        let daemon = Daemon::new(Duration::from_secs(3600));
        let err = daemon
            .run(listener, token, auth_path, DefaultAction::None, |_| {
                anyhow::bail!("unlock failed")
            })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "unlock failed");
    }
}

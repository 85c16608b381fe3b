//! The engine process handle: lazy launch, serialized startup, idle-gated
//! teardown, and the stdio connection multiplexer.
//!
//! At most one engine process exists at a time. The slot holding it is
//! guarded by an async mutex; a launch in flight is represented by a watch
//! channel that concurrent callers await, so two simultaneous captures can
//! never start two browsers. Teardown happens with the slot locked, which
//! makes it atomic as observed by captures: they either see the old ready
//! handle (and hold an activity guard that blocks teardown) or see an empty
//! slot and relaunch.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{oneshot, watch, Mutex};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::browser::helper::{
    ensure_node_available, ensure_playwright_available, map_spawn_error, EngineReply,
    EngineRequest, ENGINE_SCRIPT,
};
use crate::config::EngineOptions;
use crate::error::{PageshotError, Result};
use crate::formatting::format_duration;

/// Liveness of the engine process handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnginePhase {
    Absent,
    Starting,
    Ready,
    Closing,
}

/// Outcome of a launch, shared with callers that were waiting on it.
type LaunchResult = std::result::Result<Arc<EngineConnection>, String>;

enum EngineSlot {
    Absent,
    Starting(watch::Receiver<Option<LaunchResult>>),
    Ready(Arc<EngineConnection>),
}

type PendingMap = Arc<StdMutex<HashMap<u64, oneshot::Sender<EngineReply>>>>;

/// One generation of the engine process: the child, its stdin, and the
/// table of requests awaiting a reply. Replies are routed back to callers
/// by id from a dedicated reader task; when the process dies, every
/// pending and future request fails cleanly instead of hanging.
pub(crate) struct EngineConnection {
    generation: u64,
    alive: Arc<AtomicBool>,
    next_id: AtomicU64,
    stdin: Mutex<ChildStdin>,
    child: Mutex<Child>,
    pending: PendingMap,
    reply_grace: Duration,
}

impl EngineConnection {
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    pub fn next_request_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Sends one command and awaits its reply. `deadline` is the engine-side
    /// budget for the operation; the stdio round-trip gets a little grace on
    /// top. Errors are plain messages; the session layer attaches phase and
    /// URL context.
    pub(crate) async fn request(
        &self,
        request: EngineRequest<'_>,
        deadline: Duration,
    ) -> std::result::Result<EngineReply, String> {
        if !self.is_alive() {
            return Err("engine connection is closed".to_string());
        }

        let id = request.id;
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .expect("pending map poisoned")
            .insert(id, tx);

        let mut line = match serde_json::to_string(&request) {
            Ok(line) => line,
            Err(err) => {
                self.forget(id);
                return Err(format!("failed to encode engine command: {err}"));
            }
        };
        line.push('\n');

        {
            let mut stdin = self.stdin.lock().await;
            if let Err(err) = stdin.write_all(line.as_bytes()).await {
                self.forget(id);
                return Err(format!("engine write failed: {err}"));
            }
            if let Err(err) = stdin.flush().await {
                self.forget(id);
                return Err(format!("engine write failed: {err}"));
            }
        }

        let budget = deadline + self.reply_grace;
        match timeout(budget, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            // Reader task dropped the sender: the process exited.
            Ok(Err(_)) => Err("engine connection closed before reply".to_string()),
            Err(_) => {
                self.forget(id);
                Err(format!(
                    "engine did not reply within {}",
                    format_duration(budget)
                ))
            }
        }
    }

    fn forget(&self, id: u64) {
        self.pending.lock().expect("pending map poisoned").remove(&id);
    }

    /// Asks the helper to exit, then waits briefly before killing it.
    pub(crate) async fn shutdown(&self, grace: Duration) {
        debug!(generation = self.generation, "shutting down engine connection");
        if self.is_alive() {
            let request = EngineRequest::shutdown(self.next_request_id());
            let _ = self.request(request, grace).await;
        }
        self.alive.store(false, Ordering::SeqCst);

        let mut child = self.child.lock().await;
        match timeout(grace, child.wait()).await {
            Ok(_) => {}
            Err(_) => {
                let _ = child.start_kill();
                let _ = child.wait().await;
            }
        }
    }
}

/// Increments the engine's active-session count for as long as it lives.
/// Idle teardown never runs while any guard exists.
pub struct ActivityGuard {
    engine: Arc<Engine>,
}

impl Drop for ActivityGuard {
    fn drop(&mut self) {
        self.engine.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Process-wide handle to the single browser engine instance.
pub struct Engine {
    options: EngineOptions,
    slot: Mutex<EngineSlot>,
    phase: watch::Sender<EnginePhase>,
    generation: AtomicU64,
    active: AtomicUsize,
    last_activity: StdMutex<Instant>,
}

impl Engine {
    pub fn new(options: EngineOptions) -> Self {
        // No receiver is held open; phase updates must use send_replace,
        // which stores the value even without subscribers.
        let (phase, _) = watch::channel(EnginePhase::Absent);
        Self {
            options,
            slot: Mutex::new(EngineSlot::Absent),
            phase,
            generation: AtomicU64::new(0),
            active: AtomicUsize::new(0),
            last_activity: StdMutex::new(Instant::now()),
        }
    }

    pub fn phase(&self) -> EnginePhase {
        *self.phase.subscribe().borrow()
    }

    pub fn is_ready(&self) -> bool {
        self.phase() == EnginePhase::Ready
    }

    /// Launches the engine if it is absent, or waits for a launch already
    /// in flight. Returns once the engine is ready.
    pub async fn ensure_started(&self) -> Result<()> {
        self.connection().await.map(|_| ())
    }

    /// Records capture activity for the idle-teardown gate.
    pub(crate) fn touch(&self) {
        *self.last_activity.lock().expect("activity clock poisoned") = Instant::now();
    }

    pub(crate) fn begin_activity(self: &Arc<Self>) -> ActivityGuard {
        self.active.fetch_add(1, Ordering::SeqCst);
        ActivityGuard {
            engine: Arc::clone(self),
        }
    }

    /// Resolves a live connection, launching the engine if necessary.
    pub(crate) async fn connection(&self) -> Result<Arc<EngineConnection>> {
        loop {
            let mut slot = self.slot.lock().await;
            match &*slot {
                EngineSlot::Ready(conn) if conn.is_alive() => return Ok(Arc::clone(conn)),
                EngineSlot::Ready(_) => {
                    warn!("engine connection lost; relaunching");
                    *slot = EngineSlot::Absent;
                    self.phase.send_replace(EnginePhase::Closing);
                    self.phase.send_replace(EnginePhase::Absent);
                    drop(slot);
                    continue;
                }
                EngineSlot::Starting(rx) => {
                    let rx = rx.clone();
                    drop(slot);
                    return self.await_launch(rx).await;
                }
                EngineSlot::Absent => {
                    let (tx, rx) = watch::channel(None);
                    *slot = EngineSlot::Starting(rx);
                    self.phase.send_replace(EnginePhase::Starting);
                    drop(slot);
                    return self.run_launch(tx).await;
                }
            }
        }
    }

    /// Waits for the launch another caller is performing and shares its
    /// outcome, success or startup failure.
    async fn await_launch(
        &self,
        mut rx: watch::Receiver<Option<LaunchResult>>,
    ) -> Result<Arc<EngineConnection>> {
        loop {
            if let Some(outcome) = rx.borrow_and_update().clone() {
                return outcome.map_err(PageshotError::Startup);
            }
            if rx.changed().await.is_err() {
                // The launching caller was cancelled mid-flight. Clear the
                // stale marker so the next capture can relaunch.
                let mut slot = self.slot.lock().await;
                if let EngineSlot::Starting(stored) = &*slot {
                    if stored.same_channel(&rx) {
                        *slot = EngineSlot::Absent;
                        self.phase.send_replace(EnginePhase::Absent);
                    }
                }
                return Err(PageshotError::Startup(
                    "engine launch was aborted".to_string(),
                ));
            }
        }
    }

    async fn run_launch(
        &self,
        tx: watch::Sender<Option<LaunchResult>>,
    ) -> Result<Arc<EngineConnection>> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let started = Instant::now();
        info!(generation, "launching browser engine");

        let result = self.launch(generation).await;
        let mut slot = self.slot.lock().await;
        match result {
            Ok(conn) => {
                let conn = Arc::new(conn);
                *slot = EngineSlot::Ready(Arc::clone(&conn));
                self.phase.send_replace(EnginePhase::Ready);
                info!(
                    generation,
                    elapsed = %format_duration(started.elapsed()),
                    "browser engine ready"
                );
                let _ = tx.send(Some(Ok(Arc::clone(&conn))));
                Ok(conn)
            }
            Err(err) => {
                *slot = EngineSlot::Absent;
                self.phase.send_replace(EnginePhase::Absent);
                warn!(generation, error = %err, "browser engine launch failed");
                let _ = tx.send(Some(Err(err.to_string())));
                Err(err)
            }
        }
    }

    fn helper_invocation(&self) -> Result<(String, Vec<String>)> {
        if let Some(command) = &self.options.engine_command {
            let (program, args) = command.split_first().ok_or_else(|| {
                PageshotError::Config("engine_command must not be empty".to_string())
            })?;
            return Ok((program.clone(), args.to_vec()));
        }
        Ok((
            self.options.node_command.clone(),
            vec![
                "-e".to_string(),
                ENGINE_SCRIPT.to_string(),
                if self.options.headless { "1" } else { "0" }.to_string(),
            ],
        ))
    }

    async fn launch(&self, generation: u64) -> Result<EngineConnection> {
        if self.options.engine_command.is_none() {
            // Fail fast with a useful message instead of a dead helper.
            ensure_node_available(&self.options.node_command).await?;
            ensure_playwright_available(&self.options.node_command).await?;
        }

        let (program, args) = self.helper_invocation()?;
        let mut cmd = Command::new(&program);
        cmd.args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|err| map_spawn_error(err, &program))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| PageshotError::Startup("engine stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PageshotError::Startup("engine stdout unavailable".to_string()))?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(engine.generation = generation, "engine stderr: {line}");
                }
            });
        }

        let mut lines = BufReader::new(stdout).lines();
        match timeout(self.options.launch_timeout, wait_for_ready(&mut lines)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                return Err(err);
            }
            Err(_) => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                return Err(PageshotError::Startup(format!(
                    "engine did not become ready within {}",
                    format_duration(self.options.launch_timeout)
                )));
            }
        }

        let pending: PendingMap = Arc::new(StdMutex::new(HashMap::new()));
        let alive = Arc::new(AtomicBool::new(true));

        let reader_pending = Arc::clone(&pending);
        let reader_alive = Arc::clone(&alive);
        tokio::spawn(async move {
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => match serde_json::from_str::<EngineReply>(&line) {
                        Ok(reply) => {
                            if let Some(id) = reply.id {
                                let waiter = reader_pending
                                    .lock()
                                    .expect("pending map poisoned")
                                    .remove(&id);
                                match waiter {
                                    Some(tx) => {
                                        let _ = tx.send(reply);
                                    }
                                    None => debug!(id, "engine reply for abandoned request"),
                                }
                            } else {
                                debug!(event = ?reply.event, "engine event");
                            }
                        }
                        Err(err) => {
                            warn!(error = %err, "unparseable engine output: {line}");
                        }
                    },
                    Ok(None) | Err(_) => break,
                }
            }
            reader_alive.store(false, Ordering::SeqCst);
            // Dropping the senders wakes every pending caller with a
            // connection-closed error.
            reader_pending
                .lock()
                .expect("pending map poisoned")
                .clear();
            debug!(engine.generation = generation, "engine output stream ended");
        });

        Ok(EngineConnection {
            generation,
            alive,
            next_id: AtomicU64::new(1),
            stdin: Mutex::new(stdin),
            child: Mutex::new(child),
            pending,
            reply_grace: self.options.reply_grace,
        })
    }

    /// Tears down the engine. No-op when absent; a launch in flight is
    /// allowed to finish first so it cannot be silently cancelled under a
    /// capture that depends on it.
    pub async fn shutdown(&self) {
        loop {
            let mut slot = self.slot.lock().await;
            match &*slot {
                EngineSlot::Absent => return,
                EngineSlot::Ready(_) => {
                    let EngineSlot::Ready(conn) =
                        std::mem::replace(&mut *slot, EngineSlot::Absent)
                    else {
                        unreachable!()
                    };
                    self.phase.send_replace(EnginePhase::Closing);
                    conn.shutdown(self.options.shutdown_timeout).await;
                    self.phase.send_replace(EnginePhase::Absent);
                    info!("browser engine closed");
                    return;
                }
                EngineSlot::Starting(rx) => {
                    let mut rx = rx.clone();
                    drop(slot);
                    loop {
                        if rx.borrow_and_update().is_some() {
                            break;
                        }
                        if rx.changed().await.is_err() {
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Idle-timer expiry body: tears the engine down only if no session is
    /// active and no activity happened within the window. Holding the slot
    /// lock for the whole teardown makes it atomic for concurrent captures.
    pub(crate) async fn shutdown_if_idle(&self, window: Duration) {
        if self.active.load(Ordering::SeqCst) > 0 {
            debug!("idle expiry ignored; render sessions active");
            return;
        }

        let mut slot = self.slot.lock().await;
        // Re-check under the lock: a capture may have begun while we
        // were acquiring it.
        if self.active.load(Ordering::SeqCst) > 0 {
            return;
        }
        if self
            .last_activity
            .lock()
            .expect("activity clock poisoned")
            .elapsed()
            < window
        {
            return;
        }
        if !matches!(&*slot, EngineSlot::Ready(_)) {
            return;
        }

        let EngineSlot::Ready(conn) = std::mem::replace(&mut *slot, EngineSlot::Absent) else {
            unreachable!()
        };
        self.phase.send_replace(EnginePhase::Closing);
        info!(
            idle = %format_duration(window),
            "closing browser engine after inactivity"
        );
        conn.shutdown(self.options.shutdown_timeout).await;
        self.phase.send_replace(EnginePhase::Absent);
    }
}

async fn wait_for_ready(lines: &mut Lines<BufReader<ChildStdout>>) -> Result<()> {
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let reply: EngineReply = match serde_json::from_str(&line) {
                    Ok(reply) => reply,
                    Err(_) => {
                        debug!("engine startup output: {line}");
                        continue;
                    }
                };
                match reply.event.as_deref() {
                    Some("ready") => return Ok(()),
                    Some("fatal") => return Err(PageshotError::Startup(reply.error_message())),
                    _ => continue,
                }
            }
            Ok(None) => {
                return Err(PageshotError::Startup(
                    "engine exited during startup".to_string(),
                ))
            }
            Err(err) => {
                return Err(PageshotError::Startup(format!(
                    "failed to read engine output: {err}"
                )))
            }
        }
    }
}

//! Threaded facade over the [`Engine`].
//!
//! Every script runs on one worker thread that drains a FIFO job queue, so no
//! two handlers ever touch part state at the same time. Callers on other
//! threads post jobs and either forget them, attach a completion, block on a
//! `oneshot` reply, or await it.
//!
//! The blocking calls must not be made from inside a worker job (the worker
//! would wait on itself) or from within a tokio runtime; use the `_async`
//! variants there.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use tokio::sync::{mpsc, oneshot};

use super::RuntimeConfig;
use super::chunk::{Chunk, Preposition};
use super::context::ExecutionContext;
use super::dispatch::{Message, MessageOutcome};
use super::engine::Engine;
use super::error::{Result, RuntimeError};
use super::part::{Findable, Owner, PartKey, PartType};
use super::property::{Adjective, ChangeReceiver};
use super::specifier::PartSpecifier;
use super::value::Value;

type Job = Box<dyn FnOnce(&mut Engine) + Send>;

/// Snapshot of a resolved part, safe to hand to other threads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartSummary {
    /// Runtime-wide key.
    pub key: PartKey,
    /// Kind of part.
    pub part_type: PartType,
    /// Owning layer.
    pub owner: Owner,
    /// Per-stack id.
    pub id: i64,
    /// Name at the time of resolution.
    pub name: String,
    /// Specifier addressing exactly this part.
    pub specifier: PartSpecifier,
}

/// Handle to the script worker.
pub struct Runtime {
    jobs: Option<mpsc::UnboundedSender<Job>>,
    worker: Option<JoinHandle<()>>,
    abort: Arc<AtomicBool>,
}

impl Runtime {
    /// Start a worker over a fresh engine built from `config`.
    pub fn start(config: RuntimeConfig) -> Result<Self> {
        config.validate()?;
        Self::from_engine(Engine::new(config))
    }

    /// Start a worker that owns `engine`.
    pub fn from_engine(engine: Engine) -> Result<Self> {
        let abort = engine.abort_flag();
        let (tx, rx) = mpsc::unbounded_channel::<Job>();
        let worker = std::thread::Builder::new()
            .name("script-worker".into())
            .spawn(move || run_worker(engine, rx))?;
        Ok(Self {
            jobs: Some(tx),
            worker: Some(worker),
            abort,
        })
    }

    /// Queue `job` behind everything already posted.
    pub fn execute<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce(&mut Engine) + Send + 'static,
    {
        self.jobs
            .as_ref()
            .ok_or(RuntimeError::WorkerStopped)?
            .send(Box::new(job))
            .map_err(|_| RuntimeError::WorkerStopped)
    }

    /// Queue `job` and return a receiver for its result.
    pub fn request<T, F>(&self, job: F) -> Result<oneshot::Receiver<T>>
    where
        T: Send + 'static,
        F: FnOnce(&mut Engine) -> T + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.execute(move |engine| {
            // The caller may have stopped waiting.
            let _ = tx.send(job(engine));
        })?;
        Ok(rx)
    }

    /// Run `job` on the worker and block until it finishes.
    pub fn call<T, F>(&self, job: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Engine) -> T + Send + 'static,
    {
        self.request(job)?
            .blocking_recv()
            .map_err(|_| RuntimeError::WorkerStopped)
    }

    /// Run `job` on the worker and await its result.
    pub async fn call_async<T, F>(&self, job: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Engine) -> T + Send + 'static,
    {
        self.request(job)?
            .await
            .map_err(|_| RuntimeError::WorkerStopped)
    }

    /// Send `message` to `target` without waiting; errors are logged.
    pub fn send_message(&self, target: PartSpecifier, message: Message) -> Result<()> {
        self.execute(move |engine| {
            let outcome = dispatch(engine, &target, message);
            if let Some(err) = &outcome.error {
                tracing::warn!("{} to {} failed: {}", outcome.message.name, target, err);
            }
        })
    }

    /// Send `message` to `target` and hand the outcome to `completion` on the worker.
    pub fn send_message_with<F>(&self, target: PartSpecifier, message: Message, completion: F) -> Result<()>
    where
        F: FnOnce(MessageOutcome) + Send + 'static,
    {
        self.execute(move |engine| completion(dispatch(engine, &target, message)))
    }

    /// Send `message` within a caller-supplied context, which is handed back
    /// to `completion` together with the outcome.
    pub fn send_message_in<F>(
        &self,
        mut context: ExecutionContext,
        target: PartSpecifier,
        message: Message,
        completion: F,
    ) -> Result<()>
    where
        F: FnOnce(ExecutionContext, MessageOutcome) + Send + 'static,
    {
        self.execute(move |engine| {
            let outcome = engine.send_message(&mut context, &target, &message);
            completion(context, outcome)
        })
    }

    /// Send `message` and block until it has been handled.
    pub fn send_message_blocking(&self, target: PartSpecifier, message: Message) -> Result<MessageOutcome> {
        self.call(move |engine| dispatch(engine, &target, message))
    }

    /// Send `message` and await the outcome.
    pub async fn send_message_async(&self, target: PartSpecifier, message: Message) -> Result<MessageOutcome> {
        self.call_async(move |engine| dispatch(engine, &target, message))
            .await
    }

    /// Call function `name` starting at `target` and block for its value.
    pub fn invoke_function(&self, target: PartSpecifier, name: &str, args: Vec<Value>) -> Result<Value> {
        let name = name.to_string();
        let value = self.call(move |engine| {
            let mut ctx = engine.new_context()?;
            engine.invoke_function(&mut ctx, &target, &name, args)
        })??;
        Ok(value)
    }

    /// Resolve `spec` from the current card.
    pub fn resolve_part(&self, spec: PartSpecifier) -> Result<PartSummary> {
        let summary = self.call(move |engine| {
            let part = engine.resolve(&engine.current_scope()?, &spec)?;
            Ok::<_, RuntimeError>(PartSummary {
                key: part.key(),
                part_type: part.part_type(),
                owner: part.owner(),
                id: part.part_id(),
                name: part.part_name(),
                specifier: part.specifier(),
            })
        })??;
        Ok(summary)
    }

    /// Read a property of the part `spec` names.
    pub fn get_property(&self, spec: PartSpecifier, name: &str, adjective: Option<Adjective>) -> Result<Value> {
        let name = name.to_string();
        let value = self.call(move |engine| {
            engine.get_property(&engine.current_scope()?, &spec, &name, adjective)
        })??;
        Ok(value)
    }

    /// Write a property of the part `spec` names. Adjective forms are read-only,
    /// so any adjective is rejected.
    pub fn set_property(
        &self,
        spec: PartSpecifier,
        name: &str,
        adjective: Option<Adjective>,
        value: Value,
    ) -> Result<()> {
        let name = name.to_string();
        self.call(move |engine| {
            engine.set_property(&engine.current_scope()?, &spec, &name, adjective, value)
        })??;
        Ok(())
    }

    /// Text of `chunk` within `value`.
    pub fn get_chunk(&self, value: Value, chunk: Chunk) -> Result<Value> {
        self.call(move |engine| engine.get_chunk(&value, &chunk))
    }

    /// `value` with `replacement` placed relative to `chunk`.
    pub fn set_chunk(
        &self,
        value: Value,
        preposition: Preposition,
        chunk: Chunk,
        replacement: Value,
    ) -> Result<Value> {
        self.call(move |engine| engine.set_chunk(&value, preposition, &chunk, &replacement))
    }

    /// Change notifications of the part `spec` names, for the presentation thread.
    pub fn subscribe(&self, spec: PartSpecifier) -> Result<ChangeReceiver> {
        let receiver = self.call(move |engine| engine.subscribe(&engine.current_scope()?, &spec))??;
        Ok(receiver)
    }

    /// Suppress or release lockable messages, in queue order.
    pub fn set_lock_messages(&self, locked: bool) -> Result<()> {
        self.execute(move |engine| engine.set_lock_messages(locked))
    }

    /// Enter or leave peek mode, in queue order.
    pub fn set_peeking(&self, peeking: bool) -> Result<()> {
        self.execute(move |engine| engine.set_peeking(peeking))
    }

    /// Stop running loops now, ahead of the queue.
    pub fn abort(&self) {
        tracing::debug!("abort requested");
        self.abort.store(true, Ordering::SeqCst);
    }

    /// Finish queued jobs, then stop the worker.
    pub fn shutdown(mut self) -> Result<()> {
        self.stop()
    }

    fn stop(&mut self) -> Result<()> {
        // Closing the queue lets the worker drain what is left and exit.
        self.jobs.take();
        match self.worker.take() {
            Some(worker) => worker.join().map_err(|_| RuntimeError::WorkerStopped),
            None => Ok(()),
        }
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            tracing::warn!("script worker ended abnormally: {}", err);
        }
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("running", &self.jobs.is_some())
            .finish()
    }
}

fn run_worker(mut engine: Engine, mut jobs: mpsc::UnboundedReceiver<Job>) {
    tracing::debug!("script worker started");
    let mut processed = 0u64;
    while let Some(job) = jobs.blocking_recv() {
        job(&mut engine);
        processed += 1;
        tracing::trace!("script worker finished job {}", processed);
    }
    tracing::debug!("script worker stopped after {} jobs", processed);
}

fn dispatch(engine: &Engine, target: &PartSpecifier, message: Message) -> MessageOutcome {
    match engine.new_context() {
        Ok(mut ctx) => engine.send_message(&mut ctx, target, &message),
        Err(err) => MessageOutcome {
            message,
            trapped: false,
            error: Some(err),
        },
    }
}

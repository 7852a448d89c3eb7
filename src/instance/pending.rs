//! Pending constructions
//!
//! A [`PendingInstance`] wraps an instance whose initializer has not settled
//! yet. The instance already carries its metadata, so type checks and subtype
//! resolution work right away. Work requested on the handle before it
//! settles is queued and runs in request order as soon as it does.

use super::construct::{self, Construction};
use super::Instance;
use crate::errors::{Error, ErrorKind, Result};
use crate::infrastructure::metrics::counters;
use futures::channel::oneshot;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::fmt;
use std::future::{Future, IntoFuture};
use std::sync::Arc;

type Settled = std::result::Result<Instance, Error>;
type Continuation = Box<dyn FnOnce(&std::result::Result<(), Error>) + Send>;

#[derive(Default)]
struct PendingState {
    outcome: Option<std::result::Result<(), Error>>,
    queue: VecDeque<Continuation>,
}

#[derive(Clone)]
pub struct PendingInstance {
    instance: Instance,
    state: Arc<Mutex<PendingState>>,
    settled: Shared<BoxFuture<'static, Settled>>,
}

impl PendingInstance {
    /// Handle for a construction whose initializer returned `future`.
    pub(crate) fn spawn(instance: Instance, future: BoxFuture<'static, Result<Option<Value>>>) -> Self {
        let shell = instance.clone();
        Self::wrap(instance, async move {
            let resolved = future.await;
            construct::settle(&shell, resolved)
        })
    }

    fn wrap<F>(instance: Instance, inner: F) -> Self
    where
        F: Future<Output = Settled> + Send + 'static,
    {
        let state = Arc::new(Mutex::new(PendingState::default()));
        let drain = state.clone();
        let settled = async move {
            let result = inner.await;
            let outcome = result.as_ref().map(|_| ()).map_err(|err| err.clone());
            let queue = {
                let mut state = drain.lock();
                state.outcome = Some(outcome.clone());
                std::mem::take(&mut state.queue)
            };
            for continuation in queue {
                continuation(&outcome);
            }
            result
        }
        .boxed()
        .shared();

        Self {
            instance,
            state,
            settled,
        }
    }

    /// The instance under construction
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    pub fn is_settled(&self) -> bool {
        self.state.lock().outcome.is_some()
    }

    /// Run `continuation` once this handle settles, or now if it already has.
    fn enqueue(&self, continuation: Continuation) {
        let outcome = {
            let mut state = self.state.lock();
            match state.outcome.clone() {
                Some(outcome) => outcome,
                None => {
                    state.queue.push_back(continuation);
                    return;
                }
            }
        };
        continuation(&outcome);
    }

    /// Queue `step` on `shell` behind this handle.
    ///
    /// The shell is handed out immediately as the pending instance; `step`
    /// runs once this handle settles successfully.
    fn then<F>(&self, shell: Instance, step: F) -> PendingInstance
    where
        F: FnOnce(Instance) -> Result<Construction> + Send + 'static,
    {
        shell.set_pending(true);
        let (sender, receiver) = oneshot::channel();
        let queued = shell.clone();
        self.enqueue(Box::new(move |outcome| {
            let result = match outcome {
                Ok(()) => step(queued),
                Err(err) => {
                    queued.set_pending(false);
                    Err(err.clone())
                }
            };
            // nobody waiting is fine
            let _ = sender.send(result);
        }));

        let upstream = self.settled.clone();
        PendingInstance::wrap(shell, async move {
            upstream.await?;
            let construction = receiver.await.map_err(|_| {
                Error::with_addition(ErrorKind::WrongModificationPattern, "queued construction was dropped")
            })??;
            construction.settle().await
        })
    }

    /// Run the construction pipeline on `shell` once this handle settles.
    pub(crate) fn run_after(&self, shell: Instance) -> PendingInstance {
        self.then(shell, construct::run)
    }

    /// Construct subtype `name` once this handle settles.
    ///
    /// The subtype is resolved and type checked now.
    pub fn invoke(&self, name: &str, args: Vec<Value>) -> Result<PendingInstance> {
        let def = self.instance.resolve_subtype(name)?;
        let shell = construct::prepare(&def, (&self.instance).into(), args.into())?;
        Ok(self.run_after(shell))
    }

    /// Clone the instance once it settles.
    pub fn clone_instance(&self) -> PendingInstance {
        let source = self.instance.clone();
        self.then(self.instance.clone_shell(), move |shell| {
            shell.replace_data(source.snapshot());
            shell.set_pending(false);
            shell.type_def().metrics().increment(counters::CLONES);
            Ok(Construction::Ready(shell))
        })
    }

    /// Fork the instance once it settles.
    pub fn fork(&self, args: Vec<Value>) -> Result<PendingInstance> {
        let shell = self.instance.prepare_fork(args)?;
        Ok(self.run_after(shell))
    }
}

impl IntoFuture for PendingInstance {
    type Output = Result<Instance>;
    type IntoFuture = Shared<BoxFuture<'static, Settled>>;

    fn into_future(self) -> Self::IntoFuture {
        self.settled
    }
}

impl fmt::Debug for PendingInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingInstance")
            .field("instance", &self.instance)
            .field("settled", &self.is_settled())
            .finish()
    }
}

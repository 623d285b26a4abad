//! # Task-tree driver.
//!
//! One [`Driver`] owns one root task and every descendant. It is the only
//! poller of their routines and the only writer of the tree, so no tree state is
//! shared or locked; the outside world reaches it through the mailbox
//! ([`Signal`]).
//!
//! ## Loop
//! ```text
//! start(root) ──► ready queue
//! run():
//!   drain ready queue ──► poll_task(id)
//!       routine yields effect ──► run_effect ──► settles now  ──► poll again
//!                                            └─► settles later (mailbox)
//!   (a channel that serves a take or put at once settles it now)
//!   recv Signal ──► Settle{effect} ──► resume owner ──► ready queue
//!               ──► Wake(task)     ──► ready queue
//!               ──► Cancel(task)   ──► cancel_task (subtree)
//!   until the root settled
//! ```
//!
//! ## Effects and their undo
//! Every interpreted effect gets an [`EffectRecord`]. Settling removes the
//! record first, so a late settlement of a withdrawn effect finds nothing and
//! is ignored; a message a withdrawn take already received from a FIFO
//! [`Channel`] is handed back to that channel. Withdrawing runs the record's
//! [`Undo`]: withdraw a take, cancel a called child, cancel combinator
//! branches, drop a join registration.
//!
//! ## Combinator passes
//! Branches of a `race`/`all` start in listed order inside one [`Pass`].
//! Settlements that happen during the pass (including a later branch serving
//! an earlier branch's take) are held back and applied by branch index once
//! the pass ends, so the first-listed settled branch wins a race.
//!
//! ## Task completion
//! ```text
//! body returns Ok(v) ──► wait for forked children ──► Done(v)
//! body returns Err(e) ──► abort: withdraw pending effect, cancel children ──► Failed(e)
//! cancel ──► withdraw pending effect, cancel children, cleanup poll ──► Cancelled
//! forked child Failed(e) ──► abort parent with e
//! called child settled  ──► caller's call effect settles
//! ```

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::mem;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::config::Config;
use super::handle::{Outcome, TaskHandle, TaskId, TaskState};
use super::mailbox::{settler, EffectId, InlineCell, Mailbox, Signal, TaskWaker};
use super::runtime::Io;
use crate::channels::{Channel, EventChannel, TakeTicket};
use crate::effects::{Effect, Effects, PutTo, TakeFrom};
use crate::error::SagaError;
use crate::events::{Bus, Event, EventKind};
use crate::sagas::{BoxSagaFuture, Cx, SagaRef, SharedSlot};
use crate::subscribers::panic_message;
use crate::util::lock;
use crate::value::Value;

/// Position of a task relative to its parent.
#[derive(Clone, Copy, Debug)]
enum Link {
    Root,
    /// Created by a call effect; settling settles that effect.
    Called(EffectId),
    /// Created by a fork effect; only failures travel upwards.
    Forked(EffectId),
}

struct TaskNode {
    handle: TaskHandle,
    parent: Option<TaskId>,
    link: Link,
    children: Vec<TaskId>,
    /// `None` once the routine returned (or was dropped).
    body: Option<BoxSagaFuture>,
    /// Value the routine returned, held until forked children settle.
    result: Option<Value>,
    slot: SharedSlot,
    waker: Waker,
    pending: Option<EffectId>,
    joiners: Vec<EffectId>,
    cancelled: bool,
    /// Being cancelled or aborted.
    closing: bool,
    /// Inside `poll_task`; synchronous settlements continue its loop.
    polling: bool,
}

enum Owner {
    Task,
    Branch { parent: EffectId, index: usize },
}

enum Undo {
    Nothing,
    Take(TakeTicket),
    Child(TaskId),
    Branches(Vec<EffectId>),
    Join(TaskId),
    Watch(JoinHandle<()>),
}

struct Combinator {
    race: bool,
    keys: Option<Vec<Arc<str>>>,
    results: Vec<Option<Value>>,
    remaining: usize,
}

impl Combinator {
    fn key(&self, index: usize) -> Arc<str> {
        self.keys
            .as_ref()
            .and_then(|keys| keys.get(index).cloned())
            .unwrap_or_else(|| Arc::from(index.to_string()))
    }

    fn empty(&self) -> Value {
        match self.keys {
            Some(_) => Value::Map(BTreeMap::new()),
            None => Value::List(Vec::new()),
        }
    }

    /// Race result: only the winner is present.
    fn winner(&self, index: usize, value: Value) -> Value {
        match self.keys {
            Some(_) => Value::Map(BTreeMap::from([(self.key(index), value)])),
            None => {
                let mut list = vec![Value::Unit; self.results.len()];
                if let Some(slot) = list.get_mut(index) {
                    *slot = value;
                }
                Value::List(list)
            }
        }
    }

    /// All result: every value in the given shape.
    fn collect(&mut self) -> Value {
        let values: Vec<Value> = mem::take(&mut self.results)
            .into_iter()
            .map(Option::unwrap_or_default)
            .collect();
        match self.keys.take() {
            Some(keys) => Value::Map(keys.into_iter().zip(values).collect()),
            None => Value::List(values),
        }
    }
}

/// Branch settlement captured while its combinator was still starting branches.
enum Early {
    /// Settled through [`Driver::settle`]; its record is already gone.
    Settled(Result<Value, SagaError>),
    /// Served synchronously by a channel; its record still exists.
    Captured {
        effect: EffectId,
        result: Result<Value, SagaError>,
        origin: Option<Channel>,
    },
}

struct ArmedBranch {
    index: usize,
    effect: EffectId,
    cell: InlineCell,
    origin: Option<Channel>,
}

/// Branches of one combinator being started.
struct Pass {
    parent: EffectId,
    early: Vec<(usize, Result<Value, SagaError>)>,
    armed: Vec<ArmedBranch>,
}

impl Pass {
    fn new(parent: EffectId) -> Self {
        Self {
            parent,
            early: Vec::new(),
            armed: Vec::new(),
        }
    }

    /// `true` once the combinator's outcome is decided: any settlement for a
    /// race, a failure for all.
    fn decided(&self, race: bool) -> bool {
        let early = self.early.iter().any(|(_, r)| race || r.is_err());
        early
            || self
                .armed
                .iter()
                .any(|b| b.cell.settled_ok().is_some_and(|ok| race || !ok))
    }

    /// Detaches every armed cell; returns captured settlements by branch index.
    fn finish(self) -> Vec<(usize, Early)> {
        let mut out: Vec<(usize, Early)> = self
            .early
            .into_iter()
            .map(|(index, result)| (index, Early::Settled(result)))
            .collect();
        for branch in self.armed {
            if let Some(result) = branch.cell.detach() {
                out.push((
                    branch.index,
                    Early::Captured {
                        effect: branch.effect,
                        result,
                        origin: branch.origin,
                    },
                ));
            }
        }
        out.sort_by_key(|(index, _)| *index);
        out
    }
}

struct EffectRecord {
    task: TaskId,
    owner: Owner,
    label: &'static str,
    undo: Undo,
    combinator: Option<Combinator>,
}

/// Interpreter and scheduler of one task tree.
pub(crate) struct Driver {
    cfg: Config,
    io: Io,
    channel: EventChannel,
    bus: Bus,
    mailbox: Mailbox,
    inbox: mpsc::UnboundedReceiver<Signal>,
    tasks: HashMap<TaskId, TaskNode>,
    effects: HashMap<EffectId, EffectRecord>,
    ready: VecDeque<TaskId>,
    /// Combinators currently starting their branches, innermost last.
    passes: Vec<Pass>,
    next_effect: EffectId,
    root: Option<TaskHandle>,
}

impl Driver {
    /// Creates a driver; subscribes the default channel to `io.source`.
    pub(crate) fn new(cfg: Config, io: Io, bus: Bus) -> Self {
        let (mailbox, inbox) = mpsc::unbounded_channel();
        let channel = EventChannel::new(&io.source);
        Self {
            cfg,
            io,
            channel,
            bus,
            mailbox,
            inbox,
            tasks: HashMap::new(),
            effects: HashMap::new(),
            ready: VecDeque::new(),
            passes: Vec::new(),
            next_effect: 1,
            root: None,
        }
    }

    /// Creates the root task. It is first polled by [`Driver::run`].
    pub(crate) fn start(&mut self, saga: &SagaRef, args: Vec<Value>) -> TaskHandle {
        let name: Arc<str> = Arc::from(&*self.cfg.name);
        let handle = self.spawn_task(saga, args, None, Link::Root, Some(name));
        self.ready.push_back(handle.id());
        self.root = Some(handle.clone());
        handle
    }

    /// Drives the tree until the root settles.
    pub(crate) async fn run(mut self) {
        self.drain().await;
        while !self.root_settled() {
            let Some(signal) = self.inbox.recv().await else {
                break;
            };
            self.apply(signal);
            self.drain().await;
        }
        self.channel.unsubscribe();

        if let Some(root) = &self.root {
            let summary = match root.outcome() {
                Some(Outcome::Done(_)) => "done".to_string(),
                Some(Outcome::Cancelled) => "cancelled".to_string(),
                Some(Outcome::Failed(err)) => err.to_string(),
                None => "abandoned".to_string(),
            };
            self.bus.publish(
                Event::new(EventKind::RootSettled)
                    .with_task(root.name_arc())
                    .with_task_id(root.id())
                    .with_reason(summary),
            );
        }
    }

    fn root_settled(&self) -> bool {
        self.root
            .as_ref()
            .map_or(true, |root| !self.tasks.contains_key(&root.id()))
    }

    fn apply(&mut self, signal: Signal) {
        match signal {
            Signal::Settle {
                effect,
                result,
                origin,
            } => self.deliver(effect, result, origin),
            Signal::Wake(id) => {
                let wakeable = self.tasks.get(&id).is_some_and(|node| {
                    !node.polling && !node.closing && node.pending.is_none() && node.body.is_some()
                });
                if wakeable {
                    self.ready.push_back(id);
                }
            }
            Signal::Cancel(id) => self.cancel_task(id),
        }
    }

    /// Polls every ready task, yielding to tokio once per sync budget.
    async fn drain(&mut self) {
        let budget = self.cfg.sync_budget_clamped();
        let mut steps = 0;
        while let Some(id) = self.ready.pop_front() {
            steps += self.poll_task(id);
            if steps >= budget {
                steps = 0;
                tokio::task::yield_now().await;
            }
        }
    }

    fn next_effect_id(&mut self) -> EffectId {
        let id = self.next_effect;
        self.next_effect += 1;
        id
    }

    // ---- tasks -------------------------------------------------------------

    fn spawn_task(
        &mut self,
        saga: &SagaRef,
        args: Vec<Value>,
        parent: Option<TaskId>,
        link: Link,
        name: Option<Arc<str>>,
    ) -> TaskHandle {
        let id = TaskId::next();
        let name = name.unwrap_or_else(|| Arc::from(saga.name()));
        let handle = TaskHandle::new(id, Arc::clone(&name), self.mailbox.clone());
        let slot = SharedSlot::default();
        let cx = Cx::new(id, Arc::clone(&name), Arc::clone(&slot));

        let body = match catch_unwind(AssertUnwindSafe(|| saga.spawn(cx, args))) {
            Ok(body) => body,
            Err(panic) => {
                let err = SagaError::fail(format!("saga panicked: {}", panic_message(&*panic)));
                futures::future::ready(Err(err)).boxed()
            }
        };

        self.tasks.insert(
            id,
            TaskNode {
                handle: handle.clone(),
                parent,
                link,
                children: Vec::new(),
                body: Some(body),
                result: None,
                slot,
                waker: TaskWaker::waker(id, &self.mailbox),
                pending: None,
                joiners: Vec::new(),
                cancelled: false,
                closing: false,
                polling: false,
            },
        );
        if let Some(node) = parent.and_then(|pid| self.tasks.get_mut(&pid)) {
            node.children.push(id);
        }

        let mut ev = Event::new(EventKind::TaskStarted)
            .with_task(name)
            .with_task_id(id)
            .with_parent(parent);
        match link {
            Link::Root => {}
            Link::Called(eid) => ev = ev.with_effect(eid, "call"),
            Link::Forked(eid) => ev = ev.with_effect(eid, "fork"),
        }
        self.bus.publish(ev);
        handle
    }

    /// Polls `id` until it suspends, settles, or uses up the sync budget.
    ///
    /// Returns the number of polls performed.
    fn poll_task(&mut self, id: TaskId) -> usize {
        let budget = self.cfg.sync_budget_clamped();
        let mut steps = 0;
        loop {
            let Some(node) = self.tasks.get_mut(&id) else {
                return steps;
            };
            if node.closing || node.pending.is_some() || node.body.is_none() {
                node.polling = false;
                if node.pending.is_some() {
                    node.handle.set_state(TaskState::Suspended);
                }
                return steps;
            }
            if steps >= budget {
                node.polling = false;
                self.ready.push_back(id);
                return steps;
            }
            let Some(mut body) = node.body.take() else {
                return steps;
            };
            node.polling = true;
            node.handle.set_state(TaskState::Running);
            let waker = node.waker.clone();
            let slot = Arc::clone(&node.slot);

            let polled = catch_unwind(AssertUnwindSafe(|| {
                body.as_mut().poll(&mut Context::from_waker(&waker))
            }));
            steps += 1;

            match polled {
                Ok(Poll::Pending) => {
                    let yielded = lock(&slot).yielded.take();
                    let eid = self.next_effect_id();
                    let Some(node) = self.tasks.get_mut(&id) else {
                        return steps;
                    };
                    node.body = Some(body);
                    match yielded {
                        Some(effect) => {
                            node.pending = Some(eid);
                            self.run_effect(id, eid, Owner::Task, effect);
                        }
                        None => {
                            // waiting on a foreign future; its waker posts Wake
                            node.polling = false;
                            node.handle.set_state(TaskState::Suspended);
                            return steps;
                        }
                    }
                }
                Ok(Poll::Ready(result)) => {
                    drop(body);
                    self.body_finished(id, result);
                    return steps;
                }
                Err(panic) => {
                    drop(body);
                    let err = SagaError::fail(format!("saga panicked: {}", panic_message(&*panic)));
                    self.body_finished(id, Err(err));
                    return steps;
                }
            }
        }
    }

    fn body_finished(&mut self, id: TaskId, result: Result<Value, SagaError>) {
        let Some(node) = self.tasks.get_mut(&id) else {
            return;
        };
        node.polling = false;
        match result {
            Ok(value) => {
                node.result = Some(value);
                node.handle.set_state(TaskState::Suspended);
                self.try_complete(id);
            }
            Err(SagaError::Cancelled) => self.cancel_task(id),
            Err(err) => self.abort(id, err),
        }
    }

    /// Settles `id` as done once its routine returned and every child settled.
    fn try_complete(&mut self, id: TaskId) {
        let Some(node) = self.tasks.get_mut(&id) else {
            return;
        };
        if node.closing || node.body.is_some() || !node.children.is_empty() {
            return;
        }
        let value = node.result.take().unwrap_or_default();
        self.finalize(id, Outcome::Done(value));
    }

    /// Fails `id`: its pending effect and children are cancelled, its routine dropped.
    fn abort(&mut self, id: TaskId, err: SagaError) {
        let Some(node) = self.tasks.get_mut(&id) else {
            return;
        };
        if node.closing {
            return;
        }
        node.closing = true;
        node.body = None;
        let pending = node.pending.take();
        let children = node.children.clone();

        if let Some(eid) = pending {
            self.cancel_effect(eid);
        }
        for child in children {
            self.cancel_task(child);
        }
        self.finalize(id, Outcome::Failed(err));
    }

    /// Cancels `id` and its whole subtree.
    fn cancel_task(&mut self, id: TaskId) {
        let Some(node) = self.tasks.get_mut(&id) else {
            return;
        };
        if node.closing {
            return;
        }
        node.closing = true;
        node.cancelled = true;
        let pending = node.pending.take();
        let children = node.children.clone();

        if let Some(eid) = pending {
            self.cancel_effect(eid);
        }
        for child in children {
            self.cancel_task(child);
        }
        self.run_cleanup(id);
        self.finalize(id, Outcome::Cancelled);
    }

    /// Resumes a cancelled routine with `Err(Cancelled)` and serves its
    /// non-suspending effects until it returns or tries to suspend.
    fn run_cleanup(&mut self, id: TaskId) {
        let Some(node) = self.tasks.get_mut(&id) else {
            return;
        };
        let Some(mut body) = node.body.take() else {
            return;
        };
        let slot = Arc::clone(&node.slot);
        let waker = node.waker.clone();
        {
            let mut s = lock(&slot);
            if !s.outstanding {
                return;
            }
            s.yielded = None;
            s.resume = Some(Err(SagaError::Cancelled));
        }

        for _ in 0..self.cfg.sync_budget_clamped() {
            let polled = catch_unwind(AssertUnwindSafe(|| {
                body.as_mut().poll(&mut Context::from_waker(&waker))
            }));
            let Ok(Poll::Pending) = polled else {
                break;
            };
            let yielded = lock(&slot).yielded.take();
            let Some(effect) = yielded else {
                break;
            };
            let result = self.run_cleanup_effect(id, effect);
            lock(&slot).resume = Some(result);
        }
    }

    fn run_cleanup_effect(&mut self, id: TaskId, effect: Effect) -> Result<Value, SagaError> {
        let eid = self.next_effect_id();
        let label = effect.label();
        self.bus.publish(
            Event::new(EventKind::EffectTriggered)
                .with_task_id(id)
                .with_effect(eid, label),
        );

        let result = match effect {
            Effect::Put { to, message, wait } => match (to, wait) {
                (PutTo::Channel(_), true) => Err(SagaError::Cancelled),
                (PutTo::Dispatch, true) => {
                    (self.io.dispatch)(message);
                    Ok(Value::Bool(true))
                }
                (to, false) => {
                    self.put_now(to, message);
                    Ok(Value::Unit)
                }
            },
            Effect::Select(selector) => Ok(selector(&(self.io.get_state)())),
            Effect::Cancelled => Ok(Value::Bool(true)),
            Effect::Cancel(Some(target)) => {
                self.cancel_handle(&target);
                Ok(Value::Unit)
            }
            Effect::Cancel(None) => Ok(Value::Unit),
            _ => Err(SagaError::Cancelled),
        };

        let kind = match &result {
            Ok(_) => EventKind::EffectResolved,
            Err(_) => EventKind::EffectRejected,
        };
        self.bus
            .publish(Event::new(kind).with_task_id(id).with_effect(eid, label));
        result
    }

    /// Removes `id` from the tree and notifies joiners, caller or parent.
    fn finalize(&mut self, id: TaskId, outcome: Outcome) {
        let Some(mut node) = self.tasks.remove(&id) else {
            return;
        };
        node.body = None;
        node.handle.settle(outcome.clone());

        let kind = match &outcome {
            Outcome::Done(_) => EventKind::TaskDone,
            Outcome::Cancelled => EventKind::TaskCancelled,
            Outcome::Failed(_) => EventKind::TaskFailed,
        };
        let mut ev = Event::new(kind)
            .with_task(node.handle.name_arc())
            .with_task_id(id)
            .with_parent(node.parent);
        if let Outcome::Failed(err) = &outcome {
            ev = ev.with_reason(err.to_string());
        }
        self.bus.publish(ev);

        for joiner in mem::take(&mut node.joiners) {
            self.settle(joiner, outcome.clone().into_joined());
        }
        if let Some(parent) = node.parent.and_then(|pid| self.tasks.get_mut(&pid)) {
            parent.children.retain(|child| *child != id);
        }

        match node.link {
            Link::Root => {}
            Link::Called(eid) => self.settle(eid, outcome.into_called()),
            Link::Forked(_) => {
                if let Some(pid) = node.parent {
                    match outcome {
                        Outcome::Failed(err) => self.abort(pid, err),
                        _ => self.try_complete(pid),
                    }
                }
            }
        }
    }

    fn cancel_handle(&mut self, target: &TaskHandle) {
        if self.tasks.contains_key(&target.id()) {
            self.cancel_task(target.id());
        } else {
            target.cancel();
        }
    }

    // ---- effects -----------------------------------------------------------

    fn run_effect(&mut self, id: TaskId, eid: EffectId, owner: Owner, effect: Effect) {
        let label = effect.label();
        let branch = match owner {
            Owner::Task => None,
            Owner::Branch { parent, index } => Some((parent, index)),
        };
        let parent_effect = branch.map(|(parent, _)| parent);
        self.effects.insert(
            eid,
            EffectRecord {
                task: id,
                owner,
                label,
                undo: Undo::Nothing,
                combinator: None,
            },
        );
        self.bus.publish(
            Event::new(EventKind::EffectTriggered)
                .with_task_id(id)
                .with_effect(eid, label)
                .with_parent_effect(parent_effect),
        );

        match effect {
            Effect::Take(from) => {
                let origin = match &from {
                    TakeFrom::Channel(chan) => Some(chan.clone()),
                    _ => None,
                };
                let cell = InlineCell::new();
                let taker = cell.settler(&self.mailbox, eid, origin.clone());
                let ticket = match from {
                    TakeFrom::Default(pattern) => self.channel.take(pattern, taker),
                    TakeFrom::Events(chan, pattern) => chan.take(pattern, taker),
                    TakeFrom::Channel(chan) => chan.take(taker),
                };
                self.set_undo(eid, Undo::Take(ticket));
                self.settle_or_arm(eid, branch, cell, origin);
            }
            Effect::Put { to, message, wait } => match (to, wait) {
                (PutTo::Channel(chan), true) => {
                    let cell = InlineCell::new();
                    let settle = cell.settler(&self.mailbox, eid, None);
                    chan.put(message, move |accepted| settle(Ok(Value::Bool(accepted))));
                    self.settle_or_arm(eid, branch, cell, None);
                }
                (PutTo::Dispatch, true) => {
                    (self.io.dispatch)(message);
                    self.settle(eid, Ok(Value::Bool(true)));
                }
                (to, false) => {
                    self.put_now(to, message);
                    self.settle(eid, Ok(Value::Unit));
                }
            },
            Effect::Call { saga, args } => {
                let child = self.spawn_task(&saga, args, Some(id), Link::Called(eid), None);
                self.set_undo(eid, Undo::Child(child.id()));
                self.poll_task(child.id());
            }
            Effect::Fork { saga, args } => {
                let child = self.spawn_task(&saga, args, Some(id), Link::Forked(eid), None);
                self.poll_task(child.id());
                self.settle(eid, Ok(Value::Task(child)));
            }
            Effect::Join(target) => self.join(id, eid, target),
            Effect::Cancel(target) => {
                match &target {
                    Some(handle) => self.cancel_handle(handle),
                    None => self.cancel_task(id),
                }
                self.settle(eid, Ok(Value::Unit));
            }
            Effect::Race(set) => self.run_combinator(id, eid, true, set),
            Effect::All(set) => self.run_combinator(id, eid, false, set),
            Effect::Select(selector) => {
                let state = (self.io.get_state)();
                self.settle(eid, Ok(selector(&state)));
            }
            Effect::Cancelled => {
                let cancelled = self.tasks.get(&id).is_some_and(|node| node.cancelled);
                self.settle(eid, Ok(Value::Bool(cancelled)));
            }
        }
    }

    fn put_now(&self, to: PutTo, message: Value) {
        match to {
            PutTo::Dispatch => (self.io.dispatch)(message),
            PutTo::Channel(chan) => chan.put(message, |_| {}),
        }
    }

    fn join(&mut self, id: TaskId, eid: EffectId, target: TaskHandle) {
        let target_id = target.id();
        if target_id == id {
            self.settle(eid, Err(SagaError::misuse("a task cannot join itself")));
        } else if let Some(node) = self.tasks.get_mut(&target_id) {
            node.joiners.push(eid);
            self.set_undo(eid, Undo::Join(target_id));
        } else if let Some(outcome) = target.outcome() {
            self.settle(eid, outcome.into_joined());
        } else {
            // task of another runtime
            let settle = settler(&self.mailbox, eid);
            let watch = tokio::spawn(async move { settle(target.done().await.into_joined()) });
            self.set_undo(eid, Undo::Watch(watch));
        }
    }

    fn run_combinator(&mut self, id: TaskId, eid: EffectId, race: bool, set: Effects) {
        let (keys, effects) = set.split();
        let n = effects.len();
        let combinator = Combinator {
            race,
            keys,
            results: vec![None; n],
            remaining: n,
        };
        if n == 0 {
            let empty = combinator.empty();
            self.settle(eid, Ok(empty));
            return;
        }

        let branches: Vec<EffectId> = (0..n).map(|_| self.next_effect_id()).collect();
        if let Some(rec) = self.effects.get_mut(&eid) {
            rec.combinator = Some(combinator);
            rec.undo = Undo::Branches(branches.clone());
        }

        self.passes.push(Pass::new(eid));
        for (index, (branch, effect)) in branches.into_iter().zip(effects).enumerate() {
            // withdrawn meanwhile, or a settled branch already decides the outcome
            let decided = self.passes.last().is_some_and(|pass| pass.decided(race));
            if decided || !self.effects.contains_key(&eid) {
                break;
            }
            self.run_effect(id, branch, Owner::Branch { parent: eid, index }, effect);
        }
        let Some(pass) = self.passes.pop() else {
            return;
        };
        for (index, early) in pass.finish() {
            match early {
                Early::Settled(result) => self.settle_branch(eid, index, result),
                Early::Captured {
                    effect,
                    result,
                    origin,
                } => self.deliver(effect, result, origin),
            }
        }
    }

    /// Settles a synchronously served effect now, or holds it back while its
    /// combinator is still starting branches.
    fn settle_or_arm(
        &mut self,
        eid: EffectId,
        branch: Option<(EffectId, usize)>,
        cell: InlineCell,
        origin: Option<Channel>,
    ) {
        if let Some((parent, index)) = branch {
            if let Some(pass) = self.passes.iter_mut().rev().find(|p| p.parent == parent) {
                pass.armed.push(ArmedBranch {
                    index,
                    effect: eid,
                    cell,
                    origin,
                });
                return;
            }
        }
        if let Some(result) = cell.detach() {
            self.deliver(eid, result, origin);
        }
    }

    fn set_undo(&mut self, eid: EffectId, undo: Undo) {
        if let Some(rec) = self.effects.get_mut(&eid) {
            rec.undo = undo;
        }
    }

    /// Settles `eid`. If it was withdrawn, a message taken from `origin` goes back there.
    fn deliver(&mut self, eid: EffectId, result: Result<Value, SagaError>, origin: Option<Channel>) {
        if self.effects.contains_key(&eid) {
            self.settle(eid, result);
            return;
        }
        if let (Some(chan), Ok(message)) = (origin, result) {
            if !message.is_end() {
                chan.requeue(message);
            }
        }
    }

    /// Settles `eid` with `result`; ignored if it already settled or was withdrawn.
    fn settle(&mut self, eid: EffectId, result: Result<Value, SagaError>) {
        let Some(rec) = self.effects.remove(&eid) else {
            return;
        };
        let mut ev = match &result {
            Ok(_) => Event::new(EventKind::EffectResolved),
            Err(err) => Event::new(EventKind::EffectRejected).with_reason(err.to_string()),
        };
        ev = ev.with_task_id(rec.task).with_effect(eid, rec.label);
        self.bus.publish(ev);

        match rec.owner {
            Owner::Task => self.resume(rec.task, eid, result),
            Owner::Branch { parent, index } => self.settle_branch(parent, index, result),
        }
    }

    fn resume(&mut self, id: TaskId, eid: EffectId, result: Result<Value, SagaError>) {
        let Some(node) = self.tasks.get_mut(&id) else {
            return;
        };
        if node.pending != Some(eid) {
            return;
        }
        node.pending = None;
        lock(&node.slot).resume = Some(result);
        if !node.polling {
            self.ready.push_back(id);
        }
    }

    fn settle_branch(&mut self, parent: EffectId, index: usize, result: Result<Value, SagaError>) {
        if let Some(pass) = self.passes.iter_mut().rev().find(|p| p.parent == parent) {
            pass.early.push((index, result));
            return;
        }
        let Some(rec) = self.effects.get_mut(&parent) else {
            return;
        };
        let Some(comb) = rec.combinator.as_mut() else {
            return;
        };

        if comb.race {
            let outcome = result.map(|value| comb.winner(index, value));
            let losers = mem::replace(&mut rec.undo, Undo::Nothing);
            self.undo(parent, losers);
            self.settle(parent, outcome);
            return;
        }

        match result {
            Ok(value) => {
                if let Some(slot) = comb.results.get_mut(index) {
                    *slot = Some(value);
                }
                comb.remaining = comb.remaining.saturating_sub(1);
                if comb.remaining == 0 {
                    let all = comb.collect();
                    self.settle(parent, Ok(all));
                }
            }
            Err(err) => {
                let rest = mem::replace(&mut rec.undo, Undo::Nothing);
                self.undo(parent, rest);
                self.settle(parent, Err(err));
            }
        }
    }

    /// Withdraws a pending effect.
    fn cancel_effect(&mut self, eid: EffectId) {
        let Some(rec) = self.effects.remove(&eid) else {
            return;
        };
        self.bus.publish(
            Event::new(EventKind::EffectCancelled)
                .with_task_id(rec.task)
                .with_effect(eid, rec.label),
        );
        self.undo(eid, rec.undo);
    }

    fn undo(&mut self, eid: EffectId, undo: Undo) {
        match undo {
            Undo::Nothing => {}
            Undo::Take(ticket) => ticket.cancel(),
            Undo::Child(child) => self.cancel_task(child),
            Undo::Branches(branches) => {
                for branch in branches {
                    self.cancel_effect(branch);
                }
            }
            Undo::Join(target) => {
                if let Some(node) = self.tasks.get_mut(&target) {
                    node.joiners.retain(|joiner| *joiner != eid);
                }
            }
            Undo::Watch(watch) => watch.abort(),
        }
    }
}

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::channels::{source_fn, Channel, Emitter, Listener, Unsubscribe};
use crate::core::{Config, Outcome, Runtime, TaskHandle, TaskState};
use crate::effects::{Effect, Effects};
use crate::error::SagaError;
use crate::events::EventKind;
use crate::helpers::{take_every, take_latest};
use crate::sagas::{SagaFn, SagaRef};
use crate::value::{Message, Value};

type Dispatched = Arc<Mutex<Vec<Value>>>;

fn runtime(cfg: Config, actions: &Emitter<Value>) -> (Runtime, Dispatched) {
    let dispatched: Dispatched = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&dispatched);
    let rt = Runtime::builder(cfg)
        .with_source(actions.clone())
        .with_dispatch(move |v| sink.lock().unwrap().push(v))
        .with_state(|| Value::from(41))
        .build();
    (rt, dispatched)
}

fn msg(tag: &str) -> Value {
    Message::new(tag).into()
}

/// Lets the driver work through everything it can do without outside input.
async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

fn blocked_on(chan: &Channel) -> SagaRef {
    let chan = chan.clone();
    SagaFn::arc("blocked", move |cx, _args| {
        let chan = chan.clone();
        async move { cx.take_from(&chan).await }
    })
}

fn failing() -> SagaRef {
    SagaFn::arc("failing", |_cx, _args| async {
        Err(SagaError::fail("boom"))
    })
}

#[tokio::test]
async fn take_skips_unmatched_messages_and_sees_end() {
    let actions = Emitter::<Value>::new();
    let (rt, _) = runtime(Config::default(), &actions);

    let task = rt.run(
        SagaFn::arc("reader", |cx, _args| async move {
            let first = cx.take("A").await?;
            let second = cx.take("A").await?;
            Ok(Value::List(vec![first, second]))
        }),
        Vec::new(),
    );
    assert_eq!(task.name(), "root");

    settle().await;
    actions.emit(&msg("B"));
    actions.emit(&msg("A"));
    settle().await;
    actions.emit(&Value::End);

    assert_eq!(
        task.done().await,
        Outcome::Done(Value::List(vec![msg("A"), Value::End]))
    );
}

#[tokio::test]
async fn channel_keeps_fifo_order_between_routines() {
    let actions = Emitter::<Value>::new();
    let (rt, _) = runtime(Config::default().with_name("fifo"), &actions);
    let chan = Channel::new();

    let c = chan.clone();
    let task = rt.run(
        SagaFn::arc("fifo", move |cx, _args| {
            let c = c.clone();
            async move {
                for n in 1..=3 {
                    cx.put_to(&c, n).await?;
                }
                cx.put_to(&c, Value::End).await?;
                let mut got = Vec::new();
                loop {
                    let v = cx.take_from(&c).await?;
                    if v.is_end() {
                        break;
                    }
                    got.push(v);
                }
                Ok(Value::List(got))
            }
        }),
        Vec::new(),
    );

    assert_eq!(task.name(), "fifo");
    assert_eq!(
        task.done().await,
        Outcome::Done(Value::List(vec![1.into(), 2.into(), 3.into()]))
    );
    assert!(chan.is_closed());
}

#[tokio::test]
async fn race_winner_withdraws_losing_take() {
    let actions = Emitter::<Value>::new();
    let (rt, _) = runtime(Config::default(), &actions);
    let (a, b) = (Channel::new(), Channel::new());

    let (ca, cb) = (a.clone(), b.clone());
    let task = rt.run(
        SagaFn::arc("racer", move |cx, _args| {
            let (ca, cb) = (ca.clone(), cb.clone());
            async move {
                cx.race(Effects::keyed([
                    ("a", Effect::take_from(&ca)),
                    ("b", Effect::take_from(&cb)),
                ]))
                .await
            }
        }),
        Vec::new(),
    );

    settle().await;
    assert_eq!((a.pending_takers(), b.pending_takers()), (1, 1));
    a.put(Value::from(7), |_| {});

    let Outcome::Done(won) = task.done().await else {
        panic!("race should resolve");
    };
    assert_eq!(won.get("a"), Some(&Value::from(7)));
    assert_eq!(won.get("b"), None);
    assert_eq!(b.pending_takers(), 0);
}

#[tokio::test]
async fn race_tie_goes_to_first_listed_effect() {
    let actions = Emitter::<Value>::new();
    let (rt, _) = runtime(Config::default(), &actions);
    let (a, b) = (Channel::new(), Channel::new());
    a.put(Value::from(1), |_| {});
    b.put(Value::from(2), |_| {});

    let (ca, cb) = (a.clone(), b.clone());
    let task = rt.run(
        SagaFn::arc("tie", move |cx, _args| {
            let (ca, cb) = (ca.clone(), cb.clone());
            async move {
                cx.race(vec![Effect::take_from(&ca), Effect::take_from(&cb)])
                    .await
            }
        }),
        Vec::new(),
    );

    assert_eq!(
        task.done().await,
        Outcome::Done(Value::List(vec![Value::from(1), Value::Unit]))
    );
    // the second branch never started, so its message is still queued
    assert_eq!(b.pending_puts(), 1);
}

#[tokio::test]
async fn race_loser_hands_its_message_back() {
    let actions = Emitter::<Value>::new();
    let (rt, _) = runtime(Config::default(), &actions);
    let (go, c1, c2) = (Channel::new(), Channel::new(), Channel::new());

    let (pgo, p1, p2) = (go.clone(), c1.clone(), c2.clone());
    let producer = SagaFn::arc("producer", move |cx, _args| {
        let (pgo, p1, p2) = (pgo.clone(), p1.clone(), p2.clone());
        async move {
            cx.take_from(&pgo).await?;
            cx.put_to(&p1, 1).await?;
            cx.put_to(&p2, 2).await?;
            Ok(Value::Unit)
        }
    });
    let (r1, r2) = (c1.clone(), c2.clone());
    let task = rt.run(
        SagaFn::arc("racer", move |cx, _args| {
            let (producer, r1, r2) = (producer.clone(), r1.clone(), r2.clone());
            async move {
                cx.fork(&producer, Vec::new()).await?;
                cx.race(Effects::keyed([
                    ("a", Effect::take_from(&r1)),
                    ("b", Effect::take_from(&r2)),
                ]))
                .await
            }
        }),
        Vec::new(),
    );

    settle().await;
    go.put(Value::Unit, |_| {});

    let Outcome::Done(won) = task.done().await else {
        panic!("race should resolve");
    };
    assert_eq!(won.get("a"), Some(&Value::from(1)));
    assert_eq!(won.get("b"), None);
    // the losing branch's message stays in its channel
    assert_eq!(c2.pending_puts(), 1);
    assert_eq!(c2.pending_takers(), 0);
}

#[tokio::test]
async fn race_prefers_earlier_branch_served_by_later_one() {
    let actions = Emitter::<Value>::new();
    let (rt, _) = runtime(Config::default(), &actions);
    let chan = Channel::new();

    let c = chan.clone();
    let task = rt.run(
        SagaFn::arc("self-served", move |cx, _args| {
            let c = c.clone();
            async move {
                cx.race(Effects::keyed([
                    ("a", Effect::take_from(&c)),
                    ("b", Effect::put_to(&c, 5)),
                ]))
                .await
            }
        }),
        Vec::new(),
    );

    let Outcome::Done(won) = task.done().await else {
        panic!("race should resolve");
    };
    assert_eq!(won.get("a"), Some(&Value::from(5)));
    assert_eq!(won.get("b"), None);
    assert_eq!(chan.pending_puts(), 0);
    assert_eq!(chan.pending_takers(), 0);
}

#[tokio::test]
async fn upstream_error_fails_the_taking_task() {
    let listener: Arc<Mutex<Option<Listener>>> = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&listener);
    let rt = Runtime::builder(Config::default())
        .with_source(source_fn(move |l: Listener| {
            *slot.lock().unwrap() = Some(l);
            Unsubscribe::noop()
        }))
        .build();

    let task = rt.run(
        SagaFn::arc("reader", |cx, _args| async move { cx.take("A").await }),
        Vec::new(),
    );

    settle().await;
    let push = listener.lock().unwrap().clone().expect("source subscribed");
    push(Err(SagaError::upstream("gone")));

    assert_eq!(
        task.done().await,
        Outcome::Failed(SagaError::upstream("gone"))
    );
}

#[tokio::test]
async fn empty_race_and_all_settle_immediately() {
    let actions = Emitter::<Value>::new();
    let (rt, _) = runtime(Config::default(), &actions);

    let task = rt.run(
        SagaFn::arc("empty", |cx, _args| async move {
            let raced = cx.race(Vec::<Effect>::new()).await?;
            let all = cx.all(Effects::keyed(Vec::<(&str, Effect)>::new())).await?;
            Ok(Value::List(vec![raced, all]))
        }),
        Vec::new(),
    );

    let Outcome::Done(Value::List(parts)) = task.done().await else {
        panic!("expected a list");
    };
    assert_eq!(parts[0], Value::List(Vec::new()));
    assert_eq!(parts[1].as_map().map(|m| m.len()), Some(0));
}

#[tokio::test]
async fn cancelling_root_cancels_forks_and_withdraws_their_takes() {
    let actions = Emitter::<Value>::new();
    let (rt, _) = runtime(Config::default(), &actions);
    let (work, idle) = (Channel::new(), Channel::new());
    let forks = Arc::new(Mutex::new(Vec::new()));

    let child = blocked_on(&work);
    let (seen, root_idle) = (Arc::clone(&forks), idle.clone());
    let task = rt.run(
        SagaFn::arc("parent", move |cx, _args| {
            let (child, seen, root_idle) = (child.clone(), Arc::clone(&seen), root_idle.clone());
            async move {
                for _ in 0..2 {
                    let handle = cx.fork(&child, Vec::new()).await?;
                    seen.lock().unwrap().push(handle);
                }
                cx.take_from(&root_idle).await
            }
        }),
        Vec::new(),
    );

    settle().await;
    assert_eq!(work.pending_takers(), 2);
    assert_eq!(task.state(), TaskState::Suspended);

    task.cancel();
    assert_eq!(task.done().await, Outcome::Cancelled);

    assert_eq!(work.pending_takers(), 0);
    assert_eq!(idle.pending_takers(), 0);
    let forks = forks.lock().unwrap();
    assert_eq!(forks.len(), 2);
    for fork in forks.iter() {
        assert_eq!(fork.outcome(), Some(Outcome::Cancelled));
    }
}

#[tokio::test]
async fn cancellation_reaches_grandchildren() {
    let actions = Emitter::<Value>::new();
    let (rt, _) = runtime(Config::default(), &actions);
    let (work, idle) = (Channel::new(), Channel::new());
    let handles: Arc<Mutex<Vec<TaskHandle>>> = Arc::new(Mutex::new(Vec::new()));

    let grandchild = blocked_on(&work);
    let (seen, mid_work) = (Arc::clone(&handles), work.clone());
    let middle = SagaFn::arc("middle", move |cx, _args| {
        let (grandchild, seen, mid_work) = (grandchild.clone(), Arc::clone(&seen), mid_work.clone());
        async move {
            let handle = cx.fork(&grandchild, Vec::new()).await?;
            seen.lock().unwrap().push(handle);
            cx.take_from(&mid_work).await
        }
    });
    let (seen, root_idle) = (Arc::clone(&handles), idle.clone());
    let task = rt.run(
        SagaFn::arc("root", move |cx, _args| {
            let (middle, seen, root_idle) = (middle.clone(), Arc::clone(&seen), root_idle.clone());
            async move {
                let handle = cx.fork(&middle, Vec::new()).await?;
                seen.lock().unwrap().push(handle);
                cx.take_from(&root_idle).await
            }
        }),
        Vec::new(),
    );

    settle().await;
    assert_eq!(work.pending_takers(), 2);

    task.cancel();
    assert_eq!(task.done().await, Outcome::Cancelled);

    assert_eq!(work.pending_takers(), 0);
    let handles = handles.lock().unwrap();
    assert_eq!(handles.len(), 2);
    for handle in handles.iter() {
        assert_eq!(handle.outcome(), Some(Outcome::Cancelled));
    }
}

#[tokio::test]
async fn fork_failure_aborts_parent() {
    let actions = Emitter::<Value>::new();
    let (rt, _) = runtime(Config::default(), &actions);
    let (trigger, idle) = (Channel::new(), Channel::new());

    let t = trigger.clone();
    let child = SagaFn::arc("late-failure", move |cx, _args| {
        let t = t.clone();
        async move {
            cx.take_from(&t).await?;
            Err(SagaError::fail("boom"))
        }
    });
    let root_idle = idle.clone();
    let task = rt.run(
        SagaFn::arc("parent", move |cx, _args| {
            let (child, root_idle) = (child.clone(), root_idle.clone());
            async move {
                cx.fork(&child, Vec::new()).await?;
                cx.take_from(&root_idle).await
            }
        }),
        Vec::new(),
    );

    settle().await;
    assert_eq!(idle.pending_takers(), 1);
    trigger.put(Value::Unit, |_| {});

    assert_eq!(task.done().await, Outcome::Failed(SagaError::fail("boom")));
    assert_eq!(idle.pending_takers(), 0);
}

#[tokio::test]
async fn call_returns_value_and_errors_are_catchable() {
    let actions = Emitter::<Value>::new();
    let (rt, _) = runtime(Config::default(), &actions);

    let double = SagaFn::arc("double", |_cx, args| async move {
        let n = args.first().and_then(Value::as_int).unwrap_or(0);
        Ok(Value::from(n * 2))
    });
    let broken = failing();
    let task = rt.run(
        SagaFn::arc("caller", move |cx, _args| {
            let (double, broken) = (double.clone(), broken.clone());
            async move {
                let doubled = cx.call(&double, vec![Value::from(21)]).await?;
                let caught = match cx.call(&broken, Vec::new()).await {
                    Err(err) => Value::from(err == SagaError::fail("boom")),
                    Ok(v) => v,
                };
                Ok(Value::List(vec![doubled, caught]))
            }
        }),
        Vec::new(),
    );

    assert_eq!(
        task.done().await,
        Outcome::Done(Value::List(vec![Value::from(42), Value::from(true)]))
    );
}

#[tokio::test]
async fn root_waits_for_running_forks() {
    let actions = Emitter::<Value>::new();
    let (rt, _) = runtime(Config::default(), &actions);
    let work = Channel::new();

    let child = blocked_on(&work);
    let task = rt.run(
        SagaFn::arc("parent", move |cx, _args| {
            let child = child.clone();
            async move {
                cx.fork(&child, Vec::new()).await?;
                Ok(Value::from(1))
            }
        }),
        Vec::new(),
    );

    settle().await;
    assert!(task.is_running());
    work.put(Value::Unit, |_| {});
    assert_eq!(task.done().await, Outcome::Done(Value::from(1)));
}

#[tokio::test]
async fn join_yields_child_value_or_cancelled_marker() {
    let actions = Emitter::<Value>::new();
    let (rt, _) = runtime(Config::default(), &actions);
    let (work, idle) = (Channel::new(), Channel::new());

    let worker = blocked_on(&work);
    let sleeper = blocked_on(&idle);
    let task = rt.run(
        SagaFn::arc("joiner", move |cx, _args| {
            let (worker, sleeper) = (worker.clone(), sleeper.clone());
            async move {
                let doomed = cx.fork(&sleeper, Vec::new()).await?;
                cx.cancel(&doomed).await?;
                let cancelled = cx.join(&doomed).await?;

                let live = cx.fork(&worker, Vec::new()).await?;
                let value = cx.join(&live).await?;
                Ok(Value::List(vec![cancelled, value]))
            }
        }),
        Vec::new(),
    );

    settle().await;
    assert_eq!(idle.pending_takers(), 0);
    work.put(Value::from(5), |_| {});

    assert_eq!(
        task.done().await,
        Outcome::Done(Value::List(vec![Value::Cancelled, Value::from(5)]))
    );
}

#[tokio::test]
async fn join_follows_task_of_another_runtime() {
    let actions = Emitter::<Value>::new();
    let (rt, _) = runtime(Config::default(), &actions);
    let (other_rt, _) = runtime(Config::default().with_name("other"), &actions);
    let work = Channel::new();

    let other = other_rt.run(blocked_on(&work), Vec::new());
    let target = other.clone();
    let task = rt.run(
        SagaFn::arc("watcher", move |cx, _args| {
            let target = target.clone();
            async move { cx.join(&target).await }
        }),
        Vec::new(),
    );

    settle().await;
    assert!(task.is_running());
    work.put(Value::from(9), |_| {});

    assert_eq!(other.done().await, Outcome::Done(Value::from(9)));
    assert_eq!(task.done().await, Outcome::Done(Value::from(9)));
}

#[tokio::test]
async fn all_collects_by_key_and_fails_fast() {
    let actions = Emitter::<Value>::new();
    let (rt, _) = runtime(Config::default(), &actions);
    let chan = Channel::new();

    let c = chan.clone();
    let task = rt.run(
        SagaFn::arc("gather", move |cx, _args| {
            let c = c.clone();
            async move {
                cx.all(Effects::keyed([
                    ("state", Effect::select(|s: &Value| s.clone())),
                    ("next", Effect::take_from(&c)),
                ]))
                .await
            }
        }),
        Vec::new(),
    );
    settle().await;
    chan.put(Value::from(2), |_| {});

    let Outcome::Done(all) = task.done().await else {
        panic!("all should resolve");
    };
    assert_eq!(all.get("state"), Some(&Value::from(41)));
    assert_eq!(all.get("next"), Some(&Value::from(2)));

    let c = chan.clone();
    let broken = failing();
    let task = rt.run(
        SagaFn::arc("gather-broken", move |cx, _args| {
            let (c, broken) = (c.clone(), broken.clone());
            async move {
                cx.all(vec![Effect::take_from(&c), Effect::call(&broken, Vec::new())])
                    .await
            }
        }),
        Vec::new(),
    );
    assert_eq!(task.done().await, Outcome::Failed(SagaError::fail("boom")));
    assert_eq!(chan.pending_takers(), 0);
}

#[tokio::test(start_paused = true)]
async fn delay_wins_race_as_timeout() {
    let actions = Emitter::<Value>::new();
    let (rt, _) = runtime(Config::default(), &actions);

    let task = rt.run(
        SagaFn::arc("timed", |cx, _args| async move {
            cx.race(Effects::keyed([
                ("msg", Effect::take("PING")),
                ("timeout", Effect::delay(Duration::from_millis(50))),
            ]))
            .await
        }),
        Vec::new(),
    );

    let Outcome::Done(won) = task.done().await else {
        panic!("race should resolve");
    };
    assert_eq!(won.get("timeout"), Some(&Value::Unit));
    assert_eq!(won.get("msg"), None);
}

#[tokio::test(start_paused = true)]
async fn foreign_futures_wake_the_routine() {
    let actions = Emitter::<Value>::new();
    let (rt, _) = runtime(Config::default(), &actions);

    let task = rt.run(
        SagaFn::arc("sleepy", |cx, _args| async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            cx.select(|s| s.clone()).await
        }),
        Vec::new(),
    );
    assert_eq!(task.done().await, Outcome::Done(Value::from(41)));
}

#[tokio::test]
async fn cleanup_runs_non_suspending_effects_only() {
    let actions = Emitter::<Value>::new();
    let (rt, dispatched) = runtime(Config::default(), &actions);
    let idle = Channel::new();

    let c = idle.clone();
    let task = rt.run(
        SagaFn::arc("tidy", move |cx, _args| {
            let c = c.clone();
            async move {
                match cx.take_from(&c).await {
                    Err(err) if err.is_cancelled() => {
                        let flag = cx.cancelled().await?;
                        cx.put(flag).await?;
                        let blocked = cx.take_from(&c).await;
                        cx.put(blocked == Err(SagaError::Cancelled)).await?;
                        Err(err)
                    }
                    other => other,
                }
            }
        }),
        Vec::new(),
    );

    settle().await;
    task.cancel();
    assert_eq!(task.done().await, Outcome::Cancelled);
    assert_eq!(idle.pending_takers(), 0);
    assert_eq!(
        *dispatched.lock().unwrap(),
        vec![Value::from(true), Value::from(true)]
    );
}

#[tokio::test]
async fn cancel_self_enters_cleanup() {
    let actions = Emitter::<Value>::new();
    let (rt, dispatched) = runtime(Config::default(), &actions);

    let task = rt.run(
        SagaFn::arc("quitter", |cx, _args| async move {
            if let Err(err) = cx.cancel_self().await {
                cx.put(cx.cancelled().await?).await?;
                return Err(err);
            }
            Ok(Value::from("unreachable"))
        }),
        Vec::new(),
    );

    assert_eq!(task.done().await, Outcome::Cancelled);
    assert_eq!(*dispatched.lock().unwrap(), vec![Value::from(true)]);
}

#[tokio::test]
async fn panicking_routine_fails_its_task() {
    let actions = Emitter::<Value>::new();
    let (rt, dispatched) = runtime(Config::default(), &actions);

    let task = rt.run(
        SagaFn::arc("panicky", |cx, args| async move {
            cx.put(1).await?;
            if args.is_empty() {
                panic!("kaboom");
            }
            Ok(Value::Unit)
        }),
        Vec::new(),
    );

    assert_eq!(
        task.done().await,
        Outcome::Failed(SagaError::fail("saga panicked: kaboom"))
    );
    assert_eq!(*dispatched.lock().unwrap(), vec![Value::from(1)]);
}

#[tokio::test]
async fn two_outstanding_effects_are_misuse() {
    let actions = Emitter::<Value>::new();
    let (rt, _) = runtime(Config::default(), &actions);
    let (a, b) = (Channel::new(), Channel::new());

    let (ca, cb) = (a.clone(), b.clone());
    let task = rt.run(
        SagaFn::arc("greedy", move |cx, _args| {
            let (ca, cb) = (ca.clone(), cb.clone());
            async move {
                let (first, second) = futures::join!(cx.take_from(&ca), cx.take_from(&cb));
                first?;
                second
            }
        }),
        Vec::new(),
    );

    settle().await;
    assert_eq!((a.pending_takers(), b.pending_takers()), (1, 0));
    a.put(Value::Unit, |_| {});

    let Outcome::Failed(err) = task.done().await else {
        panic!("expected misuse");
    };
    assert_eq!(err.as_label(), "saga_misuse");
}

#[tokio::test]
async fn sync_budget_does_not_lose_effects() {
    let actions = Emitter::<Value>::new();
    let cfg = Config {
        sync_budget: 2,
        ..Config::default()
    };
    let (rt, dispatched) = runtime(cfg, &actions);

    let task = rt.run(
        SagaFn::arc("chatty", |cx, _args| async move {
            for n in 0..10 {
                cx.put(n).await?;
            }
            Ok(Value::Unit)
        }),
        Vec::new(),
    );

    assert_eq!(task.done().await, Outcome::Done(Value::Unit));
    let expected: Vec<Value> = (0..10).map(Value::from).collect();
    assert_eq!(*dispatched.lock().unwrap(), expected);
}

#[tokio::test]
async fn take_every_forks_a_worker_per_message() {
    let actions = Emitter::<Value>::new();
    let (rt, dispatched) = runtime(Config::default(), &actions);

    let worker = SagaFn::arc("echo", |cx, args| async move {
        cx.put(args.into_iter().next().unwrap_or_default()).await?;
        Ok(Value::Unit)
    });
    let task = rt.run(take_every("JOB", worker), Vec::new());

    for n in 1..=2 {
        settle().await;
        actions.emit(&Message::new("JOB").with_payload(n).into());
    }
    settle().await;
    actions.emit(&Value::End);

    assert_eq!(task.done().await, Outcome::Done(Value::Unit));
    assert_eq!(
        *dispatched.lock().unwrap(),
        vec![
            Value::from(Message::new("JOB").with_payload(1)),
            Value::from(Message::new("JOB").with_payload(2)),
        ]
    );
}

#[tokio::test]
async fn take_latest_cancels_previous_worker() {
    let actions = Emitter::<Value>::new();
    let (rt, _) = runtime(Config::default(), &actions);
    let idle = Channel::new();
    let cancelled = Arc::new(Mutex::new(Vec::new()));

    let (c, log) = (idle.clone(), Arc::clone(&cancelled));
    let worker = SagaFn::arc("slow", move |cx, args| {
        let (c, log) = (c.clone(), Arc::clone(&log));
        async move {
            let job = args.into_iter().next().unwrap_or_default();
            match cx.take_from(&c).await {
                Err(err) if err.is_cancelled() => {
                    log.lock().unwrap().push(job);
                    Err(err)
                }
                other => other,
            }
        }
    });
    let task = rt.run(take_latest("JOB", worker), Vec::new());

    for n in 1..=2 {
        settle().await;
        actions.emit(&Message::new("JOB").with_payload(n).into());
    }
    settle().await;
    assert_eq!(
        *cancelled.lock().unwrap(),
        vec![Value::from(Message::new("JOB").with_payload(1))]
    );
    assert_eq!(idle.pending_takers(), 1);

    actions.emit(&Value::End);
    settle().await;
    // the watcher returned, but its last worker keeps the tree alive
    assert!(task.is_running());

    task.cancel();
    assert_eq!(task.done().await, Outcome::Cancelled);
    assert_eq!(cancelled.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn monitor_events_follow_the_task_lifecycle() {
    let actions = Emitter::<Value>::new();
    let (rt, _) = runtime(Config::default(), &actions);
    let mut rx = rt.bus().subscribe();

    let task = rt.run(
        SagaFn::arc("announcer", |cx, _args| async move {
            cx.put("hello").await?;
            Ok(Value::Unit)
        }),
        Vec::new(),
    );
    assert_eq!(task.done().await, Outcome::Done(Value::Unit));

    let mut kinds = Vec::new();
    while let Ok(ev) = rx.recv().await {
        if ev.task_id.is_some() {
            assert_eq!(ev.task_id, Some(task.id()));
        }
        kinds.push(ev.kind);
        if ev.kind == EventKind::RootSettled {
            break;
        }
    }
    assert_eq!(
        kinds,
        vec![
            EventKind::TaskStarted,
            EventKind::EffectTriggered,
            EventKind::EffectResolved,
            EventKind::TaskDone,
            EventKind::RootSettled,
        ]
    );
}

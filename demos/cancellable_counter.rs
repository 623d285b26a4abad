//! # Example: cancellable_counter
//!
//! A countdown that ticks through `put` effects until it runs out or a cancel
//! message arrives.
//!
//! Shows how to:
//! - Wait for messages from an external source with `take`
//! - Build a timeout with `race` over `delay` and `take`
//! - Call a child routine and fork a background one
//! - Cancel a task tree from outside via [`TaskHandle::cancel`]
//!
//! ## Flow
//! ```text
//! main()
//!   ├─► Runtime::run(watcher)
//!   │     └─► take("INCREMENT_ASYNC")
//!   │           └─► call(countdown)
//!   │                 └─► race { tick: delay(200ms), stop: take("CANCEL_INCREMENT_ASYNC") }
//!   │                       ├─► tick → put(INCREMENT), loop
//!   │                       └─► stop → put(COUNTDOWN_TERMINATED), return
//!   │
//!   └─► controller
//!         ├─► emit INCREMENT_ASYNC
//!         ├─► sleep 700ms, emit CANCEL_INCREMENT_ASYNC
//!         ├─► emit End (watcher returns, heartbeat fork keeps the tree alive)
//!         └─► handle.cancel() (heartbeat cancelled, root Cancelled)
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --example cancellable_counter --features logging
//! ```

use std::{sync::Arc, time::Duration};

use sagavisor::{
    Config, Effect, Effects, Emitter, LogWriter, Message, Outcome, Runtime, SagaFn, SagaRef,
    Subscribe, Value,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    println!("=== cancellable_counter example ===\n");

    // 1. External source of actions, and a dispatch sink that prints
    let actions = Emitter::<Value>::new();
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let rt = Runtime::builder(Config::default().with_name("counter-app"))
        .with_source(actions.clone())
        .with_dispatch(|v| println!("[dispatch] {v:?}"))
        .with_subscribers(subs)
        .build();

    // 2. Countdown: ticks until it runs out or gets cancelled
    let countdown: SagaRef = SagaFn::arc("countdown", |cx, args| async move {
        let mut left = args.first().and_then(Value::as_int).unwrap_or(5);
        while left > 0 {
            let winner = cx
                .race(Effects::keyed([
                    ("tick", Effect::delay(Duration::from_millis(200))),
                    ("stop", Effect::take("CANCEL_INCREMENT_ASYNC")),
                ]))
                .await?;
            if winner.get("stop").is_some() {
                cx.put(Message::new("COUNTDOWN_TERMINATED")).await?;
                return Ok(Value::from(left));
            }
            left -= 1;
            cx.put(Message::new("INCREMENT").with_payload(left)).await?;
        }
        Ok(Value::from(0))
    });

    // 3. Heartbeat: runs until its tree is cancelled
    let heartbeat: SagaRef = SagaFn::arc("heartbeat", |cx, _args| async move {
        while !cx.cancelled().await? {
            cx.delay(Duration::from_millis(300)).await?;
            println!("[heartbeat] still here");
        }
        Ok(Value::Unit)
    });

    // 4. Watcher: starts a countdown on INCREMENT_ASYNC
    let watcher: SagaRef = SagaFn::arc("watcher", move |cx, _args| {
        let (countdown, heartbeat) = (countdown.clone(), heartbeat.clone());
        async move {
            cx.fork(&heartbeat, Vec::new()).await?;
            loop {
                let msg = cx.take("INCREMENT_ASYNC").await?;
                if msg.is_end() {
                    println!("[watcher] source ended");
                    return Ok(Value::Unit);
                }
                let left = cx.call(&countdown, vec![Value::from(10)]).await?;
                println!("[watcher] countdown stopped with {left:?} left");
            }
        }
    });

    let task = rt.run(watcher, Vec::new());

    // 5. Controller: start the countdown, stop it, end the source, cancel the tree
    tokio::time::sleep(Duration::from_millis(50)).await;
    actions.emit(&Message::new("INCREMENT_ASYNC").into());

    tokio::time::sleep(Duration::from_millis(700)).await;
    actions.emit(&Message::new("CANCEL_INCREMENT_ASYNC").into());

    tokio::time::sleep(Duration::from_millis(50)).await;
    actions.emit(&Value::End);

    tokio::time::sleep(Duration::from_millis(400)).await;
    println!("\n[controller] tree still running: {}", task.is_running());
    task.cancel();

    let outcome = task.done().await;
    println!("[controller] outcome: {outcome:?}");
    assert_eq!(outcome, Outcome::Cancelled);

    // Give the subscriber fan-out a moment to print the tail of the log.
    tokio::time::sleep(Duration::from_millis(50)).await;
    println!("\n=== example completed successfully ===");
    Ok(())
}

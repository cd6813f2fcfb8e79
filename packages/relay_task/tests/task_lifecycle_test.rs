//! End-to-end lifecycle of a task relaying its completion to an event loop

use relay_task::{
    event_loop, EventLoop, LoopConfig, Outcome, Task, TaskConfig, TaskError, TaskState,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex, OnceLock};
use std::thread;
use std::time::Duration;

fn ui_thread() -> (relay_task::LoopPoster, relay_task::CoordinationThread) {
    EventLoop::spawn(LoopConfig {
        thread_name: "ui".to_string(),
    })
    .unwrap()
}

#[test]
fn test_value_42_then_completion_on_coordination_context() {
    let (poster, ui) = ui_thread();
    let slot: Arc<OnceLock<Task<i32>>> = Arc::new(OnceLock::new());
    let runs = Arc::new(AtomicUsize::new(0));
    let seen = Arc::new(Mutex::new(None));

    let ui_handle = poster.clone();
    let task_slot = Arc::clone(&slot);
    let run_count = Arc::clone(&runs);
    let seen_in_completion = Arc::clone(&seen);
    let task = Task::builder(|_| Ok(42))
        .on_complete(poster, move || {
            run_count.fetch_add(1, Ordering::SeqCst);
            let result = task_slot.get().and_then(Task::result);
            let on_ui = ui_handle.is_coordination_context()
                && thread::current().name() == Some("ui");
            *seen_in_completion.lock().unwrap() = Some((result, on_ui));
        })
        .build();
    assert!(slot.set(task).is_ok());

    let task = slot.get().unwrap();
    task.start().unwrap();
    assert_eq!(task.await_result(), Some(42));

    assert_eq!(ui.join().unwrap(), 1);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(*seen.lock().unwrap(), Some((Some(42), true)));
    assert_eq!(task.state(), TaskState::Completed);
}

#[test]
fn test_concurrent_waiters_observe_same_value() {
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let task = Task::new(move |_| {
        release_rx.recv().map_err(TaskError::failed)?;
        Ok(String::from("shared"))
    });
    task.start().unwrap();

    let waiters: Vec<_> = (0..4)
        .map(|_| {
            let task = task.clone();
            thread::spawn(move || task.await_result())
        })
        .collect();

    thread::sleep(Duration::from_millis(20));
    assert!(task.result().is_none());
    assert!(task.outcome().is_none());

    release_tx.send(()).unwrap();
    for waiter in waiters {
        assert_eq!(waiter.join().unwrap().as_deref(), Some("shared"));
    }

    // Repeated reads after completion keep returning the same value.
    assert_eq!(task.await_result().as_deref(), Some("shared"));
    assert_eq!(task.await_result().as_deref(), Some("shared"));
    assert_eq!(task.result().as_deref(), Some("shared"));
}

#[test]
fn test_await_on_unstarted_task_returns_immediately() {
    let task = Task::from_fn(|| 1_u8);
    assert_eq!(task.await_result(), None);
    assert!(task.await_outcome().is_none());
    assert_eq!(task.state(), TaskState::NotStarted);
}

#[test]
fn test_second_start_fails_fast() {
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let starts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&starts);
    let task = Task::new(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        release_rx.recv().map_err(TaskError::failed)?;
        Ok(())
    });

    task.start().unwrap();
    assert!(matches!(task.start(), Err(TaskError::AlreadyStarted)));
    assert_eq!(task.state(), TaskState::Running);

    release_tx.send(()).unwrap();
    assert_eq!(task.await_result(), Some(()));
    assert!(matches!(task.start(), Err(TaskError::AlreadyStarted)));
    assert_eq!(starts.load(Ordering::SeqCst), 1);
}

#[test]
fn test_work_error_is_captured_as_failure() {
    let (poster, ui) = ui_thread();
    let delivered = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&delivered);

    let task = Task::<u32>::builder(|_| {
        Err(TaskError::failed(std::io::Error::other("sensor offline")))
    })
    .on_outcome(poster, move |outcome| {
        *sink.lock().unwrap() = Some(outcome.is_failed());
    })
    .start()
    .unwrap();

    assert_eq!(task.await_result(), None);
    match task.await_outcome() {
        Some(Outcome::Failed(TaskError::WorkFailed(source))) => {
            assert_eq!(source.to_string(), "sensor offline");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    ui.join().unwrap();
    assert_eq!(*delivered.lock().unwrap(), Some(true));
}

#[test]
fn test_panic_is_captured_and_completion_still_runs() {
    let (poster, ui) = ui_thread();
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);

    let task = Task::builder(|_| -> relay_task::TaskResult<u8> { panic!("kaboom") })
        .on_complete(poster, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .start()
        .unwrap();

    match task.await_outcome() {
        Some(Outcome::Failed(TaskError::Panicked(message))) => assert_eq!(message, "kaboom"),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(ui.join().unwrap(), 1);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[test]
fn test_spawn_failure_completes_task_and_posts_completion() {
    let (poster, mut ui) = event_loop();
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);

    // No platform hands out a 64 TiB thread stack.
    let task = Task::builder(|_| Ok(1_u8))
        .config(TaskConfig::default().with_stack_size(1 << 46))
        .on_complete(poster, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .build();

    assert!(matches!(task.start(), Err(TaskError::Spawn(_))));
    assert_eq!(task.state(), TaskState::Completed);
    assert!(!task.is_running());
    assert!(matches!(
        task.await_outcome(),
        Some(Outcome::Failed(TaskError::Spawn(_)))
    ));
    assert_eq!(task.await_result(), None);

    assert_eq!(ui.run_pending(), 1);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert!(matches!(task.start(), Err(TaskError::AlreadyStarted)));
}

#[test]
fn test_spawn_runs_work_then_completion() {
    let (poster, ui) = ui_thread();
    let events = Arc::new(Mutex::new(Vec::new()));

    let work_log = Arc::clone(&events);
    let done_log = Arc::clone(&events);
    let ui_handle = poster.clone();
    let task = Task::spawn(
        poster,
        move || work_log.lock().unwrap().push(("work", thread::current().name() == Some("ui"))),
        move || done_log.lock().unwrap().push(("done", ui_handle.is_coordination_context())),
    )
    .unwrap();

    assert_eq!(task.await_result(), Some(()));
    ui.join().unwrap();
    assert_eq!(*events.lock().unwrap(), vec![("work", false), ("done", true)]);
}

#[test]
fn test_spawn_creates_independent_tasks() {
    let (poster, ui) = event_loop();
    let first = Task::spawn(poster.clone(), || {}, || {}).unwrap();
    let second = Task::spawn(poster.clone(), || {}, || {}).unwrap();

    assert_eq!(first.await_result(), Some(()));
    assert_eq!(second.await_result(), Some(()));
    drop(poster);
    assert_eq!(ui.run(), 2);
}

#[test]
fn test_closed_poster_drops_completion() {
    let (poster, ui) = event_loop();
    drop(ui);

    let task = Task::builder(|_| Ok(5))
        .on_complete(poster, || panic!("completion must not run"))
        .start()
        .unwrap();

    assert_eq!(task.await_result(), Some(5));
    assert_eq!(task.state(), TaskState::Completed);
}

#[test]
fn test_completion_runs_once_even_when_cancelled_while_returning() {
    let (poster, ui) = ui_thread();
    let (entered_tx, entered_rx) = mpsc::channel::<()>();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);

    // Ignores the signal and completes normally.
    let task = Task::builder(move |_| {
        entered_tx.send(()).map_err(TaskError::failed)?;
        release_rx.recv().map_err(TaskError::failed)?;
        Ok(9)
    })
    .on_complete(poster, move || {
        counter.fetch_add(1, Ordering::SeqCst);
    })
    .start()
    .unwrap();

    entered_rx.recv().unwrap();
    task.cancel();
    assert_eq!(task.state(), TaskState::Cancelling);
    release_tx.send(()).unwrap();

    assert_eq!(ui.join().unwrap(), 1);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(task.result(), Some(9));
    assert_eq!(task.state(), TaskState::Completed);
}

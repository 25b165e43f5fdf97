//! Dispatcher behaviour across real worker threads.

use std::task::Poll;
use std::time::Duration;

use futures::future::join_all;
use tokio_test::{assert_pending, task};

use cfaview::dispatch::{Dispatcher, WorkerReply, WorkerRequest};
use cfaview::Error;

use crate::fixtures::{unit_id, wait_for, CountingWorker};

#[tokio::test]
async fn test_replies_follow_submission_order() {
    let (worker, handled) = CountingWorker::new();
    let dispatcher = Dispatcher::builder().worker("cfaWorker", worker).spawn().unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| dispatcher.submit("cfaWorker", WorkerRequest::ready()))
        .collect();
    let ids: Vec<u32> = join_all(handles)
        .await
        .into_iter()
        .map(|reply| unit_id(reply.unwrap()))
        .collect();

    assert_eq!(ids, (0..8).collect::<Vec<_>>());
    assert_eq!(handled.load(std::sync::atomic::Ordering::SeqCst), 8);
}

#[tokio::test]
async fn test_no_overlapping_deliveries() {
    let (cfa, _) = CountingWorker::new();
    let (arg, _) = CountingWorker::new();
    let dispatcher = Dispatcher::builder()
        .worker("cfaWorker", cfa)
        .worker("argWorker", arg)
        .spawn()
        .unwrap();

    let handles: Vec<_> = (0..20)
        .map(|i| {
            let worker = if i % 3 == 0 { "argWorker" } else { "cfaWorker" };
            dispatcher.submit(worker, WorkerRequest::ready())
        })
        .collect();

    // The worker fails any job delivered while another is in flight.
    for result in join_all(handles).await {
        assert!(result.is_ok(), "unexpected fault: {:?}", result);
    }
}

#[tokio::test]
async fn test_second_job_waits_for_busy_worker() {
    let (worker, gate) = CountingWorker::gated();
    let dispatcher = Dispatcher::builder()
        .drain_retry(Duration::from_millis(2))
        .worker("cfaWorker", worker)
        .spawn()
        .unwrap();

    let mut first = task::spawn(dispatcher.submit("cfaWorker", WorkerRequest::ready()));
    let mut second = task::spawn(dispatcher.submit("cfaWorker", WorkerRequest::ready()));

    let snapshot = wait_for(&dispatcher, |s| s.is_busy("cfaWorker") && s.queued == 1).await;
    assert!(!snapshot.is_quiescent());
    assert_pending!(first.poll());
    assert_pending!(second.poll());

    gate.send(()).unwrap();
    let first_reply = loop {
        if let Poll::Ready(reply) = first.poll() {
            break reply.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    };
    assert_eq!(unit_id(first_reply), 0);

    // The first reply freed the worker, which now holds the second job.
    wait_for(&dispatcher, |s| s.is_busy("cfaWorker") && s.queued == 0).await;
    assert_pending!(second.poll());

    gate.send(()).unwrap();
    let second_reply = loop {
        if let Poll::Ready(reply) = second.poll() {
            break reply.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    };
    assert_eq!(unit_id(second_reply), 1);

    wait_for(&dispatcher, |s| s.is_quiescent()).await;
}

#[tokio::test]
async fn test_busy_head_blocks_jobs_for_other_workers() {
    let (cfa, gate) = CountingWorker::gated();
    let (arg, _) = CountingWorker::new();
    let dispatcher = Dispatcher::builder()
        .drain_retry(Duration::from_millis(2))
        .worker("cfaWorker", cfa)
        .worker("argWorker", arg)
        .spawn()
        .unwrap();

    let first = dispatcher.submit("cfaWorker", WorkerRequest::ready());
    let second = dispatcher.submit("cfaWorker", WorkerRequest::ready());
    let mut other = task::spawn(dispatcher.submit("argWorker", WorkerRequest::ready()));

    wait_for(&dispatcher, |s| s.is_busy("cfaWorker") && s.queued == 2).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    // The idle argWorker still waits behind the cfaWorker job at the head.
    assert_pending!(other.poll());
    assert!(!dispatcher.snapshot().await.unwrap().is_busy("argWorker"));

    gate.send(()).unwrap();
    gate.send(()).unwrap();
    assert_eq!(unit_id(first.await.unwrap()), 0);
    assert_eq!(unit_id(second.await.unwrap()), 1);
    let other_reply = loop {
        if let Poll::Ready(reply) = other.poll() {
            break reply.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    };
    assert_eq!(unit_id(other_reply), 0);
}

#[tokio::test]
async fn test_queue_drains_after_burst() {
    let (cfa, _) = CountingWorker::new();
    let (arg, _) = CountingWorker::new();
    let dispatcher = Dispatcher::builder()
        .worker("cfaWorker", cfa)
        .worker("argWorker", arg)
        .spawn()
        .unwrap();

    let handles: Vec<_> = (0..50)
        .map(|i| {
            let worker = if i % 2 == 0 { "cfaWorker" } else { "argWorker" };
            dispatcher.submit(worker, WorkerRequest::ready())
        })
        .collect();
    join_all(handles).await;

    let snapshot = wait_for(&dispatcher, |s| s.is_quiescent()).await;
    assert_eq!(snapshot.queued, 0);
}

#[tokio::test]
async fn test_panicking_worker_faults_only_its_job() {
    let mut calls = 0;
    let dispatcher = Dispatcher::builder()
        .worker("cfaWorker", move |_req: WorkerRequest| {
            calls += 1;
            if calls == 1 {
                panic!("layout blew up");
            }
            Ok::<_, String>(WorkerReply::status("done"))
        })
        .spawn()
        .unwrap();

    let first = dispatcher.submit("cfaWorker", WorkerRequest::ready());
    let second = dispatcher.submit("cfaWorker", WorkerRequest::ready());

    match first.await {
        Err(Error::WorkerFault { worker, message }) => {
            assert_eq!(worker, "cfaWorker");
            assert!(message.contains("layout blew up"));
        }
        other => panic!("Expected WorkerFault, got {:?}", other),
    }
    assert_eq!(second.await.unwrap(), WorkerReply::status("done"));
}

#[tokio::test]
async fn test_drop_fails_queued_jobs() {
    let (worker, gate) = CountingWorker::gated();
    let dispatcher = Dispatcher::builder().worker("cfaWorker", worker).spawn().unwrap();

    let first = dispatcher.submit("cfaWorker", WorkerRequest::ready());
    let second = dispatcher.submit("cfaWorker", WorkerRequest::ready());
    wait_for(&dispatcher, |s| s.is_busy("cfaWorker")).await;

    drop(dispatcher);
    assert!(matches!(first.await, Err(Error::DispatcherClosed)));
    assert!(matches!(second.await, Err(Error::DispatcherClosed)));
    drop(gate);
}

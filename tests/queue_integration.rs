//! End-to-end scenarios exercising `Queue<T>` across blocking, async, and
//! cancellation paths, at both a buffered capacity and in rendezvous mode.

use std::thread;
use std::time::Duration;

use convoy::{AsyncRecvError, CancellationToken, Queue};
use tokio_test::assert_pending;

#[test]
fn smoketest_capacity_two() {
    let q: Queue<i32> = Queue::new(2);
    q.push(1).unwrap();
    q.push(2).unwrap();
    assert!(q.try_push(3).is_err());
    assert_eq!(q.pop().unwrap(), 1);
    assert_eq!(q.pop().unwrap(), 2);
}

#[test]
fn initially_closed_rejects_push_and_pop() {
    let q: Queue<i32> = Queue::new(2);
    q.close();
    assert!(q.push(1).is_err());
    assert!(q.pop().is_err());
}

#[test]
fn pull_from_closed_drains_then_reports_closed() {
    let q: Queue<i32> = Queue::new(4);
    q.push(1).unwrap();
    q.push(2).unwrap();
    q.close();

    assert_eq!(q.pop().unwrap(), 1);
    assert_eq!(q.pop().unwrap(), 2);
    assert!(q.pop().is_err());
}

#[test]
fn blocking_pull_unblocks_then_closed() {
    let q: Queue<i32> = Queue::new(1);
    let producer = q.clone();
    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(10));
        producer.push(42).unwrap();
        producer.close();
    });

    assert_eq!(q.pop().unwrap(), 42);
    assert!(q.pop().is_err());
    handle.join().unwrap();
}

#[tokio::test]
async fn async_push_then_pop_capacity_two() {
    let q: Queue<i32> = Queue::new(2);
    q.async_push(1).await.unwrap();
    q.async_push(2).await.unwrap();
    assert_eq!(q.async_pop().await.unwrap(), 1);
    assert_eq!(q.async_pop().await.unwrap(), 2);
    q.async_push(3).await.unwrap();
    q.async_push(4).await.unwrap();
    assert_eq!(q.async_pop().await.unwrap(), 3);
    assert_eq!(q.async_pop().await.unwrap(), 4);
}

#[tokio::test]
async fn async_push_pop_rendezvous_preserves_order() {
    let q: Queue<i32> = Queue::rendezvous();
    let producer = q.clone();
    let handle = tokio::spawn(async move {
        for i in 1..=4 {
            producer.async_push(i).await.unwrap();
        }
    });

    for expected in 1..=4 {
        assert_eq!(q.async_pop().await.unwrap(), expected);
    }
    handle.await.unwrap();
}

#[tokio::test]
async fn cancellation_of_async_pop_on_empty_rendezvous_queue() {
    let q: Queue<i32> = Queue::rendezvous();
    let token = CancellationToken::new();
    let cancel_handle = token.clone();

    let waiter = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel_handle.cancel();
    });

    let result = q.async_pop().with_cancellation(token).await;
    assert_eq!(result.unwrap_err(), AsyncRecvError::Cancelled);
    waiter.await.unwrap();

    // The queue is still perfectly usable afterward.
    q.push_cancellable(9, None).unwrap();
    assert_eq!(q.try_pop().unwrap(), 9);
}

#[tokio::test]
async fn cancellation_of_async_push_on_full_rendezvous_queue() {
    let q: Queue<i32> = Queue::rendezvous();
    let token = CancellationToken::new();
    let cancel_handle = token.clone();

    let waiter = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel_handle.cancel();
    });

    let err = q
        .async_push(5)
        .with_cancellation(token)
        .await
        .unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(err.into_inner(), 5);
    waiter.await.unwrap();

    assert!(q.is_empty());
    assert!(!q.is_closed());
}

#[test]
fn blocking_cancellation_on_full_queue_returns_the_value() {
    let q: Queue<i32> = Queue::new(1);
    q.push(1).unwrap(); // fill capacity so a second push must wait.

    let token = CancellationToken::new();
    let cancel_handle = token.clone();
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(10));
        cancel_handle.cancel();
    });

    let err = q.push_cancellable(2, Some(&token)).unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(err.into_inner(), 2);

    // Queue is unaffected: the buffered value is still there, capacity
    // still one, nothing leaked into the waiter list.
    assert_eq!(q.len(), 1);
    assert_eq!(q.pop().unwrap(), 1);
}

#[tokio::test]
async fn dropping_an_unresolved_async_pop_future_unlinks_it() {
    // A dropped future must not leave a dangling waiter behind: pushing
    // afterward should succeed on the fast path rather than matching a
    // stale, freed node.
    let q: Queue<i32> = Queue::rendezvous();
    {
        let mut fut = tokio_test::task::spawn(q.async_pop());
        // Poll once so it actually links as a pop-waiter, then drop it.
        assert_pending!(fut.poll());
    }

    q.push_cancellable(11, None).unwrap();
    assert_eq!(q.try_pop().unwrap(), 11);
}

//! End-to-end tests for the worker channel
//!
//! One side is a full `WorkerManager`; where the test needs to see or forge
//! raw envelopes the other side is a bare in-memory endpoint.

use std::time::Duration;

use futures::future::join_all;
use xxdk_core::{WireFormat, WorkerConfig};
use xxdk_protocol::{codec, Envelope, Kind, Tag, SINGLETON_ID};
use xxdk_worker::{memory_pair, Inbound, InboundReceiver, Reply, Transport, WorkerError, WorkerManager};

async fn next_envelope(rx: &mut InboundReceiver) -> Envelope {
    match rx.recv().await {
        Some(Inbound::Frame(frame)) => codec::decode(&frame).unwrap(),
        other => panic!("expected a frame, got {:?}", other),
    }
}

#[tokio::test]
async fn test_echo_singleton_at_id_zero() {
    let ((main_tx, mut main_rx), (worker_tx, worker_rx)) = memory_pair();
    let worker = WorkerManager::new("worker", worker_tx, worker_rx, WorkerConfig::local_test());
    worker.register_handler(Tag::new("Echo"), |data| async move { Reply::Ok(data) });

    let request = Envelope::request(Tag::new("Echo"), SINGLETON_ID, b"ping".to_vec());
    main_tx
        .send(codec::encode(&request, WireFormat::Json).unwrap())
        .unwrap();

    let reply = next_envelope(&mut main_rx).await;
    assert_eq!(reply, Envelope::reply(Tag::new("Echo"), 0, b"ping".to_vec()));
}

#[tokio::test]
async fn test_concurrent_calls_get_their_own_replies() {
    let ((main_tx, main_rx), (worker_tx, worker_rx)) = memory_pair();
    let config = WorkerConfig::local_test();
    let worker = WorkerManager::new("worker", worker_tx, worker_rx, config.clone());
    let main = WorkerManager::new("main", main_tx, main_rx, config);

    // Later requests finish first, so replies come back out of order.
    worker.register_handler(Tag::new("Square"), |data| async move {
        let n = data[0] as u64;
        tokio::time::sleep(Duration::from_millis(40 - n * 4)).await;
        Reply::Ok((n * n).to_le_bytes().to_vec())
    });

    let calls = (0u8..10).map(|n| {
        let main = main.clone();
        async move { (n, main.call(Tag::new("Square"), vec![n]).await) }
    });

    for (n, result) in join_all(calls).await {
        let n = n as u64;
        assert_eq!(result.unwrap(), (n * n).to_le_bytes().to_vec());
    }
    assert_eq!(main.pending_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_late_reply_after_timeout_is_dropped() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("xxdk_worker=debug")
        .with_test_writer()
        .try_init();

    let ((main_tx, main_rx), (worker_tx, mut worker_rx)) = memory_pair();
    let main = WorkerManager::new("main", main_tx, main_rx, WorkerConfig::local_test());
    let tag = Tag::new("Slow");

    let result = main
        .call_with_timeout(tag.clone(), vec![], Duration::from_millis(100))
        .await;
    assert!(matches!(result, Err(WorkerError::Timeout { .. })));
    assert!(!main.dispatcher().contains(&tag, 0));
    assert_eq!(main.stats().timeouts, 1);

    let request = next_envelope(&mut worker_rx).await;
    let late = Envelope::reply(request.tag, request.id, b"too late".to_vec());
    worker_tx
        .send(codec::encode(&late, WireFormat::Json).unwrap())
        .unwrap();

    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
    assert_eq!(main.stats().dropped_unhandled, 1);
    assert_eq!(main.pending_calls(), 0);
}

#[tokio::test]
async fn test_ready_then_call_in_cbor() {
    let ((main_tx, main_rx), (worker_tx, mut worker_rx)) = memory_pair();
    let config = WorkerConfig {
        wire_format: WireFormat::Cbor,
        ..WorkerConfig::local_test()
    };
    let main = WorkerManager::new("main", main_tx, main_rx, config);

    let ready = codec::encode(&Envelope::ready(), WireFormat::Cbor).unwrap();
    worker_tx.send(ready).unwrap();
    main.wait_ready().await.unwrap();

    let call = tokio::spawn({
        let main = main.clone();
        async move { main.call(Tag::GET_FILE, vec![]).await }
    });

    let request = match worker_rx.recv().await {
        Some(Inbound::Frame(frame)) => {
            assert!(matches!(frame, xxdk_protocol::Frame::Binary(_)));
            codec::decode(&frame).unwrap()
        }
        other => panic!("expected a frame, got {:?}", other),
    };
    assert_eq!(request.kind, Kind::Request);

    let reply = Envelope::reply(request.tag, request.id, b"log".to_vec());
    worker_tx
        .send(codec::encode(&reply, WireFormat::Cbor).unwrap())
        .unwrap();
    assert_eq!(call.await.unwrap().unwrap(), b"log");
}

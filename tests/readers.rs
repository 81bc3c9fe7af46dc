//! Stream, block and tail readers driven from other threads

mod common;

use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use daq_reader::types::ReadStatus;
use daq_reader::{BlockReaderBuilder, StreamReaderBuilder, TailReaderBuilder, ThreadExecutor};
use tokio_stream::StreamExt;

use common::{ms_domain, send_ticks, signal};

#[test]
fn stream_reader_follows_a_producer_thread() {
    let source = signal("ai0", 1);
    let mut reader = StreamReaderBuilder::<f64, i64>::new().signal(&source).build().unwrap();

    let producer = {
        let source = source.clone();
        thread::spawn(move || {
            for chunk in 0..20 {
                send_ticks(&source, chunk * 10, 10);
                thread::sleep(Duration::from_millis(1));
            }
        })
    };

    let mut received = Vec::new();
    let mut values = [0.0; 50];
    for _ in 0..4 {
        let status = reader.read(&mut values, 50, Duration::from_secs(10)).unwrap();
        assert_eq!(status.read_status, ReadStatus::Ok);
        assert_eq!(status.count, 50);
        received.extend_from_slice(&values);
    }
    producer.join().unwrap();

    let expected: Vec<f64> = (0..200).map(f64::from).collect();
    assert_eq!(received, expected);
    assert!(reader.is_empty());
}

#[test]
fn stream_reader_reports_descriptor_changes_in_order() {
    let source = signal("ai0", 1);
    let mut reader = StreamReaderBuilder::<f64, i64>::new().signal(&source).build().unwrap();
    send_ticks(&source, 0, 5);
    source.set_descriptors(source.value_descriptor(), Some(ms_domain(2))).unwrap();
    send_ticks(&source, 10, 5);

    let mut values = [0.0; 10];
    let mut ticks = [0i64; 10];
    let status = reader.read(&mut values, 10, Duration::ZERO).unwrap();
    assert_eq!((status.read_status, status.count), (ReadStatus::Event, 5));
    assert_eq!(&values[..5], &[0.0, 1.0, 2.0, 3.0, 4.0]);
    let event = status.event_packet.unwrap();
    assert!(event.is_descriptor_changed());

    let status = reader.read_with_domain(&mut values, &mut ticks, 5, Duration::ZERO).unwrap();
    assert_eq!(status.count, 5);
    assert_eq!(&ticks[..5], &[10, 12, 14, 16, 18]);
    assert_eq!(reader.domain_descriptor().unwrap().rule, ms_domain(2).rule);
}

#[tokio::test]
async fn block_reader_wakes_async_consumers() {
    let source = signal("ai0", 1);
    let mut reader = BlockReaderBuilder::<f64, i64>::new().signal(&source).block_size(4).build().unwrap();
    let mut notifications = reader.data_available_stream();

    let producer = {
        let source = source.clone();
        thread::spawn(move || send_ticks(&source, 0, 12))
    };

    let generation = tokio::time::timeout(Duration::from_secs(5), notifications.next()).await.unwrap();
    assert!(generation.is_some());
    producer.join().unwrap();

    let mut values = [0.0; 12];
    let status = reader.read(&mut values, 3, Duration::ZERO).unwrap();
    assert_eq!(status.count, 3);
    assert_eq!(&values[8..], &[8.0, 9.0, 10.0, 11.0]);
}

#[test]
fn tail_reader_callbacks_run_on_executor_threads() {
    let source = signal("ai0", 1);
    let mut reader = TailReaderBuilder::<f64, i64>::new()
        .signal(&source)
        .history_size(5)
        .executor(Arc::new(ThreadExecutor::named("notify")))
        .build()
        .unwrap();

    let (tx, rx) = mpsc::channel();
    reader.set_on_data_available(Some(Arc::new(move || {
        let _ = tx.send(thread::current().name().map(str::to_owned));
    })));

    for chunk in 0..4 {
        send_ticks(&source, chunk * 5, 5);
    }
    for _ in 0..4 {
        let name = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(name.as_deref(), Some("notify"));
    }

    let mut values = [0.0; 5];
    let status = reader.read(&mut values, 5).unwrap();
    assert_eq!(status.count, 5);
    assert_eq!(values, [15.0, 16.0, 17.0, 18.0, 19.0]);
}

mod common;

use common::{grid, scripted_driver};
use pressure_logger_lib::driver::{CycleOutcome, DriverState};
use pressure_logger_lib::matrix::Matrix;
use pressure_logger_lib::protocol::{dense, DecodeError, ProtocolKind, MAX_PRESSURE};

#[tokio::test]
async fn test_hand_built_2x2_frame_is_published() {
    let (mut driver, transport, sink) = scripted_driver(ProtocolKind::Dense, 2, 2);
    transport.push_reply(vec![
        b'H', b'?', b'?',
        b'M', 2, 0, 0xC0, 0x0F, 0x00, 0x10, b'\n',
        b'M', 2, 1, 0x00, 0x00, 0xD4, 0x0E, b'\n',
    ]);

    let outcome = driver.run_cycle().await.unwrap();
    assert_eq!(outcome, CycleOutcome::Published(1));
    assert_eq!(transport.written(), vec![b'S']);
    assert_eq!(driver.state(), DriverState::Idle);

    let published = driver.buffer().latest().expect("published sample");
    assert_eq!(published.matrix.to_rows(), vec![vec![64, MAX_PRESSURE], vec![0, 300]]);

    let samples = sink.samples();
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].seq, 1);
    assert_eq!(samples[0].timestamp_string().len(), "YYYY-MM-DD HH:MM:SS".len());
}

#[tokio::test]
async fn test_encoded_frame_round_trips_through_driver() {
    let source = grid(vec![
        vec![0, 10, 20, 30],
        vec![40, 50, 60, 70],
        vec![80, 90, 100, 110],
    ]);
    let (mut driver, transport, _sink) = scripted_driver(ProtocolKind::Dense, 3, 4);
    transport.push_reply(dense::encode_frame(&source));

    assert_eq!(driver.run_cycle().await.unwrap(), CycleOutcome::Published(1));
    assert_eq!(*driver.buffer().current_matrix(), source);
    assert_eq!(transport.unread(), 0);
}

#[tokio::test]
async fn test_truncated_frame_keeps_previous_matrix() {
    let first = grid(vec![vec![1, 2], vec![3, 4]]);
    let second = grid(vec![vec![9, 9], vec![9, 9]]);
    let (mut driver, transport, sink) = scripted_driver(ProtocolKind::Dense, 2, 2);

    transport.push_reply(dense::encode_frame(&first));
    assert_eq!(driver.run_cycle().await.unwrap(), CycleOutcome::Published(1));

    // Drop the final row terminator: the read times out mid-frame
    let mut truncated = dense::encode_frame(&second);
    truncated.pop();
    transport.push_reply(truncated);

    let outcome = driver.run_cycle().await.unwrap();
    assert_eq!(outcome, CycleOutcome::DecodeFailed(DecodeError::FrameTimeout("row terminator")));
    assert_eq!(*driver.buffer().current_matrix(), first);
    assert_eq!(driver.buffer().latest().unwrap().seq, 1);
    assert_eq!(sink.samples().len(), 1);
    assert_eq!(driver.metrics().decode_errors, 1);
}

#[tokio::test]
async fn test_missing_terminator_discards_cycle_and_next_request_proceeds() {
    let (mut driver, transport, sink) = scripted_driver(ProtocolKind::Dense, 1, 1);
    transport.push_reply(vec![b'H', 0, b'0', b'M', 1, 0, 0x00, 0x10, b'?']);
    transport.push_reply(dense::encode_frame(&grid(vec![vec![25]])));

    let outcome = driver.run_cycle().await.unwrap();
    assert!(matches!(
        outcome,
        CycleOutcome::DecodeFailed(DecodeError::RowTerminatorMissing { row: 0, found: b'?' })
    ));
    assert!(driver.buffer().latest().is_none());

    assert_eq!(driver.run_cycle().await.unwrap(), CycleOutcome::Published(1));
    assert_eq!(driver.buffer().current_matrix().get(0, 0), Some(25));
    assert_eq!(transport.written(), vec![b'S', b'S']);
    assert_eq!(sink.samples().len(), 1);
}

#[tokio::test]
async fn test_repeated_frame_gives_two_independent_samples() {
    let frame = dense::encode_frame(&grid(vec![vec![5, 6], vec![7, 8]]));
    let (mut driver, transport, sink) = scripted_driver(ProtocolKind::Dense, 2, 2);
    transport.push_reply(frame.clone());
    transport.push_reply(frame);

    assert_eq!(driver.run_cycle().await.unwrap(), CycleOutcome::Published(1));
    assert_eq!(driver.run_cycle().await.unwrap(), CycleOutcome::Published(2));

    let samples = sink.samples();
    assert_eq!(samples.len(), 2);
    assert_eq!(samples[0].matrix, samples[1].matrix);
    assert!(samples[1].timestamp >= samples[0].timestamp);
    assert_ne!(samples[0].seq, samples[1].seq);
}

#[tokio::test]
async fn test_values_are_clamped_to_max_pressure() {
    let (mut driver, transport, _sink) = scripted_driver(ProtocolKind::Dense, 1, 2);
    // raw 0 -> 4096, raw 0xFFFF -> negative
    transport.push_reply(vec![
        b'H', 0, b'0',
        b'M', 1, 0, 0x00, 0x00, b'\n',
        b'M', 1, 1, 0xFF, 0xFF, b'\n',
    ]);
    driver.run_cycle().await.unwrap();
    assert_eq!(*driver.buffer().current_matrix(), grid(vec![vec![MAX_PRESSURE, 0]]));
    assert_ne!(*driver.buffer().current_matrix(), Matrix::zeros(1, 2));
}

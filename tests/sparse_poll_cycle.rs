mod common;

use common::{grid, scripted_driver};
use pressure_logger_lib::driver::CycleOutcome;
use pressure_logger_lib::matrix::Matrix;
use pressure_logger_lib::protocol::{sparse, DecodeError, ProtocolKind};

#[tokio::test]
async fn test_two_points_on_4x4_grid() {
    let (mut driver, transport, sink) = scripted_driver(ProtocolKind::Sparse, 4, 4);
    transport.push_reply(sparse::encode_frame(&[(1, 1, 10), (3, 0, 500)]));

    assert_eq!(driver.run_cycle().await.unwrap(), CycleOutcome::Published(1));
    assert_eq!(transport.written(), vec![b'R']);

    let mut expected = Matrix::zeros(4, 4);
    expected.set(1, 1, 10);
    expected.set(0, 3, 500);
    assert_eq!(*driver.buffer().current_matrix(), expected);
    assert_eq!(sink.samples()[0].matrix.active_cells(), 2);
}

#[tokio::test]
async fn test_unreported_cells_revert_to_zero() {
    let (mut driver, transport, _sink) = scripted_driver(ProtocolKind::Sparse, 2, 2);
    transport.push_reply(sparse::encode_frame(&[(0, 0, 7), (1, 1, 8)]));
    transport.push_reply(sparse::encode_frame(&[(1, 0, 3)]));

    driver.run_cycle().await.unwrap();
    assert_eq!(*driver.buffer().current_matrix(), grid(vec![vec![7, 0], vec![0, 8]]));

    driver.run_cycle().await.unwrap();
    assert_eq!(*driver.buffer().current_matrix(), grid(vec![vec![0, 3], vec![0, 0]]));
}

#[tokio::test]
async fn test_out_of_bounds_point_rejected_without_mutation() {
    let (mut driver, transport, sink) = scripted_driver(ProtocolKind::Sparse, 4, 4);
    transport.push_reply(sparse::encode_frame(&[(2, 2, 42)]));
    transport.push_reply(sparse::encode_frame(&[(0, 0, 1), (0, 4, 9)]));

    driver.run_cycle().await.unwrap();
    let before = driver.buffer().current_matrix();

    let outcome = driver.run_cycle().await.unwrap();
    assert_eq!(
        outcome,
        CycleOutcome::DecodeFailed(DecodeError::OutOfBoundsCoordinate { x: 0, y: 4, rows: 4, cols: 4 })
    );
    assert_eq!(driver.buffer().current_matrix(), before);
    assert_eq!(driver.buffer().current_matrix().get(0, 0), Some(0));
    assert_eq!(sink.samples().len(), 1);
}

#[tokio::test]
async fn test_raw_magnitudes_are_not_clamped() {
    let (mut driver, transport, _sink) = scripted_driver(ProtocolKind::Sparse, 1, 1);
    transport.push_reply(sparse::encode_frame(&[(0, 0, 4000)]));
    driver.run_cycle().await.unwrap();
    assert_eq!(driver.buffer().current_matrix().get(0, 0), Some(4000));
}

#[tokio::test]
async fn test_dense_sentinel_is_ignored_by_sparse_driver() {
    let (mut driver, transport, sink) = scripted_driver(ProtocolKind::Sparse, 2, 2);
    transport.push_reply(vec![b'H']);

    assert_eq!(driver.run_cycle().await.unwrap(), CycleOutcome::SentinelMismatch(b'H'));
    assert!(sink.samples().is_empty());
    assert_eq!(driver.metrics().sentinel_mismatches, 1);
}

#[tokio::test]
async fn test_full_48x48_frame_from_active_points() {
    let mut source = Matrix::zeros(48, 48);
    source.set(0, 47, 1);
    source.set(47, 0, 65535);
    source.set(20, 30, 1234);
    let (mut driver, transport, _sink) = scripted_driver(ProtocolKind::Sparse, 48, 48);
    transport.push_reply(sparse::encode_frame(&sparse::active_points(&source)));

    driver.run_cycle().await.unwrap();
    assert_eq!(*driver.buffer().current_matrix(), source);
}

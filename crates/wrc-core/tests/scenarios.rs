//! End-to-end runs against the simulated device.

use wrc_core::pattern::word_at;
use wrc_core::sim::SimDevice;
use wrc_core::{run, ConfigError, Driver, Error, IoOp, Mode, Namespace, RunConfig, RunRequest};

const PATTERN: u64 = 0xAAAA_AAAA_AAAA_AAAA;

fn namespace(block_count: u64) -> Namespace {
    Namespace {
        device: "sim0".to_string(),
        block_size: 512,
        block_count,
        queue_count: 8,
        queue_size: 32,
        max_blocks_per_io: 64,
        blocks_per_page: 1,
    }
}

fn request(mode: Mode, pattern: u64, queues: u32, depth: u32, nbpio: u32) -> RunRequest {
    let mut req = RunRequest::new(mode, pattern);
    req.queue_count = queues;
    req.queue_depth = depth;
    req.blocks_per_io = Some(nbpio);
    req
}

fn validated(dev: &SimDevice, req: &RunRequest) -> RunConfig {
    req.validate(dev.namespace()).unwrap()
}

// ============================================================================
// Fixed pattern
// ============================================================================

#[test]
fn test_fixed_write_single_slot() {
    let mut dev = SimDevice::new(namespace(1000));
    let mut req = request(Mode::Write, PATTERN, 1, 1, 10);
    req.block_count = Some(1000);
    let cfg = validated(&dev, &req);
    let report = run(&mut dev, cfg, Vec::new()).unwrap();

    assert_eq!(report.progress.operations, 100);
    assert_eq!(report.progress.completed, 1000);
    assert_eq!(report.exit_code(), 0);
    assert!(dev.submissions().iter().all(|r| r.op == IoOp::Write && r.nlb == 10));
    for lba in [0, 499, 999] {
        let block = dev.block(lba).unwrap();
        assert!((0..64).all(|i| word_at(block, i) == PATTERN));
    }
    assert_eq!(dev.live_buffers(), 0);
}

#[test]
fn test_corrupt_block_detected_and_run_drains() {
    let mut dev = SimDevice::new(namespace(1000));
    let mut req = request(Mode::Write, PATTERN, 1, 1, 10);
    req.block_count = Some(1000);
    let cfg = validated(&dev, &req);
    run(&mut dev, cfg, Vec::new()).unwrap();

    dev.corrupt(500, 17, 0x01);
    dev.clear_log();

    req.mode = Mode::Read;
    let mut out = Vec::new();
    let cfg = validated(&dev, &req);
    let report = run(&mut dev, cfg, &mut out).unwrap();

    assert_eq!(report.mismatch_count(), 1);
    assert_eq!(report.exit_code(), 1);
    let m = &report.mismatches[0];
    assert_eq!(m.lba, 500);
    assert_eq!(m.expected, PATTERN);
    assert_eq!(
        m.to_string(),
        "data mismatch at LBA 0x1f4 exp 0xaaaaaaaaaaaaaaaa"
    );

    // Nothing is submitted past the chunk that held the bad block.
    assert_eq!(report.progress.operations, 51);
    assert_eq!(dev.submissions().last().unwrap().lba, 500);
    assert_eq!(report.progress.completed + report.progress.skipped, 1000);

    let text = String::from_utf8(out).unwrap();
    assert!(text.starts_with("===== LBA 0x1f4 =====\n"));
}

#[test]
fn test_mismatch_with_deep_queues_drains_in_flight_reads() {
    let mut dev = SimDevice::new(namespace(512)).with_poll_latency(3);
    let req = request(Mode::Write, PATTERN, 4, 4, 8);
    let cfg = validated(&dev, &req);
    run(&mut dev, cfg, Vec::new()).unwrap();

    dev.corrupt(3, 0, 0xFF);
    let mut req = req;
    req.mode = Mode::Read;
    let cfg = validated(&dev, &req);
    let report = run(&mut dev, cfg, Vec::new()).unwrap();

    assert_eq!(report.mismatch_count(), 1);
    assert_eq!(report.mismatches[0].lba, 3);
    assert!(report.progress.skipped > 0);
    assert_eq!(report.progress.submitted, report.progress.completed);
    assert_eq!(dev.live_buffers(), 0);
}

// ============================================================================
// Incrementing pattern
// ============================================================================

#[test]
fn test_incrementing_write_values_per_block() {
    let mut dev = SimDevice::new(namespace(64));
    let mut req = request(Mode::Write, 0x1000, 1, 1, 64);
    req.pattern_increment = 1;
    req.block_count = Some(3);
    let cfg = validated(&dev, &req);
    run(&mut dev, cfg, Vec::new()).unwrap();

    for (lba, value) in [(0, 0x1000), (1, 0x1001), (2, 0x1002)] {
        let block = dev.block(lba).unwrap();
        assert!((0..64).all(|i| word_at(block, i) == value), "lba {lba}");
    }
    assert!(dev.block(3).is_none());
}

#[test]
fn test_nonzero_start_lba_offsets_pattern() {
    let mut dev = SimDevice::new(namespace(256));
    let mut req = request(Mode::Write, 0x10, 2, 2, 16);
    req.pattern_increment = 0x10;
    req.start_lba = 100;
    req.block_count = Some(50);
    let cfg = validated(&dev, &req);
    let report = run(&mut dev, cfg, Vec::new()).unwrap();

    assert_eq!(report.progress.completed, 50);
    assert_eq!(word_at(dev.block(100).unwrap(), 0), 0x10);
    assert_eq!(word_at(dev.block(149).unwrap(), 63), 0x10 + 49 * 0x10);
    assert!(dev.block(99).is_none());
    assert!(dev.block(150).is_none());

    req.mode = Mode::Read;
    let cfg = validated(&dev, &req);
    let report = run(&mut dev, cfg, Vec::new()).unwrap();
    assert_eq!(report.exit_code(), 0);
}

#[test]
fn test_read_of_unwritten_region_reports_first_word() {
    let mut dev = SimDevice::new(namespace(64));
    let mut req = request(Mode::Read, 0x1000, 1, 2, 8);
    req.pattern_increment = 1;
    let cfg = validated(&dev, &req);
    let report = run(&mut dev, cfg, Vec::new()).unwrap();

    let m = &report.mismatches[0];
    assert_eq!(m.lba, 0);
    assert_eq!(m.offset, Some(0));
    assert_eq!(m.expected, 0x1000);
    assert_eq!(m.observed, Some(0));
    assert_eq!(
        m.to_string(),
        "data mismatch at LBA 0x0 offset 0x0 exp 0x0000000000001000 obs 0x0000000000000000"
    );
}

#[test]
fn test_out_of_order_completions_verify_clean() {
    let mut dev = SimDevice::new(namespace(2000)).with_stagger();
    let mut req = request(Mode::Write, 0xC0FFEE, 4, 4, 8);
    req.pattern_increment = 3;
    let cfg = validated(&dev, &req);
    run(&mut dev, cfg, Vec::new()).unwrap();

    let submitted: Vec<u64> = dev.submissions().iter().map(|r| r.lba).collect();
    assert_ne!(dev.completions(), submitted.as_slice());

    dev.clear_log();
    req.mode = Mode::Read;
    let cfg = validated(&dev, &req);
    let report = run(&mut dev, cfg, Vec::new()).unwrap();
    assert_eq!(report.exit_code(), 0);
    assert_eq!(report.progress.completed, 2000);
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn test_out_of_range_rejected_before_io() {
    let dev = SimDevice::new(namespace(1000));
    let mut req = request(Mode::Write, PATTERN, 1, 1, 10);
    req.start_lba = 900;
    req.block_count = Some(200);

    let err = req.validate(dev.namespace()).unwrap_err();
    assert_eq!(
        err,
        ConfigError::OutOfRange {
            start_lba: 900,
            block_count: 200,
            max: 1000,
        }
    );
    assert!(dev.submissions().is_empty());
}

#[test]
fn test_hard_error_stops_submission() {
    let mut dev = SimDevice::new(namespace(1000)).fail_at(35, 4);
    let mut req = request(Mode::Write, PATTERN, 1, 1, 10);
    req.block_count = Some(1000);

    let cfg = validated(&dev, &req);
    let err = run(&mut dev, cfg, Vec::new()).unwrap_err();
    assert!(matches!(
        err,
        Error::Io {
            status: 4,
            lba: 30,
            nlb: 10
        }
    ));
    assert_eq!(dev.submissions().len(), 4);
    assert_eq!(dev.live_buffers(), 0);
}

#[test]
fn test_stall_times_out() {
    let mut dev = SimDevice::new(namespace(256)).stall_at(40);
    let mut req = request(Mode::Write, PATTERN, 2, 2, 8);
    req.timeout = std::time::Duration::from_millis(20);

    let cfg = validated(&dev, &req);
    let err = run(&mut dev, cfg, Vec::new()).unwrap_err();
    assert!(matches!(err, Error::Timeout { lba: 40, nlb: 8 }));
    assert!(err.to_string().contains("0x28"));
}

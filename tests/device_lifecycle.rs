//! device_lifecycle.rs
//! End-to-end tests over a running device: ordered delivery, multi-producer
//! interleaving, staleness under a slow gateway, and shutdown behavior.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use midi_dispatch::{
    ChannelGateway, Device, DispatchConfig, DispatchMonitor, GatewayError, NullGateway,
    TransmissionBatch, TransmitGateway,
};
use rand::Rng;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Short wait interval and a staleness threshold loose enough that delivery
/// tests never drop on a slow CI scheduler.
fn relaxed_config() -> DispatchConfig {
    DispatchConfig {
        wait_timeout: Duration::from_millis(50),
        staleness_threshold: Duration::from_secs(1),
        ..DispatchConfig::default()
    }
}

fn poll_until<F: Fn() -> bool>(condition: F, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        spin_sleep::sleep(Duration::from_micros(200));
    }
    condition()
}

#[test]
fn classic_control_change_reaches_the_gateway() {
    init_logging();
    let (gateway, rx) = ChannelGateway::new(8);
    let mut device = Device::start(Box::new(gateway), relaxed_config()).unwrap();

    device.enqueue(5, 127);

    let payload = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(payload, vec![0xB0, 5, 127]);
    assert!(poll_until(
        || device.monitor().snapshot().transmitted == 1,
        Duration::from_secs(1)
    ));
    assert_eq!(device.monitor().control_counts(5), (1, 0));
    device.shutdown();
}

#[test]
fn burst_is_delivered_in_enqueue_order() {
    init_logging();
    let (gateway, rx) = ChannelGateway::new(64);
    let mut device = Device::start(Box::new(gateway), relaxed_config()).unwrap();

    for value in 0..32u8 {
        device.enqueue(7, value);
    }

    for value in 0..32u8 {
        let payload = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(payload, vec![0xB0, 7, value]);
    }
    device.shutdown();
}

#[test]
fn two_producers_keep_their_own_suborder() {
    init_logging();
    let (gateway, rx) = ChannelGateway::new(512);
    let mut device = Device::start(Box::new(gateway), relaxed_config()).unwrap();

    let spawn_producer = |producer: midi_dispatch::Producer, control_index: u8| {
        thread::spawn(move || {
            let mut rng = rand::rng();
            for value in 0..100u8 {
                producer.enqueue(control_index, value);
                // Jitter the interleaving between the two producers.
                spin_sleep::sleep(Duration::from_micros(rng.random_range(0..80)));
            }
        })
    };

    let a = spawn_producer(device.producer(), 10);
    let b = spawn_producer(device.producer(), 11);
    a.join().unwrap();
    b.join().unwrap();

    let mut seen_a = Vec::new();
    let mut seen_b = Vec::new();
    for _ in 0..200 {
        let payload = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(payload[0], 0xB0);
        match payload[1] {
            10 => seen_a.push(payload[2]),
            11 => seen_b.push(payload[2]),
            other => panic!("unexpected control index {other}"),
        }
    }

    // Global order may interleave, but each producer's values stay in order.
    assert_eq!(seen_a, (0..100).collect::<Vec<u8>>());
    assert_eq!(seen_b, (0..100).collect::<Vec<u8>>());
    device.shutdown();
}

/// Gateway that holds each transmission for a fixed delay before forwarding,
/// so messages queued behind it age past the staleness threshold.
struct SlowGateway {
    inner: ChannelGateway,
    delay: Duration,
}

impl TransmitGateway for SlowGateway {
    fn open(&mut self) -> Result<(), GatewayError> {
        self.inner.open()
    }

    fn transmit(&mut self, batch: &TransmissionBatch) -> Result<(), GatewayError> {
        spin_sleep::sleep(self.delay);
        self.inner.transmit(batch)
    }

    fn close(&mut self) {
        self.inner.close();
    }
}

#[test]
fn messages_aged_behind_a_slow_transmission_are_dropped() {
    init_logging();
    let (inner, rx) = ChannelGateway::new(8);
    let gateway = SlowGateway {
        inner,
        delay: Duration::from_millis(20),
    };
    // Default 2ms staleness threshold.
    let config = DispatchConfig {
        wait_timeout: Duration::from_millis(50),
        ..DispatchConfig::default()
    };
    let mut device = Device::start(Box::new(gateway), config).unwrap();

    device.enqueue(1, 1);
    // Once the queue is empty the worker is inside the 20ms transmission;
    // everything queued now waits at least that long.
    assert!(poll_until(|| device.pending() == 0, Duration::from_secs(1)));
    device.enqueue(2, 2);
    device.enqueue(3, 3);
    device.enqueue(4, 4);

    assert_eq!(
        rx.recv_timeout(Duration::from_secs(2)).unwrap(),
        vec![0xB0, 1, 1]
    );
    assert!(poll_until(
        || device.monitor().snapshot().stale_drops == 3,
        Duration::from_secs(2)
    ));
    assert!(rx.try_recv().is_err());

    let drops = device.monitor().take_late_drops();
    assert_eq!(drops.len(), 3);
    assert!(drops.iter().all(|d| d.age >= Duration::from_millis(2)));
    device.shutdown();
}

#[test]
fn shutdown_with_an_idle_queue_completes_within_one_wait_interval() {
    init_logging();
    let config = DispatchConfig {
        wait_timeout: Duration::from_millis(200),
        ..DispatchConfig::default()
    };
    let mut device = Device::start(Box::new(NullGateway::new()), config).unwrap();

    // Let the worker settle into its timed wait.
    thread::sleep(Duration::from_millis(300));

    let started = Instant::now();
    device.shutdown();
    // One 200ms interval plus scheduling slack.
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[test]
fn producer_outliving_the_device_is_rejected() {
    init_logging();
    let device = Device::start(Box::new(NullGateway::new()), relaxed_config()).unwrap();
    let producer = device.producer();
    let monitor: Arc<DispatchMonitor> = device.monitor_handle();

    drop(device);
    producer.enqueue(9, 9);

    let snap = monitor.snapshot();
    assert_eq!(snap.rejected, 1);
    assert_eq!(snap.enqueued, 0);
}

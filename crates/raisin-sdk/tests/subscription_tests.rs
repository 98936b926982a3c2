//! 订阅缓存：最新值语义与回调隔离
//!
//! - `get_latest` 总是最近收到的一帧，与回调快慢无关
//! - 某个话题的回调阻塞不影响其他话题的分发
//! - 单帧解码失败只丢弃该帧，缓存保留上一帧

mod common;

use common::{Harness, wait_until};
use crossbeam_channel::bounded;
use raisin_client::testing::FakeRobot;
use raisin_protocol::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

fn odometry(x: f64) -> Odometry {
    Odometry {
        frame_id: "odom".to_string(),
        x,
        ..Default::default()
    }
}

#[test]
fn test_latest_is_last_frame_regardless_of_callback_latency() {
    const N: usize = 50;
    let harness = Harness::new();
    let robot = harness.spawn_robot(FakeRobot::default_node());
    let connection = harness
        .network
        .connect("robot_a", Duration::from_secs(5), None)
        .unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    connection
        .subscribe(ODOMETRY_TOPIC, move |_: &Odometry| {
            counter.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(20));
        })
        .unwrap();
    wait_until("odometry subscription", || robot.is_subscribed(ODOMETRY_TOPIC));

    for i in 1..=N {
        assert!(robot.publish(ODOMETRY_TOPIC, &odometry(i as f64)));
    }

    wait_until("last frame cached", || {
        connection
            .latest_sample(ODOMETRY_TOPIC)
            .is_some_and(|sample| sample.sequence == N as u64)
    });
    let latest = connection
        .get_latest::<Odometry>(ODOMETRY_TOPIC)
        .unwrap()
        .unwrap();
    assert_eq!(latest.x, N as f64);

    // 慢回调跳过了中间帧（单槽邮箱，后写覆盖）
    std::thread::sleep(Duration::from_millis(100));
    let delivered = calls.load(Ordering::SeqCst);
    assert!(delivered >= 1 && delivered < N, "delivered {}", delivered);
    assert!(harness.network.metrics().dispatch_overwrites > 0);
}

#[test]
fn test_blocked_callback_does_not_stall_other_topics() {
    let harness = Harness::new();
    let robot = harness.spawn_robot(FakeRobot::default_node());
    let connection = harness
        .network
        .connect("robot_a", Duration::from_secs(5), None)
        .unwrap();

    let (release_tx, release_rx) = bounded::<()>(1);
    let point_cloud_entered = Arc::new(AtomicUsize::new(0));
    {
        let entered = point_cloud_entered.clone();
        connection
            .subscribe(POINT_CLOUD_TOPIC, move |_: &PointCloud| {
                entered.fetch_add(1, Ordering::SeqCst);
                let _ = release_rx.recv_timeout(Duration::from_secs(5));
            })
            .unwrap();
    }
    let odometry_seen = Arc::new(AtomicUsize::new(0));
    {
        let seen = odometry_seen.clone();
        connection
            .subscribe(ODOMETRY_TOPIC, move |_: &Odometry| {
                seen.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
    }
    wait_until("both subscriptions", || {
        robot.is_subscribed(POINT_CLOUD_TOPIC) && robot.is_subscribed(ODOMETRY_TOPIC)
    });

    let cloud = PointCloud {
        frame_id: "lidar".to_string(),
        points: vec![Point3 { x: 1.0, y: 2.0, z: 0.5 }],
    };
    assert!(robot.publish(POINT_CLOUD_TOPIC, &cloud));
    wait_until("point cloud callback blocked", || {
        point_cloud_entered.load(Ordering::SeqCst) == 1
    });

    for i in 0..10 {
        assert!(robot.publish(ODOMETRY_TOPIC, &odometry(i as f64)));
        let expected = i + 1;
        wait_until("odometry callback", || odometry_seen.load(Ordering::SeqCst) >= expected);
    }

    release_tx.send(()).unwrap();
    assert_eq!(
        connection
            .get_latest::<PointCloud>(POINT_CLOUD_TOPIC)
            .unwrap()
            .unwrap()
            .len(),
        1
    );
}

#[test]
fn test_decode_error_keeps_previous_value() {
    let harness = Harness::new();
    let robot = harness.spawn_robot(FakeRobot::default_node());
    let connection = harness
        .network
        .connect("robot_a", Duration::from_secs(5), None)
        .unwrap();
    connection.track::<Odometry>(ODOMETRY_TOPIC).unwrap();
    wait_until("odometry subscription", || robot.is_subscribed(ODOMETRY_TOPIC));

    assert!(robot.publish(ODOMETRY_TOPIC, &odometry(3.0)));
    wait_until("first frame", || {
        connection
            .get_latest::<Odometry>(ODOMETRY_TOPIC)
            .unwrap()
            .is_some()
    });

    assert!(robot.publish(ODOMETRY_TOPIC, &"not odometry"));
    wait_until("decode error counted", || harness.network.metrics().decode_errors == 1);

    let latest = connection
        .get_latest::<Odometry>(ODOMETRY_TOPIC)
        .unwrap()
        .unwrap();
    assert_eq!(latest.x, 3.0);
    assert!(connection.is_connected());
}

#[test]
fn test_callback_panic_is_contained() {
    let harness = Harness::new();
    let robot = harness.spawn_robot(FakeRobot::default_node());
    let connection = harness
        .network
        .connect("robot_a", Duration::from_secs(5), None)
        .unwrap();

    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();
    connection
        .subscribe(ODOMETRY_TOPIC, move |odom: &Odometry| {
            counter.fetch_add(1, Ordering::SeqCst);
            if odom.x < 0.0 {
                panic!("bad odometry");
            }
        })
        .unwrap();
    wait_until("odometry subscription", || robot.is_subscribed(ODOMETRY_TOPIC));

    assert!(robot.publish(ODOMETRY_TOPIC, &odometry(-1.0)));
    wait_until("panicking callback ran", || seen.load(Ordering::SeqCst) == 1);
    assert!(robot.publish(ODOMETRY_TOPIC, &odometry(1.0)));
    wait_until("worker survived", || seen.load(Ordering::SeqCst) == 2);
}

#[test]
fn test_unsubscribe_keeps_last_value() {
    let harness = Harness::new();
    let robot = harness.spawn_robot(FakeRobot::default_node());
    let connection = harness
        .network
        .connect("robot_a", Duration::from_secs(5), None)
        .unwrap();

    connection
        .subscribe(ODOMETRY_TOPIC, |_: &Odometry| {})
        .unwrap();
    wait_until("odometry subscription", || robot.is_subscribed(ODOMETRY_TOPIC));
    assert!(robot.publish(ODOMETRY_TOPIC, &odometry(7.0)));
    wait_until("frame cached", || {
        connection.latest_sample(ODOMETRY_TOPIC).is_some()
    });

    connection.unsubscribe(ODOMETRY_TOPIC).unwrap();
    wait_until("robot stops publishing", || !robot.is_subscribed(ODOMETRY_TOPIC));
    assert!(!robot.publish(ODOMETRY_TOPIC, &odometry(8.0)));

    let latest = connection
        .get_latest::<Odometry>(ODOMETRY_TOPIC)
        .unwrap()
        .unwrap();
    assert_eq!(latest.x, 7.0);

    connection.disconnect();
    assert!(connection.latest_sample(ODOMETRY_TOPIC).is_none());
}

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use nodecore::sweeper::SessionSweeper;

mod common;

#[tokio::test]
async fn sweeper_clears_expired_sessions_in_background() {
    let (_tmp, manager) = common::ready_manager();
    let (clock, auth) = common::authenticator(manager, 3);
    let auth = Arc::new(auth);

    auth.login("admin", "123456").unwrap();
    auth.login("admin", "123456").unwrap();
    clock.advance(Duration::seconds(1801));
    let live = auth.login("admin", "123456").unwrap();
    // The expired pair was purged to make room; add one more and let it lapse.
    let stale = auth.login("admin", "123456").unwrap();
    clock.advance(Duration::seconds(900));
    assert!(auth.validate(&live));
    clock.advance(Duration::seconds(901));

    let sweeper = SessionSweeper::spawn(auth.clone(), StdDuration::from_millis(10));
    let mut waited = 0;
    while auth.active_sessions().unwrap() > 1 && waited < 200 {
        tokio::time::sleep(StdDuration::from_millis(10)).await;
        waited += 1;
    }
    let cleared = sweeper.shutdown().await;

    assert_eq!(cleared, 1);
    assert_eq!(auth.active_sessions().unwrap(), 1);
    assert!(auth.validate(&live));
    assert!(!auth.validate(&stale));
}

#[tokio::test]
async fn shutdown_without_work_returns_zero() {
    let (_tmp, manager) = common::ready_manager();
    let (_clock, auth) = common::authenticator(manager, 2);
    let sweeper = SessionSweeper::spawn(Arc::new(auth), StdDuration::from_secs(3600));
    assert_eq!(sweeper.shutdown().await, 0);
}

//! Scoped bridge lifecycle: teardown on every exit path.

mod common;

use common::{MockHost, bridge, text};
use futures::FutureExt;
use runtime::BridgeManager;

#[tokio::test]
async fn run_initializes_and_closes() {
    let (bridge, host, _backend, _hub) = bridge(MockHost::new(&["echo"]), vec![text("done")]);
    let manager = BridgeManager::new(bridge);

    let answer = manager
        .run(|bridge| {
            async move {
                assert!(bridge.is_initialized());
                bridge.process_message("hi", false).await
            }
            .boxed()
        })
        .await;

    assert_eq!(answer, "done");
    assert_eq!(host.closes(), 1);
}

#[tokio::test]
async fn failed_initialization_still_closes() {
    let (bridge, host, _backend, _hub) = bridge(MockHost::new(&[]).failing_connect(), vec![]);
    let manager = BridgeManager::new(bridge);

    let initialized = manager.run(|bridge| async move { bridge.is_initialized() }.boxed()).await;

    assert!(!initialized);
    assert_eq!(host.closes(), 1);
}

#[tokio::test]
async fn cancellation_short_circuits_and_closes() {
    let (bridge, host, _backend, _hub) = bridge(MockHost::new(&[]), vec![]);
    let manager = BridgeManager::new(bridge);

    let outcome = manager
        .run_until(
            |_bridge| futures::future::pending::<()>().boxed(),
            async {},
        )
        .await;

    assert!(outcome.is_none());
    assert_eq!(host.closes(), 1);
}

#[tokio::test]
async fn completed_work_wins_over_pending_cancel() {
    let (bridge, host, _backend, _hub) = bridge(MockHost::new(&[]), vec![text("fast")]);
    let manager = BridgeManager::new(bridge);

    let outcome = manager
        .run_until(
            |bridge| async move { bridge.process_message("hi", false).await }.boxed(),
            futures::future::pending(),
        )
        .await;

    assert_eq!(outcome.as_deref(), Some("fast"));
    assert_eq!(host.closes(), 1);
}

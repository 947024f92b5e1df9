use std::sync::Arc;
use std::time::Duration;

use common::{OutboxStatus, PollConfig};
use tokio_util::sync::CancellationToken;

use outbox::{Dispatcher, MessageSender, MessageStore, SeaOrmMessageStore};

use crate::common::{RecordingSender, new_messages, poll_config, test_db};

fn dispatcher(
    id: &str,
    store: &Arc<SeaOrmMessageStore>,
    sender: &Arc<RecordingSender>,
    config: PollConfig,
) -> Dispatcher {
    Dispatcher::new(
        id,
        Arc::clone(store) as Arc<dyn MessageStore>,
        Arc::clone(sender) as Arc<dyn MessageSender>,
        config,
    )
    .unwrap()
}

#[tokio::test]
async fn test_tick_delivers_pending_messages() {
    let store = Arc::new(SeaOrmMessageStore::new(test_db().await));
    store.create(new_messages(3)).await.unwrap();
    let sender = Arc::new(RecordingSender::default());

    let report = dispatcher("d-1", &store, &sender, poll_config())
        .tick()
        .await
        .unwrap();

    assert_eq!(report.claimed, 3);
    assert_eq!(report.sent, 3);
    assert_eq!(sender.attempts(), vec![1, 2, 3]);
    assert_eq!(store.count_by_status(OutboxStatus::Sent).await.unwrap(), 3);
}

#[tokio::test]
async fn test_failing_broker_ends_in_dead_letter() {
    let store = Arc::new(SeaOrmMessageStore::new(test_db().await));
    store.create(new_messages(1)).await.unwrap();
    let sender = Arc::new(RecordingSender::failing());
    let dispatcher = dispatcher(
        "d-1",
        &store,
        &sender,
        PollConfig {
            stale_window_secs: 1,
            send_timeout_ms: 100,
            batch_deadline_ms: 500,
            ..poll_config()
        },
    );

    for _ in 0..4 {
        dispatcher.tick().await.unwrap();
        tokio::time::sleep(Duration::from_millis(1100)).await;
    }

    let row = store.find_by_id(1).await.unwrap().unwrap();
    assert_eq!(row.status, OutboxStatus::DeadLettered);
    assert_eq!(row.retry_count, 4);

    let report = dispatcher.tick().await.unwrap();
    assert_eq!(report.claimed, 0);
    assert_eq!(sender.attempts().len(), 4);

    let stats = dispatcher.stats();
    assert_eq!(stats.failed, 4);
    assert_eq!(stats.dead_lettered, 1);
}

#[tokio::test]
async fn test_spawned_dispatchers_deliver_each_message_once() {
    let store = Arc::new(SeaOrmMessageStore::new(test_db().await));
    store.create(new_messages(150)).await.unwrap();
    let sender = Arc::new(RecordingSender::default());
    let shutdown = CancellationToken::new();

    let first = dispatcher("d-1", &store, &sender, poll_config()).spawn(&shutdown);
    let second = dispatcher("d-2", &store, &sender, poll_config()).spawn(&shutdown);

    tokio::time::timeout(Duration::from_secs(10), async {
        while store.count_by_status(OutboxStatus::Sent).await.unwrap() < 150 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("messages were not delivered in time");

    shutdown.cancel();
    let total = first.join().await.merge(second.join().await);

    assert_eq!(total.sent, 150);
    assert_eq!(total.claimed, 150);
    assert_eq!(sender.attempts().len(), 150);
    assert_eq!(sender.unique_attempts().len(), 150);
}

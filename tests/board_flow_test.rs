//! End-to-end exercise of the full create -> move -> conflict -> replay flow
//! against the in-process backends, driven entirely through `EventRouter`
//! and `Broadcaster` (no real network socket needed to exercise the logic).

use std::sync::Arc;
use std::time::Duration;

use board_coordinator::audit::{AuditSink, InMemoryAuditSink};
use board_coordinator::broadcast::Broadcaster;
use board_coordinator::cache::AuthoritativeCache;
use board_coordinator::events::{
    ClientEvent, PresenceUpdatePayload, ServerEvent, TaskCreatePayload, TaskMovePayload,
    TaskUpdatePayload,
};
use board_coordinator::flush::{FlushQueue, FLUSH_DELAY};
use board_coordinator::lock::LockManager;
use board_coordinator::model::{ColumnId, PresenceStatus, QueuedOp};
use board_coordinator::presence::PresenceRegistry;
use board_coordinator::router::EventRouter;
use board_coordinator::service::{Actor, TaskService};
use board_coordinator::storage::{DurableStore, InMemoryStore, SharedStore};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

struct Harness {
    router: EventRouter,
    store: SharedStore,
    broadcaster: Arc<Broadcaster>,
}

fn wire() -> (Harness, UnboundedReceiver<ServerEvent>, String) {
    let store: SharedStore = Arc::new(InMemoryStore::new());
    let cache = Arc::new(AuthoritativeCache::new(store.clone()));
    let flush = FlushQueue::new(cache.clone(), store.clone());
    let service = Arc::new(TaskService::new(cache, flush));
    let locks = Arc::new(LockManager::new());
    let presence = Arc::new(PresenceRegistry::new());
    let audit: Arc<dyn AuditSink> = Arc::new(InMemoryAuditSink::new());
    let broadcaster = Arc::new(Broadcaster::new());

    let router = EventRouter::new(service, locks, presence, audit, broadcaster.clone());

    let conn_id = "conn-1".to_string();
    let (tx, rx) = unbounded_channel();
    broadcaster.register(conn_id.clone(), tx);

    (
        Harness {
            router,
            store,
            broadcaster,
        },
        rx,
        conn_id,
    )
}

fn actor(name: &str) -> Actor {
    Actor {
        name: name.to_string(),
        color: "#123456".to_string(),
    }
}

#[tokio::test]
async fn empty_board_create_appends_at_half_and_broadcasts() {
    let (h, mut rx, conn) = wire();

    h.router
        .handle(
            &conn,
            actor("alice"),
            ClientEvent::TaskCreate(TaskCreatePayload {
                id: "t1".to_string(),
                column_id: ColumnId::Todo,
                title: "A".to_string(),
                description: String::new(),
                creator_name: None,
                creator_color: None,
            }),
        )
        .await;

    match rx.try_recv().unwrap() {
        ServerEvent::TaskCreated(task) => {
            assert_eq!(task.id, "t1");
            assert_eq!(task.column_id, ColumnId::Todo);
            assert_eq!(task.order, 0.5);
            assert_eq!(task.version, 1);
        }
        other => panic!("expected TaskCreated, got {other:?}"),
    }
}

#[tokio::test]
async fn two_connections_see_each_others_creates() {
    let (h, mut rx_a, conn_a) = wire();
    let conn_b = "conn-2".to_string();
    let (tx_b, mut rx_b) = unbounded_channel();
    h.broadcaster.register(conn_b.clone(), tx_b);

    h.router
        .handle(
            &conn_a,
            actor("alice"),
            ClientEvent::TaskCreate(TaskCreatePayload {
                id: "t1".to_string(),
                column_id: ColumnId::Todo,
                title: "A".to_string(),
                description: String::new(),
                creator_name: None,
                creator_color: None,
            }),
        )
        .await;

    match rx_a.try_recv().unwrap() {
        ServerEvent::TaskCreated(task) => assert_eq!(task.id, "t1"),
        other => panic!("expected TaskCreated on conn_a, got {other:?}"),
    }
    match rx_b.try_recv().unwrap() {
        ServerEvent::TaskCreated(task) => assert_eq!(task.id, "t1"),
        other => panic!("expected TaskCreated on conn_b, got {other:?}"),
    }
}

#[tokio::test]
async fn move_then_concurrent_edit_converge_without_conflict_notify() {
    let (h, mut rx, conn) = wire();

    h.router
        .handle(
            &conn,
            actor("alice"),
            ClientEvent::TaskCreate(TaskCreatePayload {
                id: "t1".to_string(),
                column_id: ColumnId::Todo,
                title: "Ship it".to_string(),
                description: String::new(),
                creator_name: None,
                creator_color: None,
            }),
        )
        .await;
    let created_version = match rx.try_recv().unwrap() {
        ServerEvent::TaskCreated(task) => task.version,
        other => panic!("expected TaskCreated, got {other:?}"),
    };

    h.router
        .handle(
            &conn,
            actor("alice"),
            ClientEvent::TaskMove(TaskMovePayload {
                id: "t1".to_string(),
                column_id: ColumnId::Done,
                order: 1.0,
                version: created_version,
            }),
        )
        .await;
    assert!(matches!(rx.try_recv().unwrap(), ServerEvent::TaskMoved(_)));

    h.router
        .handle(
            &conn,
            actor("bob"),
            ClientEvent::TaskUpdate(TaskUpdatePayload {
                id: "t1".to_string(),
                title: Some("Shipped".to_string()),
                description: None,
                version: created_version, // stale on purpose: tolerated, not rejected
            }),
        )
        .await;

    match rx.try_recv().unwrap() {
        ServerEvent::TaskUpdated(task) => {
            assert_eq!(task.column_id, ColumnId::Done);
            assert_eq!(task.title, "Shipped");
            assert_eq!(task.version, created_version + 2);
        }
        other => panic!("expected TaskUpdated with both effects, got {other:?}"),
    }
    assert!(rx.try_recv().is_err(), "no CONFLICT_NOTIFY should have been emitted");
}

#[tokio::test]
async fn insert_causing_exhaustion_triggers_rebalance_to_durable_store() {
    let (h, mut rx, conn) = wire();

    h.router
        .handle(
            &conn,
            actor("alice"),
            ClientEvent::TaskCreate(TaskCreatePayload {
                id: "a".to_string(),
                column_id: ColumnId::Todo,
                title: "A".to_string(),
                description: String::new(),
                creator_name: None,
                creator_color: None,
            }),
        )
        .await;
    let _ = rx.try_recv();

    h.router
        .handle(
            &conn,
            actor("alice"),
            ClientEvent::TaskCreate(TaskCreatePayload {
                id: "b".to_string(),
                column_id: ColumnId::Todo,
                title: "B".to_string(),
                description: String::new(),
                creator_name: None,
                creator_color: None,
            }),
        )
        .await;
    let _ = rx.try_recv();

    // Force b right next to a with a sub-exhaustion gap, then move it in
    // place so the post-move neighbor check fires the rebalance.
    h.router
        .handle(
            &conn,
            actor("alice"),
            ClientEvent::TaskMove(TaskMovePayload {
                id: "b".to_string(),
                column_id: ColumnId::Todo,
                order: 0.5 + 1e-10,
                version: 1,
            }),
        )
        .await;
    let _ = rx.try_recv();

    tokio::time::sleep(FLUSH_DELAY + Duration::from_millis(200)).await;

    let mut stored = h.store.list_all().await.unwrap();
    stored.sort_by(|x, y| x.order.partial_cmp(&y.order).unwrap());
    let orders: Vec<f64> = stored.iter().map(|t| t.order).collect();
    assert_eq!(orders, vec![1000.0, 2000.0]);
}

#[tokio::test]
async fn replay_ops_applies_in_timestamp_order_and_drops_presence() {
    let (h, mut rx, conn) = wire();

    let ops = vec![
        QueuedOp {
            op_type: "TASK_UPDATE".to_string(),
            payload: serde_json::json!({ "id": "t1", "title": "Second edit", "version": 1 }),
            client_timestamp: 200,
        },
        QueuedOp {
            op_type: "PRESENCE_UPDATE".to_string(),
            payload: serde_json::json!({ "status": "editing" }),
            client_timestamp: 150,
        },
        QueuedOp {
            op_type: "TASK_CREATE".to_string(),
            payload: serde_json::json!({
                "id": "t1",
                "columnId": "todo",
                "title": "First create",
            }),
            client_timestamp: 100,
        },
    ];

    h.router.handle(&conn, actor("alice"), ClientEvent::ReplayOps(ops)).await;

    match rx.try_recv().unwrap() {
        ServerEvent::TaskCreated(task) => assert_eq!(task.title, "First create"),
        other => panic!("expected TaskCreated first, got {other:?}"),
    }
    match rx.try_recv().unwrap() {
        ServerEvent::TaskUpdated(task) => {
            assert_eq!(task.title, "Second edit");
            assert_eq!(task.version, 2);
        }
        other => panic!("expected TaskUpdated second, got {other:?}"),
    }
    assert!(rx.try_recv().is_err(), "presence update in the replay stream must not emit anything");
}

#[tokio::test]
async fn cold_start_hydrates_from_populated_durable_store() {
    let store: SharedStore = Arc::new(InMemoryStore::new());
    let seed = board_coordinator::model::Task {
        id: "seed".to_string(),
        column_id: ColumnId::Done,
        title: "Pre-existing".to_string(),
        description: String::new(),
        order: 1.0,
        version: 3,
        created_at: chrono::Utc::now(),
        updated_at: chrono::Utc::now(),
        creator_name: "alice".to_string(),
        creator_color: "#000".to_string(),
        updated_by_name: "alice".to_string(),
        updated_by_color: "#000".to_string(),
    };
    store.upsert(&seed).await.unwrap();

    let cache = Arc::new(AuthoritativeCache::new(store.clone()));
    let flush = FlushQueue::new(cache.clone(), store.clone());
    let service = TaskService::new(cache, flush);

    let tasks = service.get_all_tasks().await.unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].id, "seed");

    let again = service.get_task(&"seed".to_string()).await.unwrap();
    assert!(again.is_some(), "second read is served from the now-hydrated cache");
}

#[tokio::test]
async fn presence_update_broadcasts_presence_state() {
    let (h, mut rx, conn) = wire();

    h.router
        .handle(
            &conn,
            actor("alice"),
            ClientEvent::PresenceUpdate(PresenceUpdatePayload {
                status: PresenceStatus::Idle,
                task_id: None,
            }),
        )
        .await;

    // PresenceRegistry::update returns None for an unregistered connection
    // (the router never calls `connect` itself — that happens at socket
    // upgrade), so no broadcast is expected here.
    assert!(rx.try_recv().is_err());
}

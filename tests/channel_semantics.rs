//! Consumer-group semantics shared by every channel backend.
//!
//! The in-memory backend always runs. The Redis backend runs only when
//! `TEST_REDIS_URL` is set, against uniquely named streams.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::plan_of;
use skill_relay::execution::{PlanExecutor, ResultRouting, RetryPolicy, RunOutcome};
use skill_relay::messaging::{
    InMemoryChannel, MessageChannel, RedisChannel, ResultMessage, StreamNames, TaskId,
    TaskMessage,
};
use skill_relay::test_utils::{spawn_worker, test_redis_url, ScriptedExecutor, ScriptedVerdict};
use uuid::Uuid;

fn unique(prefix: &str) -> String {
    format!("{prefix}.{}", Uuid::new_v4().simple())
}

async fn redis_channel() -> Option<Arc<RedisChannel>> {
    let url = test_redis_url()?;
    Some(Arc::new(
        RedisChannel::connect(&url).await.expect("redis reachable"),
    ))
}

/// Group created after the first append still sees that record
async fn check_group_starts_at_origin<C: MessageChannel>(channel: &C) {
    let stream = unique("origin");
    let early = ResultMessage::success(TaskId::generate());
    channel.publish(&stream, &early).await.unwrap();

    channel.ensure_group(&stream, "g").await.unwrap();
    channel.ensure_group(&stream, "g").await.unwrap();

    let entries = channel
        .read_group(&stream, "g", "c", Duration::from_millis(50), 10)
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].decode::<ResultMessage>().unwrap(), early);
}

/// Append order is read order, and each record is delivered once per group
async fn check_ordering_and_single_delivery<C: MessageChannel>(channel: &C) {
    let stream = unique("order");
    channel.ensure_group(&stream, "g").await.unwrap();

    let ids: Vec<TaskId> = (0..3).map(|_| TaskId::generate()).collect();
    for id in &ids {
        channel
            .publish(&stream, &ResultMessage::failed(*id, None))
            .await
            .unwrap();
    }

    let mut seen = Vec::new();
    for _ in 0..3 {
        let entries = channel
            .read_group(&stream, "g", "c", Duration::from_millis(50), 1)
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        seen.push(entries[0].decode::<ResultMessage>().unwrap().task_id);
    }
    assert_eq!(seen, ids);

    let drained = channel
        .read_group(&stream, "g", "c", Duration::from_millis(50), 10)
        .await
        .unwrap();
    assert!(drained.is_empty());
    assert_eq!(channel.stream_len(&stream).await.unwrap(), 3);
}

/// Unacked records stay pending and come back through `read_pending`
async fn check_pending_and_idempotent_ack<C: MessageChannel>(channel: &C) {
    let stream = unique("pending");
    channel.ensure_group(&stream, "g").await.unwrap();

    let task = TaskMessage::new(TaskId::generate(), "pick", Default::default());
    channel.publish(&stream, &task).await.unwrap();

    let first = channel
        .read_group(&stream, "g", "c", Duration::from_millis(50), 1)
        .await
        .unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(channel.pending_count(&stream, "g").await.unwrap(), 1);

    let again = channel.read_pending(&stream, "g", "c", 10).await.unwrap();
    assert_eq!(again.len(), 1);
    assert_eq!(again[0].record_id, first[0].record_id);
    assert!(again[0].is_redelivery());

    assert!(channel.ack(&stream, "g", &first[0].record_id).await.unwrap());
    assert!(!channel.ack(&stream, "g", &first[0].record_id).await.unwrap());
    assert_eq!(channel.pending_count(&stream, "g").await.unwrap(), 0);
    assert!(channel.read_pending(&stream, "g", "c", 10).await.unwrap().is_empty());
}

/// Two groups on one stream each receive every record
async fn check_groups_are_independent<C: MessageChannel>(channel: &C) {
    let stream = unique("fanout");
    channel.ensure_group(&stream, "a").await.unwrap();
    channel.ensure_group(&stream, "b").await.unwrap();
    channel
        .publish(&stream, &ResultMessage::success(TaskId::generate()))
        .await
        .unwrap();

    for group in ["a", "b"] {
        let entries = channel
            .read_group(&stream, group, "c", Duration::from_millis(50), 10)
            .await
            .unwrap();
        assert_eq!(entries.len(), 1, "group {group}");
    }
}

/// Deleting a stream drops its records and groups; deleting again is a no-op
async fn check_delete_stream<C: MessageChannel>(channel: &C) {
    let stream = unique("scratch");
    channel.ensure_group(&stream, "g").await.unwrap();
    channel
        .publish(&stream, &ResultMessage::success(TaskId::generate()))
        .await
        .unwrap();

    assert!(channel.delete_stream(&stream).await.unwrap());
    assert_eq!(channel.stream_len(&stream).await.unwrap(), 0);
    assert!(channel.pending_count(&stream, "g").await.is_err());
    assert!(!channel.delete_stream(&stream).await.unwrap());
}

#[tokio::test]
async fn test_in_memory_group_semantics() {
    let channel = InMemoryChannel::new();
    check_group_starts_at_origin(&channel).await;
    check_ordering_and_single_delivery(&channel).await;
    check_pending_and_idempotent_ack(&channel).await;
    check_groups_are_independent(&channel).await;
    check_delete_stream(&channel).await;
}

#[tokio::test]
async fn test_redis_group_semantics() {
    let Some(channel) = redis_channel().await else {
        eprintln!("TEST_REDIS_URL not set; skipping");
        return;
    };
    assert!(channel.health_check().await.unwrap());
    check_group_starts_at_origin(channel.as_ref()).await;
    check_ordering_and_single_delivery(channel.as_ref()).await;
    check_pending_and_idempotent_ack(channel.as_ref()).await;
    check_groups_are_independent(channel.as_ref()).await;
    check_delete_stream(channel.as_ref()).await;
}

#[tokio::test]
async fn test_redis_run_with_retry() {
    let Some(channel) = redis_channel().await else {
        eprintln!("TEST_REDIS_URL not set; skipping");
        return;
    };

    let streams = StreamNames {
        task_stream: unique("robot.tasks"),
        result_stream: unique("robot.events"),
        ..StreamNames::default()
    };
    let script = Arc::new(
        ScriptedExecutor::new()
            .script("pour_liquid", [ScriptedVerdict::Fail("SPILL".to_string())]),
    );
    let worker = spawn_worker(Arc::clone(&channel), Arc::clone(&script), streams.clone())
        .await
        .unwrap();

    let report = PlanExecutor::new(Arc::clone(&channel), streams.clone(), "lg_1")
        .with_policy(
            RetryPolicy::default()
                .with_result_timeout(Duration::from_secs(5))
                .with_poll_slice(Duration::from_millis(250)),
        )
        .with_routing(ResultRouting::PerRun)
        .invoke(plan_of(&["pick", "pour_liquid"]))
        .await
        .unwrap();

    assert_eq!(report.outcome, RunOutcome::Success);
    assert_eq!(
        report.dispatched_skills(),
        vec!["pick", "pour_liquid", "pour_liquid"]
    );
    assert_eq!(worker.stop().await.unwrap(), 3);
    assert_eq!(
        channel
            .pending_count(&streams.task_stream, &streams.task_group)
            .await
            .unwrap(),
        0
    );
}

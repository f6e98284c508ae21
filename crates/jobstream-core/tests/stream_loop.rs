use std::sync::Arc;
use std::time::Duration;

use jobstream_core::core::session::run_stream_loop;
use jobstream_core::transport::TransportError;
use jobstream_core::{JobView, transport::JobTransport};
use jobstream_types::{JobId, StreamName};
use serde_json::json;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;


use fake_transport::{FakeTransport, agent_status, settle, terminal};

const BACKOFF: Duration = Duration::from_secs(1);

fn spawn_loop(
    fake: &Arc<FakeTransport>,
    view: &JobView,
    job: &JobId,
) -> (CancellationToken, tokio::task::JoinHandle<()>) {
    let cancel = CancellationToken::new();
    let transport: Arc<dyn JobTransport> = Arc::clone(fake) as Arc<dyn JobTransport>;
    let task = tokio::spawn(run_stream_loop(
        view.clone(),
        transport,
        job.clone(),
        BACKOFF,
        cancel.clone(),
    ));
    (cancel, task)
}

#[tokio::test(start_paused = true)]
async fn test_first_subscribe_starts_from_zero() {
    let fake = Arc::new(FakeTransport::default());
    let view = JobView::new(10_000);
    let job = JobId::from("j1");
    view.activate(&job);

    let (cancel, task) = spawn_loop(&fake, &view, &job);
    fake.wait_for_subscribes(1).await;

    let first = &fake.subscribes()[0];
    assert_eq!(first.job_id, job);
    assert_eq!(
        first.streams,
        vec![StreamName::AgentStatus, StreamName::Terminal]
    );
    assert_eq!(first.agent_status_offset, 0);
    assert_eq!(first.terminal_offset, 0);

    cancel.cancel();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_resubscribe_resumes_from_highest_offsets_after_backoff() {
    let fake = Arc::new(FakeTransport::default());
    let view = JobView::new(10_000);
    let job = JobId::from("j1");
    view.activate(&job);

    let (cancel, task) = spawn_loop(&fake, &view, &job);
    fake.wait_for_subscribes(1).await;

    fake.push(terminal("j1", 2, "$ make\n"));
    fake.push(agent_status(
        "j1",
        7,
        json!({"seq": 1, "kind": "command_output_delta", "delta": "ok\n"}),
    ));
    fake.push(agent_status(
        "j1",
        4,
        json!({"seq": 2, "kind": "command_output_delta", "delta": "done\n"}),
    ));
    fake.push(terminal("j1", 9, "ignored\n"));
    settle().await;

    let disconnected_at = Instant::now();
    fake.disconnect();
    fake.wait_for_subscribes(2).await;
    assert!(disconnected_at.elapsed() >= BACKOFF);

    let resumed = &fake.subscribes()[1];
    assert_eq!(resumed.agent_status_offset, 7);
    assert_eq!(resumed.terminal_offset, 9);

    // Replayed items after resume are dropped by seq/offset.
    fake.push(agent_status(
        "j1",
        7,
        json!({"seq": 2, "kind": "command_output_delta", "delta": "done\n"}),
    ));
    fake.push(terminal("j1", 9, "ignored\n"));
    settle().await;

    let snapshot = view.snapshot();
    assert_eq!(snapshot.visible_messages.len(), 1);
    assert_eq!(
        snapshot.visible_messages[0].content,
        "【执行输出】\nok\ndone"
    );

    cancel.cancel();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_subscribe_failure_sets_banner_until_resubscribed() {
    let fake = Arc::new(FakeTransport::default());
    fake.fail_next_subscribe(TransportError::connection("connection refused"));
    let view = JobView::new(10_000);
    let job = JobId::from("j1");
    view.activate(&job);

    let (cancel, task) = spawn_loop(&fake, &view, &job);
    fake.wait_for_subscribes(1).await;
    settle().await;
    assert!(
        view.snapshot()
            .error_text
            .is_some_and(|e| e.contains("connection refused"))
    );

    fake.wait_for_subscribes(2).await;
    fake.push(terminal("j1", 0, "compiling\n"));
    settle().await;
    let snapshot = view.snapshot();
    assert_eq!(snapshot.visible_messages[0].content, "compiling");
    assert_eq!(snapshot.error_text, None);

    cancel.cancel();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_unsubscribes_while_streaming() {
    let fake = Arc::new(FakeTransport::default());
    let view = JobView::new(10_000);
    let job = JobId::from("j1");
    view.activate(&job);

    let (cancel, task) = spawn_loop(&fake, &view, &job);
    fake.wait_for_subscribes(1).await;

    cancel.cancel();
    task.await.unwrap();
    assert_eq!(fake.unsubscribes(), vec![job]);
    assert_eq!(fake.subscribes().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_during_backoff_stops_loop() {
    let fake = Arc::new(FakeTransport::default());
    let view = JobView::new(10_000);
    let job = JobId::from("j1");
    view.activate(&job);

    let (cancel, task) = spawn_loop(&fake, &view, &job);
    fake.wait_for_subscribes(1).await;
    fake.disconnect();
    settle().await;

    cancel.cancel();
    task.await.unwrap();
    tokio::time::sleep(BACKOFF * 3).await;
    assert_eq!(fake.subscribes().len(), 1);
    assert_eq!(fake.unsubscribes(), vec![job]);
}

#[tokio::test(start_paused = true)]
async fn test_malformed_message_does_not_break_stream() {
    let fake = Arc::new(FakeTransport::default());
    let view = JobView::new(10_000);
    let job = JobId::from("j1");
    view.activate(&job);

    let (cancel, task) = spawn_loop(&fake, &view, &job);
    fake.wait_for_subscribes(1).await;

    fake.push(jobstream_types::PushMessage::new(
        "terminal",
        json!({"job_id": "j1", "chunk_b64": "%%%"}),
    ));
    fake.push(terminal("j1", 1, "still here\n"));
    settle().await;

    assert_eq!(fake.subscribes().len(), 1);
    assert_eq!(view.snapshot().visible_messages[0].content, "still here");

    cancel.cancel();
    task.await.unwrap();
}

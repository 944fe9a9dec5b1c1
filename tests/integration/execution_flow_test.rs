use std::sync::Arc;
use std::time::Duration;

use runsheet_core::{
    serve_with_listener, ApiClient, AppState, CoordinatorEvent, ExecutionApi, ExecutionStatus,
    NewExecution, NewRunbook, Priority, RunbookUpdate, StepTemplate, StepUpdateCoordinator,
    UploadStore,
};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::mpsc::UnboundedReceiver;

const DEBOUNCE: Duration = Duration::from_millis(50);

struct TestServer {
    client: ApiClient,
    base: String,
    _uploads: TempDir,
}

async fn start_server() -> TestServer {
    let uploads = tempfile::tempdir().unwrap();
    let state = AppState::in_memory(UploadStore::new(uploads.path().join("uploads")));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(serve_with_listener(listener, state, std::future::pending()));

    TestServer {
        client: ApiClient::new(base.clone(), Duration::from_secs(5)).unwrap(),
        base,
        _uploads: uploads,
    }
}

fn deploy_runbook() -> NewRunbook {
    NewRunbook::new("Deploy")
        .with_description("Production rollout")
        .with_step(StepTemplate::new("Check CI").with_link("https://ci.example.com"))
        .with_step(StepTemplate::new("Notify"))
}

async fn next_event(events: &mut UnboundedReceiver<CoordinatorEvent>) -> CoordinatorEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for a coordinator event")
        .expect("event channel closed")
}

#[tokio::test]
async fn test_checking_every_step_finishes_the_execution() {
    let server = start_server().await;
    let runbook = server.client.create_runbook(&deploy_runbook()).await.unwrap();
    let execution = server
        .client
        .start_execution(
            &NewExecution::new(runbook.id, "INC-42", "alice").with_priority(Priority::High),
        )
        .await
        .unwrap();
    assert_eq!(execution.steps.len(), 2);
    assert!(execution.finished_at.is_none());

    let api: Arc<dyn ExecutionApi> = Arc::new(server.client.clone());
    let (coordinator, mut events) = StepUpdateCoordinator::open(api, execution.id, DEBOUNCE)
        .await
        .unwrap();

    let after_first = coordinator.set_checked(0, true).await.unwrap();
    assert!(after_first.steps[0].checked);
    assert!(after_first.steps[0].executed_at.is_some());
    assert!(!after_first.is_finished());

    let after_second = coordinator.set_checked(1, true).await.unwrap();
    assert!(after_second.is_finished());

    let mut completed = None;
    while completed.is_none() {
        if let CoordinatorEvent::Completed(execution) = next_event(&mut events).await {
            completed = Some(execution);
        }
    }

    let stored = server.client.get_execution(execution.id).await.unwrap();
    let finished_at = stored.finished_at.expect("finishedAt should be set");
    assert!(finished_at >= stored.started_at);
    assert_eq!(stored.status, ExecutionStatus::Completed);
    assert_eq!(stored.incident_id, "INC-42");
    assert_eq!(stored.priority, Priority::High);
}

#[tokio::test]
async fn test_debounced_remarks_reach_the_server_as_one_batch() {
    let server = start_server().await;
    let runbook = server.client.create_runbook(&deploy_runbook()).await.unwrap();
    let execution = server
        .client
        .start_execution(&NewExecution::new(runbook.id, "INC-7", "bob"))
        .await
        .unwrap();

    let api: Arc<dyn ExecutionApi> = Arc::new(server.client.clone());
    let (coordinator, mut events) = StepUpdateCoordinator::new(api, execution.clone(), DEBOUNCE);

    coordinator.edit_remark_text(0, "w");
    coordinator.edit_remark_text(0, "wa");
    coordinator.edit_remark_text(0, "waited for lag");
    coordinator.edit_remark_text(1, "paged #ops");
    assert_eq!(coordinator.pending().len(), 2);
    assert_eq!(
        coordinator.execution().steps[0].remark_text.as_deref(),
        Some("waited for lag")
    );

    match next_event(&mut events).await {
        CoordinatorEvent::Updated(updated) => {
            assert_eq!(updated.steps[0].remark_text.as_deref(), Some("waited for lag"));
            assert_eq!(updated.steps[1].remark_text.as_deref(), Some("paged #ops"));
        }
        other => panic!("expected an update, got {:?}", other),
    }
    assert!(coordinator.pending().is_empty());

    let stored = server.client.get_execution(execution.id).await.unwrap();
    assert_eq!(stored.steps[0].remark_text.as_deref(), Some("waited for lag"));
    assert!(!stored.steps[0].checked);
    assert!(stored.finished_at.is_none());
}

#[tokio::test]
async fn test_runbook_edits_do_not_reach_running_executions() {
    let server = start_server().await;
    let runbook = server.client.create_runbook(&deploy_runbook()).await.unwrap();
    let execution = server
        .client
        .start_execution(&NewExecution::new(runbook.id, "", ""))
        .await
        .unwrap();

    let update = RunbookUpdate {
        steps: Some(vec![StepTemplate::new("Only step")]),
        ..Default::default()
    };
    let edited = server.client.update_runbook(runbook.id, &update).await.unwrap();
    assert_eq!(edited.steps.len(), 1);
    assert_eq!(edited.created_at, runbook.created_at);

    server.client.delete_runbook(runbook.id).await.unwrap();

    let stored = server.client.get_execution(execution.id).await.unwrap();
    assert_eq!(stored.steps.len(), 2);
    assert_eq!(stored.steps[0].text, "Check CI");
    assert_eq!(stored.runbook_title, "Deploy");
}

#[tokio::test]
async fn test_uploaded_image_is_served_and_attached() {
    let server = start_server().await;
    let runbook = server.client.create_runbook(&deploy_runbook()).await.unwrap();
    let execution = server
        .client
        .start_execution(&NewExecution::new(runbook.id, "INC-9", "carol"))
        .await
        .unwrap();

    let url = server
        .client
        .upload_bytes("graph.png", b"not really a png".to_vec())
        .await
        .unwrap();
    assert!(url.starts_with("/uploads/graph-"));
    assert!(url.ends_with(".png"));

    let served = reqwest::get(format!("{}{}", server.base, url))
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();
    assert_eq!(&served[..], b"not really a png");

    let api: Arc<dyn ExecutionApi> = Arc::new(server.client.clone());
    let (coordinator, _events) = StepUpdateCoordinator::new(api, execution.clone(), DEBOUNCE);
    coordinator.edit_remark_image(1, url.clone());
    let flushed = coordinator.flush_now().await.expect("flush should succeed");
    assert_eq!(flushed.steps[1].remark_image.as_deref(), Some(url.as_str()));
}

#[tokio::test]
async fn test_deleted_execution_is_not_found() {
    let server = start_server().await;
    let runbook = server.client.create_runbook(&deploy_runbook()).await.unwrap();
    let execution = server
        .client
        .start_execution(&NewExecution::new(runbook.id, "", ""))
        .await
        .unwrap();

    server.client.delete_execution(execution.id).await.unwrap();
    server.client.delete_execution(execution.id).await.unwrap();

    let err = server.client.get_execution(execution.id).await.unwrap_err();
    assert!(err.is_not_found(), "unexpected error: {}", err);
    assert!(server.client.list_executions().await.unwrap().is_empty());
}

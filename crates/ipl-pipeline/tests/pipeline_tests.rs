//! End-to-end runs of the executor against in-memory platform and shares.

use ipl_core::{ActionRequest, ConfigLoader, IplError, LoadedConfig, RequestOverrides};
use ipl_pipeline::{Action, ExecutionOutcome, ExecutionPhase, Executor};
use ipl_platform::{RegistryEntry, StaticPlatform, Status};
use ipl_share::MemoryShareServer;
use serde_json::{json, Value};

// =============================================================================
// Fixtures
// =============================================================================

fn smb_source(name: &str) -> Value {
    json!({
        "name": name,
        "kind": "smb",
        "username": "svc-labels",
        "password": "hunter2",
        "label_filter": ".*",
        "path_filter": ""
    })
}

fn config(sources: Vec<Value>) -> LoadedConfig {
    let raw = json!({ "version": 1, "data_sources": sources }).to_string();
    ConfigLoader::new().load(&raw).unwrap()
}

fn row(full: &str, labels: &[&str]) -> Value {
    let name = full.rsplit('/').next().unwrap();
    let share = full.split('/').next().unwrap();
    json!({
        "objectName": name,
        "fullObjectName": full,
        "containerName": share,
        "attribute": labels
    })
}

async fn run(
    action: Action,
    config: LoadedConfig,
    platform: &StaticPlatform,
    server: &MemoryShareServer,
) -> ExecutionOutcome {
    Executor::new(platform, server)
        .run(action, config, &RequestOverrides::default(), "exec-1")
        .await
}

// =============================================================================
// Encrypt
// =============================================================================

#[tokio::test]
async fn test_unknown_data_source_fails_without_writes() {
    let platform = StaticPlatform::new();
    let server = MemoryShareServer::new();
    server.add_dir("share", "path/to");

    let outcome = run(Action::Encrypt, config(vec![smb_source("ds-not-found")]), &platform, &server).await;

    assert!(!outcome.is_success());
    assert_eq!(outcome.phase(), ExecutionPhase::Failed);
    assert_eq!(outcome.files_written, 0);
    assert_eq!(server.file_count(), 0);
    assert!(server.connected_servers().is_empty());
    assert_eq!(
        outcome.message(),
        "RESOLVE/expected exactly one data source named ds-not-found, found 0\n\
         RESOLVE/no data sources enumerated"
    );
}

#[tokio::test]
async fn test_malformed_row_does_not_abort_scan() {
    let platform = StaticPlatform::new()
        .with_connection(RegistryEntry::smb("fileshare", "10.0.0.5", "share"))
        .with_catalog(
            "fileshare",
            vec![
                row("share/path/to/file.txt", &["label-1", "label-2"]),
                json!({ "objectName": "broken.txt" }),
            ],
        );
    let server = MemoryShareServer::new();
    server.add_dir("share", "path/to");

    let outcome = run(Action::Encrypt, config(vec![smb_source("fileshare")]), &platform, &server).await;

    assert!(outcome.is_success(), "{}", outcome.message());
    assert_eq!(outcome.files_written, 1);
    assert_eq!(server.files("share"), vec!["path/to/.ip-labels".to_string()]);

    let written = server.file("share", "path/to/.ip-labels").unwrap();
    let text = String::from_utf8(written).unwrap();
    assert!(text.starts_with("{\n    \"file.txt\": {"));
    let parsed: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(parsed, json!({ "file.txt": { "labels": ["label-1", "label-2"] } }));
}

#[tokio::test]
async fn test_write_failures_counted_per_group() {
    let platform = StaticPlatform::new()
        .with_connection(RegistryEntry::smb("fileshare", "10.0.0.5", "share"))
        .with_catalog(
            "fileshare",
            vec![row("share/a/one.txt", &["pii"]), row("share/b/two.txt", &["pii"])],
        );
    let server = MemoryShareServer::new();
    server.add_dir("share", "a").add_dir("share", "b");
    server.fail_every_other_write();

    let outcome = run(Action::Encrypt, config(vec![smb_source("fileshare")]), &platform, &server).await;

    assert!(!outcome.is_success());
    assert_eq!(outcome.warnings.len(), 1);
    assert_eq!(outcome.files_written, 1);
    assert!(outcome.message().starts_with("SHARE/failed to write labels to share/b"));
    assert_eq!(server.files("share"), vec!["a/.ip-labels".to_string()]);
}

#[tokio::test]
async fn test_missing_directory_is_warning() {
    let platform = StaticPlatform::new()
        .with_connection(RegistryEntry::smb("fileshare", "10.0.0.5", "share"))
        .with_catalog(
            "fileshare",
            vec![row("share/kept/one.txt", &["pii"]), row("share/moved/two.txt", &["pii"])],
        );
    let server = MemoryShareServer::new();
    server.add_dir("share", "kept");

    let outcome = run(Action::Encrypt, config(vec![smb_source("fileshare")]), &platform, &server).await;

    assert_eq!(outcome.files_written, 1);
    assert_eq!(outcome.message(), "SHARE/directory share/moved not found, skipping");
}

#[tokio::test]
async fn test_source_without_labeled_files_is_not_a_warning() {
    let platform = StaticPlatform::new()
        .with_connection(RegistryEntry::smb("fileshare", "10.0.0.5", "share"))
        .with_catalog("fileshare", vec![row("share/a/one.txt", &[])]);
    let server = MemoryShareServer::new();

    let outcome = run(Action::Encrypt, config(vec![smb_source("fileshare")]), &platform, &server).await;

    assert!(outcome.is_success());
    assert_eq!(outcome.sources_processed, 1);
    assert!(server.connected_servers().is_empty());
}

#[tokio::test]
async fn test_one_session_per_source() {
    let platform = StaticPlatform::new()
        .with_connection(RegistryEntry::smb("first", "10.0.0.5", "share"))
        .with_connection(RegistryEntry::smb("second", "10.0.0.6", "share"))
        .with_catalog("first", vec![row("share/a/one.txt", &["pii"])])
        .with_catalog("second", vec![row("share/b/two.txt", &["pii"])]);
    let server = MemoryShareServer::new();
    server.add_dir("share", "a").add_dir("share", "b");

    let outcome = run(
        Action::Encrypt,
        config(vec![smb_source("first"), smb_source("second")]),
        &platform,
        &server,
    )
    .await;

    assert!(outcome.is_success(), "{}", outcome.message());
    assert_eq!(server.connected_servers(), vec!["10.0.0.5", "10.0.0.6"]);
    assert_eq!(server.disconnects(), 2);

    let updates = platform.updates();
    assert_eq!(updates.len(), 2);
    assert!(updates.iter().all(|u| u.status_enum == Status::InProgress));
    assert_eq!(updates[0].progress, 0.5);
    assert_eq!(updates[1].progress, 1.0);
}

#[tokio::test]
async fn test_connect_failure_skips_source() {
    let platform = StaticPlatform::new()
        .with_connection(RegistryEntry::smb("fileshare", "10.0.0.5", "share"))
        .with_catalog("fileshare", vec![row("share/a/one.txt", &["pii"])]);
    let server = MemoryShareServer::new();
    server.fail_connect();

    let outcome = run(Action::Encrypt, config(vec![smb_source("fileshare")]), &platform, &server).await;

    assert_eq!(outcome.files_written, 0);
    assert!(outcome
        .message()
        .starts_with("SHARE/failed to connect to data source fileshare"));
    assert!(!outcome.message().contains("hunter2"));
}

#[tokio::test]
async fn test_platform_failure_is_warning() {
    let platform = StaticPlatform::new()
        .with_connection(RegistryEntry::smb("fileshare", "10.0.0.5", "share"))
        .with_failing_source("fileshare");
    let server = MemoryShareServer::new();

    let outcome = run(Action::Encrypt, config(vec![smb_source("fileshare")]), &platform, &server).await;

    assert!(!outcome.is_success());
    assert!(outcome.message().starts_with("PLATFORM/"));
}

// =============================================================================
// Verify Config
// =============================================================================

#[tokio::test]
async fn test_verify_wildcard_probes_every_visible_share() {
    let platform = StaticPlatform::new()
        .with_connection(RegistryEntry::smb("fileshare", "10.0.0.5", ""));
    let server = MemoryShareServer::new();
    server.add_share("finance").add_share("hr").add_share("IPC$");

    let outcome = run(Action::VerifyConfig, config(vec![smb_source("fileshare")]), &platform, &server).await;

    assert!(outcome.is_success(), "{}", outcome.message());
    assert_eq!(outcome.shares_verified, 2);
    assert_eq!(server.write_calls(), 2);
    assert_eq!(server.file_count(), 0);
    assert_eq!(server.disconnects(), 1);
}

#[tokio::test]
async fn test_verify_named_share_failure_does_not_stop_others() {
    let platform = StaticPlatform::new()
        .with_connection(RegistryEntry::smb("fileshare", "10.0.0.5", "missing, finance"));
    let server = MemoryShareServer::new();
    server.add_share("finance");

    let outcome = run(Action::VerifyConfig, config(vec![smb_source("fileshare")]), &platform, &server).await;

    assert_eq!(outcome.shares_verified, 1);
    assert_eq!(outcome.warnings.len(), 1);
    assert!(outcome
        .message()
        .starts_with("SHARE/failed to write probe file to share missing"));
}

// =============================================================================
// Request handling
// =============================================================================

#[tokio::test]
async fn test_unrecognized_action_is_single_warning() {
    let platform = StaticPlatform::new()
        .with_connection(RegistryEntry::smb("fileshare", "10.0.0.5", "share"));
    let server = MemoryShareServer::new();

    let outcome = run(
        Action::parse("Decrypt"),
        config(vec![smb_source("fileshare")]),
        &platform,
        &server,
    )
    .await;

    assert_eq!(outcome.message(), "ACTION/unrecognized action name: Decrypt");
    assert!(server.connected_servers().is_empty());
}

#[tokio::test]
async fn test_config_warnings_fail_the_request() {
    let platform = StaticPlatform::new()
        .with_connection(RegistryEntry::smb("fileshare", "10.0.0.5", "share"));
    let server = MemoryShareServer::new();
    let mut nfs = smb_source("exports");
    nfs["kind"] = json!("nfs");

    let outcome = run(Action::Encrypt, config(vec![nfs, smb_source("fileshare")]), &platform, &server).await;

    assert_eq!(outcome.sources_processed, 1);
    assert_eq!(outcome.warnings.len(), 1);
    assert!(outcome.message().starts_with("CONFIG/unsupported data source"));
    assert!(!outcome.message().contains("hunter2"));
}

fn request(action: &str, config: &Value, action_params: Value) -> ActionRequest {
    let body = json!({
        "actionName": action,
        "executionId": "exec-1",
        "tpaId": "tpa",
        "bigidToken": "token",
        "bigidBaseUrl": "http://bigid/api/v1/",
        "updateResultCallback": "http://bigid/api/v1/tpa/executions/exec-1",
        "globalParams": [{ "paramName": "config", "paramValue": config.to_string() }],
        "actionParams": action_params
    });
    ActionRequest::from_slice(body.to_string().as_bytes()).unwrap()
}

#[tokio::test]
async fn test_request_overrides_apply() {
    let platform = StaticPlatform::new()
        .with_connection(RegistryEntry::smb("first", "10.0.0.5", "share"))
        .with_connection(RegistryEntry::smb("second", "10.0.0.6", "share"))
        .with_catalog(
            "second",
            vec![
                row("share/a/one.txt", &["PII-email"]),
                row("share/a/two.txt", &["public"]),
            ],
        );
    let server = MemoryShareServer::new();
    server.add_dir("share", "a");
    let config = json!({
        "version": 1,
        "data_sources": [smb_source("first"), smb_source("second")]
    });
    let params = json!([
        { "paramName": "data_source_name", "paramValue": "second" },
        { "paramName": "label_filter", "paramValue": "pii" }
    ]);

    let outcome = Executor::new(&platform, &server)
        .execute(&request("Encrypt", &config, params))
        .await
        .unwrap();

    assert!(outcome.is_success(), "{}", outcome.message());
    assert_eq!(server.connected_servers(), vec!["10.0.0.6"]);
    let written: Value =
        serde_json::from_slice(&server.file("share", "a/.ip-labels").unwrap()).unwrap();
    assert_eq!(written, json!({ "one.txt": { "labels": ["PII-email"] } }));
}

#[tokio::test]
async fn test_missing_config_is_fatal() {
    let platform = StaticPlatform::new();
    let server = MemoryShareServer::new();
    let mut req = request("Encrypt", &json!({}), json!([]));
    req.global_params.clear();

    let err = Executor::new(&platform, &server).execute(&req).await.unwrap_err();
    assert!(matches!(err, IplError::FatalInput(_)));
}

#[tokio::test]
async fn test_broken_config_top_level_is_fatal() {
    let platform = StaticPlatform::new();
    let server = MemoryShareServer::new();
    let req = request("Encrypt", &json!({ "data_sources": [] }), json!([]));

    let err = Executor::new(&platform, &server).execute(&req).await.unwrap_err();
    assert!(matches!(err, IplError::Config(_)));
}

#[tokio::test]
async fn test_zero_warning_bound_still_fails_request() {
    let platform = StaticPlatform::new();
    let server = MemoryShareServer::new();
    let config = json!({ "version": 1, "data_sources": [smb_source("ds-not-found")] });

    let outcome = Executor::new(&platform, &server)
        .with_max_warnings(0)
        .execute(&request("Encrypt", &config, json!([])))
        .await
        .unwrap();

    assert!(!outcome.is_success());
    assert_eq!(outcome.phase(), ExecutionPhase::Failed);
    assert_eq!(outcome.warnings.len(), 1);
    assert_eq!(outcome.warnings.dropped(), 1);
    assert_eq!(
        outcome.message(),
        "RESOLVE/expected exactly one data source named ds-not-found, found 0"
    );
}

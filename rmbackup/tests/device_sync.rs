use rmbackup::sync::engine::{EngineError, SyncEngine};
use rmbackup::sync::mapping::MappingStore;
use rmbackup::sync::tree::NodeKind;
use rmbackup_core::DeviceClient;
use serde_json::json;
use tempfile::tempdir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_device(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/documents/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "ID": "folder-a",
                "Parent": "",
                "VissibleName": "A",
                "Type": "CollectionType",
                "ModifiedClient": "2023-05-30T10:00:00.000000Z"
            },
            {
                "ID": "doc-2",
                "Parent": "",
                "VissibleName": "doc2",
                "Type": "DocumentType",
                "ModifiedClient": "2023-06-02T08:00:00.000000Z"
            }
        ])))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/documents/folder-a"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "ID": "doc-1",
                "Parent": "folder-a",
                "VissibleName": "doc1",
                "Type": "DocumentType",
                "ModifiedClient": "2023-06-01T06:51:07.000000Z"
            }
        ])))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/download/doc-1/pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF doc1".to_vec()))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/download/doc-2/pdf"))
        .respond_with(ResponseTemplate::new(502))
        .mount(server)
        .await;
}

#[tokio::test]
async fn builds_tree_from_device_listings() {
    let server = MockServer::start().await;
    mount_device(&server).await;

    let engine = SyncEngine::new(DeviceClient::with_base_url(&server.uri()).unwrap());
    let tree = engine.build_tree().await.unwrap();

    assert_eq!(tree.resolve_path("A/doc1"), Some("doc-1"));
    assert_eq!(tree.resolve_path("doc2"), Some("doc-2"));
    assert!(tree.get("folder-a").is_none());
    assert_eq!(tree.get("doc-1").unwrap().kind, NodeKind::Document);
}

#[tokio::test]
async fn register_sync_and_persist_round_trip() {
    let server = MockServer::start().await;
    mount_device(&server).await;
    let dir = tempdir().unwrap();
    let mapping_file = dir.path().join("mapping.txt");
    let doc1_target = dir.path().join("backup/doc1.pdf");
    let doc2_target = dir.path().join("backup/doc2.pdf");

    let engine = SyncEngine::new(DeviceClient::with_base_url(&server.uri()).unwrap());
    let tree = engine.build_tree().await.unwrap();

    let mut store = MappingStore::load(&mapping_file).await.unwrap();
    assert!(store.is_empty());
    engine
        .register_entry(&tree, &mut store, "/A/doc1", &doc1_target)
        .unwrap();
    engine
        .register_entry(&tree, &mut store, "doc2", &doc2_target)
        .unwrap();
    let unknown = engine.register_entry(&tree, &mut store, "A/doc3", dir.path().join("x.pdf"));
    assert!(matches!(unknown, Err(EngineError::UnknownRemotePath(_))));
    store.save(&mapping_file).await.unwrap();

    let store = MappingStore::load(&mapping_file).await.unwrap();
    assert_eq!(store.len(), 2);
    let report = engine.sync_all(&tree, &store).await;

    assert_eq!(report.written, vec!["doc-1"]);
    assert_eq!(report.failed(), 1);
    assert_eq!(report.failures[0].id, "doc-2");
    assert_eq!(std::fs::read(&doc1_target).unwrap(), b"%PDF doc1");
    assert!(!doc2_target.exists());
}

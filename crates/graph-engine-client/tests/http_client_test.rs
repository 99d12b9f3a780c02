//! HTTP-level tests for both connection variants against a mock engine

use graph_engine_client::{
    AlgorithmKind, DatabaseResultReader, DeploymentMode, EngineConnection, EngineError,
    EngineSize, JobHandle, LoadGraphRequest, ManagedConnection, ResultReader,
    SelfManagedConnection, StoreResultsRequest,
};
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

async fn self_managed(server: &MockServer) -> SelfManagedConnection {
    Mock::given(method("GET"))
        .and(path("/v1/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "engine_id": "gral-1",
            "status": "healthy"
        })))
        .mount(server)
        .await;
    SelfManagedConnection::new(&server.uri(), None).unwrap()
}

#[tokio::test]
async fn test_load_graph_sends_explicit_null_graph_name() {
    let server = MockServer::start().await;
    let conn = self_managed(&server).await;

    Mock::given(method("POST"))
        .and(path("/v1/loaddata"))
        .and(|req: &Request| {
            let body: Value = serde_json::from_slice(&req.body).unwrap_or(Value::Null);
            body.as_object()
                .map(|o| o.contains_key("graph_name") && o["graph_name"].is_null())
                .unwrap_or(false)
        })
        .and(body_partial_json(json!({
            "database": "shop",
            "vertex_collections": ["users", "items"],
            "edge_collections": ["bought"]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "graph_id": "g-7",
            "vertex_count": 120,
            "edge_count": 340
        })))
        .expect(1)
        .mount(&server)
        .await;

    let engine = conn.deploy_engine(EngineSize::Small).await.unwrap();
    assert_eq!(engine.id, "gral-1");
    assert!(engine.ready);
    assert_eq!(conn.deployment_mode(), DeploymentMode::SelfManaged);

    let request = LoadGraphRequest::collections("shop", ["users", "items"], ["bought"]);
    let graph = conn.load_graph(&engine, &request).await.unwrap();
    assert_eq!(graph.graph_id, "g-7");
    assert_eq!(graph.vertex_count, 120);
    assert_eq!(graph.edge_count, 340);
}

#[tokio::test]
async fn test_missing_collection_is_reported() {
    let server = MockServer::start().await;
    let conn = self_managed(&server).await;

    Mock::given(method("POST"))
        .and(path("/v1/loaddata"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": "collection 'ghosts' not found"
        })))
        .mount(&server)
        .await;

    let engine = conn.locate_engine().await.unwrap();
    let request = LoadGraphRequest::collections("shop", ["ghosts"], Vec::<String>::new());
    let err = conn.load_graph(&engine, &request).await.unwrap_err();
    assert!(matches!(err, EngineError::CollectionNotFound(ref msg) if msg.contains("ghosts")));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_server_errors_are_transient() {
    let server = MockServer::start().await;
    let conn = self_managed(&server).await;

    Mock::given(method("GET"))
        .and(path("/v1/jobs/9"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({"error": "overloaded"})))
        .mount(&server)
        .await;

    let engine = conn.locate_engine().await.unwrap();
    let err = conn.poll_job(&engine, &JobHandle { job_id: "9".to_string() }).await.unwrap_err();
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_managed_deploy_and_readiness() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/engines"))
        .and(body_partial_json(json!({"size_id": "e16"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "eng-42",
            "ready": false
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/engines/eng-42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "eng-42",
            "endpoint": format!("{}/engines/eng-42", server.uri()),
            "ready": true,
            "size_id": "e16"
        })))
        .mount(&server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/v1/engines/eng-42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let conn = ManagedConnection::new(&server.uri(), Some("secret".to_string())).unwrap();
    assert!(conn.supports_job_cancel());

    let pending = conn.deploy_engine(EngineSize::Medium).await.unwrap();
    assert!(!pending.ready);
    assert_eq!(pending.size, Some(EngineSize::Medium));
    assert!(pending.deployed_at.is_some());

    let ready = conn.engine_status(&pending).await.unwrap();
    assert!(ready.ready);
    assert!(ready.endpoint.ends_with("/engines/eng-42"));
    assert_eq!(ready.deployed_at, pending.deployed_at);

    conn.delete_engine(&ready).await.unwrap();
}

#[tokio::test]
async fn test_job_submission_poll_and_store() {
    let server = MockServer::start().await;
    let conn = self_managed(&server).await;

    Mock::given(method("POST"))
        .and(path("/v1/pagerank"))
        .and(body_partial_json(json!({"graph_id": "g-1", "damping_factor": 0.85})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"job_id": 31})))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/jobs/31"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "progress": 10,
            "total": 10,
            "status": "whatever"
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/storeresults"))
        .and(body_partial_json(json!({
            "job_ids": ["31"],
            "target_collection": "users_rank",
            "attribute_names": ["rank"]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"documents_written": 10})))
        .mount(&server)
        .await;

    let engine = conn.locate_engine().await.unwrap();
    let mut params = serde_json::Map::new();
    params.insert("damping_factor".to_string(), json!(0.85));

    let job = conn.run_algorithm(&engine, AlgorithmKind::Pagerank, "g-1", &params).await.unwrap();
    assert_eq!(job.job_id, "31");

    let status = conn.poll_job(&engine, &job).await.unwrap();
    assert!(status.is_complete());

    let outcome = conn
        .store_results(&engine, &StoreResultsRequest {
            job_ids: vec![job.job_id.clone()],
            database: "shop".to_string(),
            target_collection: "users_rank".to_string(),
            attribute_names: vec!["rank".to_string()],
        })
        .await
        .unwrap();
    assert_eq!(outcome.documents_written, 10);

    let err = conn.cancel_job(&engine, &job).await.unwrap_err();
    assert!(matches!(err, EngineError::Unsupported(_)));
}

#[tokio::test]
async fn test_graph_listing_and_deletion() {
    let server = MockServer::start().await;
    let conn = self_managed(&server).await;

    Mock::given(method("GET"))
        .and(path("/v1/graphs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "graphs": [
                {"graph_id": "g-1", "vertex_count": 5, "edge_count": 4},
                {"graph_id": "g-2", "vertex_count": 8, "edge_count": 12}
            ]
        })))
        .mount(&server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/v1/graphs/g-2"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/graphs/g-404"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"error": "no such graph"})))
        .mount(&server)
        .await;

    let engine = conn.locate_engine().await.unwrap();
    let graphs = conn.list_graphs(&engine).await.unwrap();
    assert_eq!(graphs.len(), 2);
    assert_eq!(graphs[1].edge_count, 12);

    conn.delete_graph(&engine, "g-2").await.unwrap();

    let err = conn.get_graph(&engine, "g-404").await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
}

#[tokio::test]
async fn test_result_reader_queries_cursor() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/_db/shop/_api/cursor"))
        .and(body_partial_json(json!({"bindVars": {"@collection": "users_wcc", "limit": 2}})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "result": [
                {"_key": "1", "id": "users/1", "component": "users/1"},
                {"_key": "2", "id": "users/2", "component": "users/1"}
            ]
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/_db/shop/_api/cursor"))
        .and(body_partial_json(json!({"bindVars": {"@collection": "users_wcc", "field": "component"}})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"result": [3]})))
        .mount(&server)
        .await;

    let reader = DatabaseResultReader::new(&server.uri(), None).unwrap();
    let docs = reader.sample_results("shop", "users_wcc", 2).await.unwrap();
    assert_eq!(docs.len(), 2);
    assert_eq!(docs[0].collection(), "users");
    assert_eq!(docs[1].get("component"), Some(&json!("users/1")));

    let distinct = reader.count_distinct("shop", "users_wcc", "component").await.unwrap();
    assert_eq!(distinct, 3);
}

#[tokio::test]
async fn test_result_reader_accepts_in_place_results() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/_db/shop/_api/cursor"))
        .and(body_partial_json(json!({"bindVars": {"@collection": "accounts", "limit": 2}})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "result": [
                {"_key": "1", "_id": "accounts/1", "component": "accounts/1"},
                {"_key": "2", "_id": "accounts/2", "component": "accounts/1"}
            ]
        })))
        .mount(&server)
        .await;

    let reader = DatabaseResultReader::new(&server.uri(), None).unwrap();
    let docs = reader.sample_results("shop", "accounts", 2).await.unwrap();
    assert_eq!(docs.len(), 2);
    assert_eq!(docs[0].id, "accounts/1");
    assert!(docs.iter().all(|doc| doc.collection() == "accounts"));
}

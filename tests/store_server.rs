mod common;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode},
};
use common::{school_document, school_store};
use ecole221::domain::{Actor, AttacheDesk, Role, StudentFilter, StudentPortal};
use ecole221::server::{DbFile, router};
use ecole221::{
    ClientConfig, ErrorKind, HttpResourceClient, InMemoryStore, JoinResolver, RecordKey,
    RelationDescriptor, ResourceStore, SharedStore, UpdateMode, ViewOptions, record,
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("json request")
}

fn empty_request(method: Method, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("empty request")
}

async fn request_json(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router
        .clone()
        .oneshot(request)
        .await
        .expect("router response");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("collect body")
        .to_bytes();

    if bytes.is_empty() {
        return (status, Value::Null);
    }
    let value = serde_json::from_slice(&bytes)
        .unwrap_or_else(|err| panic!("response is not JSON ({err}): {bytes:?}"));
    (status, value)
}

fn school_router() -> Router {
    router(school_store(), None)
}

// ============================================================================
// ROUTES
// ============================================================================

#[tokio::test]
async fn list_applies_query_string_equality() {
    let app = school_router();

    let (status, body) = request_json(&app, empty_request(Method::GET, "/etudiants?id_classe=5")).await;

    assert_eq!(status, StatusCode::OK);
    let matricules: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|s| s.get("matricule").and_then(Value::as_str))
        .collect();
    assert_eq!(matricules, vec!["ETU-001", "ETU-002"]);
}

#[tokio::test]
async fn json_server_directives_are_not_filters() {
    let app = school_router();

    let (status, body) = request_json(&app, empty_request(Method::GET, "/classes?_sort=libelle")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn create_assigns_a_string_id() {
    let app = school_router();

    let (status, created) = request_json(
        &app,
        json_request(Method::POST, "/modules", json!({ "libelle": "Réseaux" })),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created, json!({ "libelle": "Réseaux", "id": "3" }));

    let (status, fetched) = request_json(&app, empty_request(Method::GET, "/modules/3")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["libelle"], "Réseaux");
}

#[tokio::test]
async fn patch_merges_and_put_replaces() {
    let app = school_router();

    let (status, patched) = request_json(
        &app,
        json_request(Method::PATCH, "/classes/6", json!({ "state": "archivé" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(patched["libelle"], "L2 Gestion");
    assert_eq!(patched["state"], "archivé");

    let (status, replaced) = request_json(
        &app,
        json_request(Method::PUT, "/classes/6", json!({ "libelle": "L2 Compta" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(replaced, json!({ "libelle": "L2 Compta", "id": "6" }));
}

#[tokio::test]
async fn numeric_ids_are_reachable_by_their_text_form() {
    let app = school_router();

    let (status, class) = request_json(&app, empty_request(Method::GET, "/classes/5")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(class["id"], json!(5));
}

#[tokio::test]
async fn missing_records_and_collections_are_404() {
    let app = school_router();

    let (status, body) = request_json(&app, empty_request(Method::GET, "/classes/404")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");

    let (status, _) = request_json(&app, empty_request(Method::GET, "/salles")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = request_json(&app, empty_request(Method::DELETE, "/classes/404")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_answers_no_content() {
    let app = school_router();

    let (status, body) = request_json(&app, empty_request(Method::DELETE, "/absences/2")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, Value::Null);

    let (_, remaining) = request_json(&app, empty_request(Method::GET, "/absences")).await;
    assert_eq!(remaining.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn non_object_body_is_rejected() {
    let app = school_router();

    let (status, body) = request_json(
        &app,
        json_request(Method::POST, "/classes", json!(["L1 Info"])),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "input_error");
}

#[tokio::test]
async fn writes_are_saved_to_the_db_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("db.json");
    std::fs::write(&path, school_document().to_string()).unwrap();
    let db = DbFile::new(&path);
    let app = router(Arc::new(db.load().unwrap()), Some(Arc::new(db)));

    let (status, _) = request_json(
        &app,
        json_request(Method::PATCH, "/inscriptions/2", json!({ "statut": "validée" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let reloaded = DbFile::new(&path).load().unwrap();
    let inscription = reloaded.get("inscriptions", &RecordKey::from("2")).unwrap();
    assert_eq!(inscription.get_str("statut"), Some("validée"));
    assert_eq!(reloaded.collection_names().unwrap().len(), 17);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writes_all_reach_the_db_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("db.json");
    std::fs::write(&path, school_document().to_string()).unwrap();
    let db = DbFile::new(&path);
    let app = router(Arc::new(db.load().unwrap()), Some(Arc::new(db)));

    let posts = (0..16).map(|i| {
        let app = app.clone();
        tokio::spawn(async move {
            let body = json!({ "libelle": format!("Salle {i}") });
            request_json(&app, json_request(Method::POST, "/salles", body)).await.0
        })
    });
    for status in futures::future::join_all(posts).await {
        assert_eq!(status.unwrap(), StatusCode::CREATED);
    }

    let reloaded = DbFile::new(&path).load().unwrap();
    let salles = reloaded.list("salles", &[]).unwrap();
    assert_eq!(salles.len(), 16);
}

// ============================================================================
// OVER THE WIRE
// ============================================================================

async fn serve(store: Arc<InMemoryStore>) -> HttpResourceClient {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(store, None)).await.unwrap();
    });
    HttpResourceClient::new(ClientConfig::new(&format!("http://{addr}"))).unwrap()
}

#[tokio::test]
async fn http_client_joins_against_the_mock_store() {
    let client = serve(school_store()).await;
    let resolver = JoinResolver::new(Arc::new(client));

    let outcome = resolver
        .load(
            "etudiants",
            &[
                RelationDescriptor::one("id_utilisateur", "utilisateurs", "user"),
                RelationDescriptor::one("id_classe", "classes", "classe"),
            ],
        )
        .await
        .unwrap();

    let fatou = &outcome.records[0];
    assert_eq!(fatou.get_path("user.prenom"), Some(&json!("Fatou")));
    assert_eq!(fatou.get_path("classe.libelle"), Some(&json!("L1 Info")));
}

#[tokio::test]
async fn http_client_round_trips_writes() {
    let client = serve(school_store()).await;

    let created = client
        .create("filieres", record!({ "libelle": "Droit" }))
        .await
        .unwrap();
    let id = created.id().unwrap();
    assert_eq!(id, RecordKey::from("3"));

    let updated = client
        .update("filieres", &id, record!({ "libelle": "Droit privé" }), UpdateMode::Partial)
        .await
        .unwrap();
    assert_eq!(updated.get_str("libelle"), Some("Droit privé"));

    client.remove("filieres", &id).await.unwrap();
    client.remove("filieres", &id).await.unwrap();

    let err = client.fetch_one("filieres", &id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn desks_work_over_http() {
    let store: SharedStore = Arc::new(serve(school_store()).await);

    let desk = AttacheDesk::open(store.clone(), Actor::new("3", Role::Attache))
        .await
        .unwrap();
    let students = desk
        .students(&StudentFilter::default(), ViewOptions::default())
        .await
        .unwrap();
    assert_eq!(students.state().unwrap().total_count, 2);

    let portal = StudentPortal::open(store.clone(), Actor::new(10, Role::Etudiant))
        .await
        .unwrap();
    let outcome = portal
        .submit_justification("1", "Convocation administrative")
        .await
        .unwrap();
    assert!(outcome.refresh_errors.is_empty());

    let pending = store
        .fetch_where("justifications", &[("id_absence".to_string(), "1".to_string())])
        .await
        .unwrap();
    assert_eq!(pending.len(), 2);
}

#[tokio::test]
async fn unreachable_store_is_a_network_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let client = HttpResourceClient::new(ClientConfig::new(&format!("http://{addr}"))).unwrap();

    let err = client.fetch_collection("classes").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Network);
}

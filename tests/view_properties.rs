mod common;

use common::{GatedStore, ids, school_store, shared};
use ecole221::{
    FilterCriterion, JoinResolver, LoadOutcome, RelationDescriptor, SortKey, ViewManager, ViewOptions,
    ViewQuery, ViewSource,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn class_view(resolver: JoinResolver) -> ViewManager {
    ViewManager::new(
        "classes",
        resolver,
        ViewSource::new("classes")
            .relation(RelationDescriptor::one("id_filiere", "filieres", "filiere"))
            .relation(RelationDescriptor::many("id", "etudiants", "etudiants").on("id_classe")),
    )
}

#[tokio::test]
async fn page_beyond_range_shows_the_last_page() {
    let store = school_store();
    let view = class_view(JoinResolver::new(shared(&store)));

    let outcome = view
        .load(ViewQuery::new(Vec::new(), ViewOptions::new(100, 10)))
        .await
        .unwrap();

    let state = outcome.state().unwrap();
    assert_eq!(state.page, 1);
    assert_eq!(state.total_count, 3);
    assert_eq!(state.total_pages, 1);
    assert_eq!(state.items.len(), 3);
}

#[tokio::test]
async fn filtering_twice_gives_the_same_state() {
    let store = school_store();
    let view = class_view(JoinResolver::new(shared(&store)));
    let query = ViewQuery::new(
        vec![
            FilterCriterion::search(["libelle", "filiere.libelle"], "info"),
            FilterCriterion::not_equals("state", "archivé"),
        ],
        ViewOptions::new(1, 10).sort_by(SortKey::asc("libelle")),
    );

    let first = view.load(query.clone()).await.unwrap();
    let second = view.load(query).await.unwrap();

    assert_eq!(first.state(), second.state());
    assert_eq!(ids(&first.state().unwrap().items), vec!["5"]);
}

#[tokio::test]
async fn joined_fields_can_be_filtered_and_sorted() {
    let store = school_store();
    let view = class_view(JoinResolver::new(shared(&store)));

    let outcome = view
        .load(ViewQuery::new(
            vec![FilterCriterion::equals("filiere.libelle", "Informatique")],
            ViewOptions::new(1, 10).sort_by(SortKey::desc("libelle")),
        ))
        .await
        .unwrap();

    assert_eq!(ids(&outcome.state().unwrap().items), vec!["7", "5"]);
}

#[tokio::test]
async fn paging_reuses_the_fetched_records() {
    let store = school_store();
    let view = class_view(JoinResolver::new(shared(&store)));
    view.load(ViewQuery::new(
        Vec::new(),
        ViewOptions::new(1, 2).sort_by(SortKey::asc("libelle")),
    ))
    .await
    .unwrap();
    store.reset_counters().unwrap();

    let outcome = view.go_to_page(2).await.unwrap();

    let state = outcome.state().unwrap();
    assert_eq!(state.page, 2);
    assert_eq!(ids(&state.items), vec!["7"]);
    assert_eq!(store.request_count(), 0);
}

#[tokio::test]
async fn subscribers_are_notified_on_change_only() {
    let store = school_store();
    let view = class_view(JoinResolver::new(shared(&store)));
    let notified = Arc::new(AtomicUsize::new(0));
    let counter = notified.clone();
    view.subscribe(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    view.load(ViewQuery::default()).await.unwrap();
    view.reload().await.unwrap();
    assert_eq!(notified.load(Ordering::SeqCst), 1);

    view.set_criteria(vec![FilterCriterion::equals("state", "archivé")])
        .await
        .unwrap();
    assert_eq!(notified.load(Ordering::SeqCst), 2);
    assert_eq!(view.current().unwrap().total_count, 1);
}

#[tokio::test]
async fn stale_response_is_discarded() {
    let store = Arc::new(GatedStore::new(school_store()));
    let view = Arc::new(class_view(JoinResolver::new(store.clone())));
    let gate = store.gate("classes");

    let slow = {
        let view = view.clone();
        tokio::spawn(async move {
            view.load(ViewQuery::new(
                vec![FilterCriterion::equals("libelle", "L1 Info")],
                ViewOptions::default(),
            ))
            .await
        })
    };
    gate.entered.notified().await;

    let fast = view
        .load(ViewQuery::new(
            vec![FilterCriterion::equals("libelle", "L2 Gestion")],
            ViewOptions::default(),
        ))
        .await
        .unwrap();
    assert!(matches!(fast, LoadOutcome::Applied { .. }));

    gate.release.notify_one();
    let slow = slow.await.unwrap().unwrap();

    assert!(slow.is_superseded());
    let current = view.current().unwrap();
    assert_eq!(ids(&current.items), vec!["6"]);
    assert_eq!(
        view.query().criteria,
        vec![FilterCriterion::equals("libelle", "L2 Gestion")]
    );
}

#[tokio::test]
async fn failed_relation_is_reported_with_the_state() {
    let store = school_store();
    store.fail_collection("filieres").unwrap();
    let view = class_view(JoinResolver::new(shared(&store)));

    let outcome = view.load(ViewQuery::default()).await.unwrap();

    let LoadOutcome::Applied {
        state,
        relation_errors,
    } = outcome
    else {
        panic!("expected an applied state");
    };
    assert_eq!(state.total_count, 3);
    assert!(state.items.iter().all(|c| c.get("filiere") == Some(&json!(null))));
    assert_eq!(relation_errors.len(), 1);
    assert_eq!(view.relation_errors()[0].collection, "filieres");
}

#[tokio::test]
async fn scope_and_base_filters_restrict_what_a_view_can_show() {
    let store = school_store();
    let view = ViewManager::new(
        "absences",
        JoinResolver::new(shared(&store)),
        ViewSource::new("etudiants")
            .base_filter("id_classe", 5)
            .scope(FilterCriterion::one_of("matricule", [json!("ETU-002"), json!("ETU-003")])),
    );

    let outcome = view.load(ViewQuery::default()).await.unwrap();

    assert_eq!(ids(&outcome.state().unwrap().items), vec!["2"]);
}

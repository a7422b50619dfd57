//! School dashboard adapters built on the join, view and mutation engines.
//!
//! Each role gets one desk that owns its views and its mutation coordinator.

pub mod actor;
pub mod attache;
pub mod collections;
pub mod etudiant;
pub mod professeur;
pub mod rp;
pub mod status;
pub mod validation;

pub use actor::{Actor, Role};
pub use attache::{AttacheDesk, InscriptionFilter, JustificationFilter, StudentFilter};
pub use etudiant::{AbsenceFilter, StudentCourseFilter, StudentJustificationFilter, StudentPortal};
pub use professeur::{AbsenceMark, ProfessorCourseFilter, ProfessorDesk};
pub use rp::{
    ClassFilter, ClassRegistry, CourseFilter, CourseRegistry, DashboardStats, ProfessorFilter,
    ProfessorRegistry, dashboard_stats,
};
pub use status::{
    AbsenceJustification, ClassState, CourseStatus, EntityStatus, InscriptionStatus,
    JustificationStatus, UserState,
};
pub use validation::{ValidationRule, Validator};

use crate::client::ResourceStore;
use crate::core::{DashboardError, Record, RecordKey, Result, loose_eq};
use chrono::{SecondsFormat, Utc};
use futures::future::try_join_all;
use serde_json::Value as JsonValue;

/// The role profile (`professeurs`, `attaches`, `etudiants`) of a user.
pub(crate) async fn profile_of(
    store: &dyn ResourceStore,
    collection: &str,
    user_id: &RecordKey,
) -> Result<Record> {
    let filters = [("id_utilisateur".to_string(), user_id.to_string())];
    store
        .fetch_where(collection, &filters)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| DashboardError::NotFound {
            collection: collection.to_string(),
            id: format!("id_utilisateur={user_id}"),
        })
}

pub(crate) fn record_id(record: &Record, collection: &str) -> Result<RecordKey> {
    record
        .id()
        .ok_or_else(|| DashboardError::InvalidInput(format!("{collection} record without id")))
}

/// Non-null values of `field` across `records`, in order.
pub(crate) fn field_values(records: &[Record], field: &str) -> Vec<JsonValue> {
    records
        .iter()
        .filter_map(|r| r.get(field))
        .filter(|v| !v.is_null())
        .cloned()
        .collect()
}

/// Processing timestamp, RFC 3339 in UTC with milliseconds.
pub(crate) fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) const DEFAULT_AVATAR: &str = "https://images.pexels.com/photos/1036623/pexels-photo-1036623.jpeg?auto=compress&cs=tinysrgb&w=600";
pub(crate) const DEFAULT_PASSWORD: &str = "password123";

/// Trimmed text of a form field, empty when absent.
pub(crate) fn form_text(form: &Record, field: &str) -> String {
    form.get_str(field).map(str::trim).unwrap_or_default().to_string()
}

pub(crate) fn or_default(form: &Record, field: &str, default: &str) -> String {
    let value = form_text(form, field);
    if value.is_empty() {
        default.to_string()
    } else {
        value
    }
}

/// Label of the school year flagged `est_active`.
pub(crate) fn active_year(years: &[Record]) -> Option<JsonValue> {
    years
        .iter()
        .find(|y| y.get("est_active").is_some_and(|v| loose_eq(v, &JsonValue::from(1))))
        .and_then(|y| y.get("libelle").cloned())
}

/// Array value of a form field; anything else is an empty selection.
pub(crate) fn form_list(form: &Record, field: &str) -> Vec<JsonValue> {
    form.get(field)
        .and_then(JsonValue::as_array)
        .cloned()
        .unwrap_or_default()
}

/// Makes the `owner_field = owner` rows of a link collection point at exactly
/// `wanted`: stale links are deleted, missing ones created, the rest kept.
pub(crate) async fn sync_links(
    store: &dyn ResourceStore,
    links: &str,
    owner_field: &str,
    owner: &RecordKey,
    target_field: &str,
    wanted: &[JsonValue],
) -> Result<()> {
    let current = store
        .fetch_where(links, &[(owner_field.to_string(), owner.to_string())])
        .await?;
    let linked = |target: &JsonValue| {
        current
            .iter()
            .any(|link| link.get(target_field).is_some_and(|t| loose_eq(t, target)))
    };

    let stale: Vec<RecordKey> = current
        .iter()
        .filter(|link| {
            !link
                .get(target_field)
                .is_some_and(|t| wanted.iter().any(|w| loose_eq(w, t)))
        })
        .filter_map(Record::id)
        .collect();
    let mut missing: Vec<&JsonValue> = Vec::new();
    for target in wanted {
        if !linked(target) && !missing.iter().any(|m| loose_eq(m, target)) {
            missing.push(target);
        }
    }

    try_join_all(stale.iter().map(|id| store.remove(links, id))).await?;
    try_join_all(missing.into_iter().map(|target| {
        let link = Record::new()
            .with(owner_field, owner.to_value())
            .with(target_field, target.clone());
        store.create(links, link)
    }))
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::InMemoryStore;
    use crate::record;
    use serde_json::json;

    #[tokio::test]
    async fn sync_links_keeps_matching_rows_and_replaces_the_rest() {
        let store = InMemoryStore::new().with_collection(
            "cours_classes",
            vec![
                record!({ "id": "1", "id_cours": 1, "id_classe": "5" }),
                record!({ "id": "2", "id_cours": "1", "id_classe": "6" }),
                record!({ "id": "3", "id_cours": "2", "id_classe": "5" }),
            ],
        );

        sync_links(
            &store,
            "cours_classes",
            "id_cours",
            &RecordKey::from("1"),
            "id_classe",
            &[json!(5), json!("7"), json!(7)],
        )
        .await
        .unwrap();

        let links = store.fetch_collection("cours_classes").await.unwrap();
        let pairs: Vec<(String, String)> = links
            .iter()
            .map(|l| (l.key("id_cours").unwrap().to_string(), l.key("id_classe").unwrap().to_string()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("1".to_string(), "5".to_string()),
                ("2".to_string(), "5".to_string()),
                ("1".to_string(), "7".to_string()),
            ]
        );
    }

    #[test]
    fn active_year_is_the_flagged_one() {
        let years = vec![
            record!({ "id": 1, "libelle": "2023-2024", "est_active": 0 }),
            record!({ "id": 2, "libelle": "2024-2025", "est_active": "1" }),
        ];
        assert_eq!(active_year(&years), Some(json!("2024-2025")));
        assert_eq!(active_year(&years[..1]), None);
    }
}

use super::descriptor::{Cardinality, RelationDescriptor, validate_relations};
use super::index::KeyIndex;
use crate::client::SharedStore;
use crate::core::{
    DashboardError, DenormalizedRecord, Record, RecordKey, Result, lookup_in_map, normalize_key,
};
use futures::future::join_all;
use serde_json::{Map as JsonMap, Value as JsonValue};
use std::collections::HashMap;
use tracing::{Instrument, Level, event, info_span};

/// A target collection that could not be fetched during a join pass.
///
/// Every relation reading from it resolved to `null` / `[]`.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationError {
    pub collection: String,
    /// Result fields that were left empty.
    pub relations: Vec<String>,
    pub error: DashboardError,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct JoinOutcome {
    pub records: Vec<DenormalizedRecord>,
    pub errors: Vec<RelationError>,
}

impl JoinOutcome {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Fetched target collections keyed by name.
pub type FetchedTargets = HashMap<String, Result<Vec<Record>>>;

/// Batched join over a [`ResourceStore`](crate::client::ResourceStore).
///
/// Each distinct target collection is fetched once per pass, concurrently,
/// then indexed by its join key. Attached values are copies of the fetched
/// target records, which are never written to, so a pass cannot build cycles.
#[derive(Clone)]
pub struct JoinResolver {
    store: SharedStore,
}

impl JoinResolver {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Joins an already fetched base collection.
    pub async fn resolve(
        &self,
        base: Vec<Record>,
        relations: &[RelationDescriptor],
    ) -> Result<JoinOutcome> {
        validate_relations(relations)?;
        let fetched = self.fetch_targets(relations, None).await;
        attach_relations(base, relations, fetched)
    }

    /// Fetches `collection` and its targets concurrently, then joins.
    ///
    /// A failed base fetch is fatal; failed targets are not.
    pub async fn load(
        &self,
        collection: &str,
        relations: &[RelationDescriptor],
    ) -> Result<JoinOutcome> {
        validate_relations(relations)?;
        let span = info_span!("join.load", collection = %collection, relations = relations.len());
        async {
            let (base, mut fetched) = futures::join!(
                self.store.fetch_collection(collection),
                self.fetch_targets(relations, Some(collection))
            );
            let base = base?;
            if relations.iter().any(|r| r.target_collection == collection) {
                fetched.insert(collection.to_string(), Ok(base.clone()));
            }
            attach_relations(base, relations, fetched)
        }
        .instrument(span)
        .await
    }

    /// Same as [`JoinResolver::load`] with a filtered base fetch.
    pub async fn load_where(
        &self,
        collection: &str,
        filters: &[(String, String)],
        relations: &[RelationDescriptor],
    ) -> Result<JoinOutcome> {
        validate_relations(relations)?;
        let span = info_span!("join.load_where", collection = %collection, filters = filters.len());
        async {
            let (base, fetched) = futures::join!(
                self.store.fetch_where(collection, filters),
                self.fetch_targets(relations, None)
            );
            attach_relations(base?, relations, fetched)
        }
        .instrument(span)
        .await
    }

    /// Detail view of one record; a missing primary record is fatal.
    pub async fn load_one(
        &self,
        collection: &str,
        id: &RecordKey,
        relations: &[RelationDescriptor],
    ) -> Result<(DenormalizedRecord, Vec<RelationError>)> {
        validate_relations(relations)?;
        let (base, fetched) = futures::join!(
            self.store.fetch_one(collection, id),
            self.fetch_targets(relations, None)
        );
        let mut outcome = attach_relations(vec![base?], relations, fetched)?;
        let record = outcome
            .records
            .pop()
            .ok_or_else(|| DashboardError::not_found(collection, id))?;
        Ok((record, outcome.errors))
    }

    async fn fetch_targets(
        &self,
        relations: &[RelationDescriptor],
        skip: Option<&str>,
    ) -> FetchedTargets {
        let mut names: Vec<&str> = Vec::new();
        for relation in relations {
            let name = relation.target_collection.as_str();
            if Some(name) != skip && !names.contains(&name) {
                names.push(name);
            }
        }

        let results = join_all(names.iter().map(|name| self.store.fetch_collection(name))).await;
        names
            .into_iter()
            .map(str::to_string)
            .zip(results)
            .collect()
    }
}

/// Attaches every relation to `base`, in declaration order.
///
/// `fetched` must hold an entry for each target collection. Missing entries
/// and recoverable fetch errors leave the relation empty and are reported
/// once per collection; any other fetch error aborts the pass.
pub fn attach_relations(
    mut records: Vec<Record>,
    relations: &[RelationDescriptor],
    fetched: FetchedTargets,
) -> Result<JoinOutcome> {
    let mut targets: HashMap<String, Vec<Record>> = HashMap::new();
    let mut errors: Vec<RelationError> = Vec::new();

    for relation in relations {
        let name = &relation.target_collection;
        if targets.contains_key(name) || errors.iter().any(|e| &e.collection == name) {
            continue;
        }
        let error = match fetched.get(name) {
            Some(Ok(rows)) => {
                targets.insert(name.clone(), rows.clone());
                continue;
            }
            Some(Err(err)) if !err.is_recoverable_for_relation() => return Err(err.clone()),
            Some(Err(err)) => err.clone(),
            None => DashboardError::CollectionNotFound(name.clone()),
        };

        event!(Level::WARN, collection = %name, error = %error, "relation target unavailable");
        errors.push(RelationError {
            collection: name.clone(),
            relations: relations
                .iter()
                .filter(|r| &r.target_collection == name)
                .map(|r| r.result_field.clone())
                .collect(),
            error,
        });
    }

    let mut indexes: HashMap<(&str, &str), KeyIndex> = HashMap::new();
    for relation in relations {
        if let Some(rows) = targets.get(&relation.target_collection) {
            indexes
                .entry((relation.target_collection.as_str(), relation.target_key.as_str()))
                .or_insert_with(|| KeyIndex::build(rows, &relation.target_key));
        }
    }

    for relation in relations {
        let source = targets.get(&relation.target_collection).and_then(|rows| {
            indexes
                .get(&(relation.target_collection.as_str(), relation.target_key.as_str()))
                .map(|index| (rows.as_slice(), index))
        });
        for record in records.iter_mut() {
            attach_one(record.as_map_mut(), relation, source)?;
        }
    }

    event!(
        Level::DEBUG,
        records = records.len(),
        relations = relations.len(),
        failed = errors.len(),
        "join pass complete"
    );

    Ok(JoinOutcome { records, errors })
}

type Source<'a> = Option<(&'a [Record], &'a KeyIndex)>;

fn attach_one(
    record: &mut JsonMap<String, JsonValue>,
    relation: &RelationDescriptor,
    source: Source<'_>,
) -> Result<()> {
    let (parent, leaf) = relation.result_location();

    if parent.is_empty() {
        let keys = keys_at(record, &relation.foreign_key);
        let value = resolve_value(relation, source, &keys);
        return write_result(record, leaf, value, relation);
    }

    if let Some(relative) = relation.relative_foreign_key() {
        return for_each_parent(record, &parent, &mut |object: &mut JsonMap<String, JsonValue>| {
            let keys = keys_at(object, relative);
            let value = resolve_value(relation, source, &keys);
            write_result(object, leaf, value, relation)
        });
    }

    let keys = keys_at(record, &relation.foreign_key);
    let value = resolve_value(relation, source, &keys);
    for_each_parent(record, &parent, &mut |object: &mut JsonMap<String, JsonValue>| {
        write_result(object, leaf, value.clone(), relation)
    })
}

/// Normalized, de-duplicated foreign key values at `path`.
fn keys_at(object: &JsonMap<String, JsonValue>, path: &str) -> Vec<String> {
    let mut keys: Vec<String> = Vec::new();
    for key in lookup_in_map(object, path).into_iter().filter_map(normalize_key) {
        if !keys.contains(&key) {
            keys.push(key);
        }
    }
    keys
}

fn resolve_value(relation: &RelationDescriptor, source: Source<'_>, keys: &[String]) -> JsonValue {
    let keys = keys.iter().map(String::as_str);
    match (relation.cardinality, source) {
        (Cardinality::One, Some((rows, index))) => index
            .lookup_first(keys)
            .map(|position| rows[position].clone().into_value())
            .unwrap_or(JsonValue::Null),
        (Cardinality::Many, Some((rows, index))) => JsonValue::Array(
            index
                .lookup_all(keys)
                .into_iter()
                .map(|position| rows[position].clone().into_value())
                .collect(),
        ),
        (Cardinality::One, None) => JsonValue::Null,
        (Cardinality::Many, None) => JsonValue::Array(Vec::new()),
    }
}

fn write_result(
    object: &mut JsonMap<String, JsonValue>,
    leaf: &str,
    value: JsonValue,
    relation: &RelationDescriptor,
) -> Result<()> {
    if object.contains_key(leaf) {
        return Err(DashboardError::InvalidRelation(format!(
            "result field '{}' collides with an existing field",
            relation.result_field
        )));
    }
    object.insert(leaf.to_string(), value);
    Ok(())
}

/// Calls `f` on every object reached by `parent`; arrays are traversed and
/// anything else (including `null`) is skipped.
fn for_each_parent(
    object: &mut JsonMap<String, JsonValue>,
    parent: &[&str],
    f: &mut dyn FnMut(&mut JsonMap<String, JsonValue>) -> Result<()>,
) -> Result<()> {
    let Some((head, rest)) = parent.split_first() else {
        return f(object);
    };
    match object.get_mut(*head) {
        Some(child) => descend(child, rest, f),
        None => Ok(()),
    }
}

fn descend(
    value: &mut JsonValue,
    rest: &[&str],
    f: &mut dyn FnMut(&mut JsonMap<String, JsonValue>) -> Result<()>,
) -> Result<()> {
    match value {
        JsonValue::Object(object) => for_each_parent(object, rest, f),
        JsonValue::Array(items) => {
            for item in items {
                descend(item, rest, f)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record;
    use serde_json::json;

    fn fetched(entries: Vec<(&str, Result<Vec<Record>>)>) -> FetchedTargets {
        entries
            .into_iter()
            .map(|(name, rows)| (name.to_string(), rows))
            .collect()
    }

    #[test]
    fn chained_relations_see_earlier_results() {
        let cours = vec![record!({ "id": 1, "id_module": 3 })];
        let relations = [
            RelationDescriptor::many("id", "cours_classes", "links").on("id_cours"),
            RelationDescriptor::many("links.id_classe", "classes", "classes"),
            RelationDescriptor::one("id_module", "modules", "module"),
        ];
        let outcome = attach_relations(
            cours,
            &relations,
            fetched(vec![
                (
                    "cours_classes",
                    Ok(vec![
                        record!({ "id": 1, "id_cours": "1", "id_classe": 5 }),
                        record!({ "id": 2, "id_cours": 1, "id_classe": "6" }),
                        record!({ "id": 3, "id_cours": 2, "id_classe": 7 }),
                    ]),
                ),
                (
                    "classes",
                    Ok(vec![
                        record!({ "id": 6, "libelle": "L2" }),
                        record!({ "id": 5, "libelle": "L1" }),
                        record!({ "id": 7, "libelle": "M1" }),
                    ]),
                ),
                ("modules", Ok(vec![record!({ "id": "3", "libelle": "Algo" })])),
            ]),
        )
        .unwrap();

        let joined = &outcome.records[0];
        assert_eq!(joined.values_at("links").len(), 2);
        let labels: Vec<_> = joined
            .values_at("classes.libelle")
            .into_iter()
            .cloned()
            .collect();
        assert_eq!(labels, vec![json!("L2"), json!("L1")]);
        assert_eq!(joined.get_path("module.libelle"), Some(&json!("Algo")));
        assert!(outcome.is_complete());
    }

    #[test]
    fn nested_result_fields_resolve_relative_to_their_parent() {
        let absences = vec![
            record!({ "id": 1, "id_etudiant": 2 }),
            record!({ "id": 2, "id_etudiant": 99 }),
        ];
        let relations = [
            RelationDescriptor::one("id_etudiant", "etudiants", "student"),
            RelationDescriptor::one("student.id_utilisateur", "utilisateurs", "student.user"),
        ];
        let outcome = attach_relations(
            absences,
            &relations,
            fetched(vec![
                ("etudiants", Ok(vec![record!({ "id": 2, "id_utilisateur": 10 })])),
                ("utilisateurs", Ok(vec![record!({ "id": "10", "nom": "Ndiaye" })])),
            ]),
        )
        .unwrap();

        assert_eq!(
            outcome.records[0].get_path("student.user.nom"),
            Some(&json!("Ndiaye"))
        );
        assert_eq!(outcome.records[1].get("student"), Some(&JsonValue::Null));
    }

    #[test]
    fn collisions_are_invalid_relations() {
        let base = vec![record!({ "id": 1, "id_classe": 5, "classe": "L1" })];
        let relations = [RelationDescriptor::one("id_classe", "classes", "classe")];
        let err = attach_relations(
            base,
            &relations,
            fetched(vec![("classes", Ok(vec![record!({ "id": 5 })]))]),
        )
        .unwrap_err();
        assert!(matches!(err, DashboardError::InvalidRelation(_)));
    }

    #[test]
    fn unavailable_targets_are_reported_once() {
        let base = vec![record!({ "id": 1, "id_createur": 3, "id_utilisateur": 4 })];
        let relations = [
            RelationDescriptor::one("id_createur", "utilisateurs", "createur"),
            RelationDescriptor::one("id_utilisateur", "utilisateurs", "user"),
        ];
        let outcome = attach_relations(
            base,
            &relations,
            fetched(vec![(
                "utilisateurs",
                Err(DashboardError::http_status("GET /utilisateurs", 500)),
            )]),
        )
        .unwrap();

        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].relations, vec!["createur", "user"]);
        assert_eq!(outcome.records[0].get("user"), Some(&JsonValue::Null));
    }

    #[test]
    fn lock_errors_abort_the_pass() {
        let relations = [RelationDescriptor::many("id", "absences", "absences").on("id_etudiant")];
        let err = attach_relations(
            vec![record!({ "id": 1 })],
            &relations,
            fetched(vec![("absences", Err(DashboardError::Lock("poisoned".into())))]),
        )
        .unwrap_err();
        assert!(matches!(err, DashboardError::Lock(_)));
    }
}

use crate::client::{SharedStore, UpdateMode};
use crate::core::{DenormalizedRecord, Record, RecordKey, Result};
use crate::domain::actor::{Actor, Role};
use crate::domain::collections::{
    ANNEES_SCOLAIRES, CLASSES, CLASSES_PROFESSEUR, ETUDIANTS, FILIERES, NIVEAUX, PROFESSEURS,
    UTILISATEURS,
};
use crate::domain::status::{ClassState, EntityStatus};
use crate::domain::validation::{Validator, check_unique_class};
use crate::filter::FilterCriterion;
use crate::join::{JoinResolver, RelationDescriptor, RelationError};
use crate::mutation::{MutationCoordinator, MutationError, MutationOutcome, MutationRequest};
use crate::view::{LoadOutcome, ViewManager, ViewOptions, ViewQuery, ViewSource};
use serde_json::Value as JsonValue;
use std::sync::Arc;

/// Fields a class form may write.
const FORM_FIELDS: &[&str] = &["libelle", "id_filiere", "id_niveau", "id_annee", "capacite_max"];

/// The list shows either the active classes or the archive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassFilter {
    pub search: String,
    pub filiere: Option<JsonValue>,
    pub niveau: Option<JsonValue>,
    pub annee: Option<JsonValue>,
    pub archived: bool,
}

impl ClassFilter {
    pub fn criteria(&self) -> Vec<FilterCriterion> {
        let archived = ClassState::Archived.as_wire();
        vec![
            FilterCriterion::search(["libelle", "filiere.libelle"], &self.search),
            FilterCriterion::equals_opt("id_filiere", self.filiere.clone()),
            FilterCriterion::equals_opt("id_niveau", self.niveau.clone()),
            FilterCriterion::equals_opt("id_annee", self.annee.clone()),
            if self.archived {
                FilterCriterion::equals(ClassState::FIELD, archived)
            } else {
                FilterCriterion::not_equals(ClassState::FIELD, archived)
            },
        ]
    }
}

/// Adds `effectif` (enrolled students) and `taux_remplissage` (percent of
/// `capacite_max`, rounded; 0 without a capacity).
pub fn derive_occupancy(class: &mut Record) {
    let effectif = class
        .get("etudiants")
        .and_then(JsonValue::as_array)
        .map_or(0, Vec::len);
    let capacity = class.get("capacite_max").and_then(|c| match c {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    });
    let rate = match capacity {
        Some(capacity) if capacity > 0.0 => (effectif as f64 * 100.0 / capacity).round() as u64,
        _ => 0,
    };
    class.insert("effectif", effectif);
    class.insert("taux_remplissage", rate);
}

fn list_relations() -> Vec<RelationDescriptor> {
    vec![
        RelationDescriptor::one("id_filiere", FILIERES, "filiere"),
        RelationDescriptor::one("id_niveau", NIVEAUX, "niveau"),
        RelationDescriptor::one("id_annee", ANNEES_SCOLAIRES, "annee_scolaire"),
        RelationDescriptor::many("id", ETUDIANTS, "etudiants").on("id_classe"),
    ]
}

fn form_payload(form: &Record) -> Record {
    let mut payload = Record::new();
    for field in FORM_FIELDS {
        if let Some(value) = form.get(field) {
            let value = match value {
                JsonValue::String(s) => JsonValue::String(s.trim().to_string()),
                other => other.clone(),
            };
            payload.insert(*field, value);
        }
    }
    payload
}

/// Class management for the responsable pédagogique.
pub struct ClassRegistry {
    resolver: JoinResolver,
    view: Arc<ViewManager>,
    coordinator: MutationCoordinator,
}

impl ClassRegistry {
    pub fn new(store: SharedStore, actor: &Actor) -> Result<Self> {
        actor.require(Role::Rp)?;
        let resolver = JoinResolver::new(store.clone());
        let view = Arc::new(ViewManager::new(
            "rp.classes",
            resolver.clone(),
            ViewSource::new(CLASSES)
                .relations(list_relations())
                .derive(derive_occupancy),
        ));
        let coordinator = MutationCoordinator::new(store).refreshing(view.clone());
        Ok(Self {
            resolver,
            view,
            coordinator,
        })
    }

    pub fn view(&self) -> &Arc<ViewManager> {
        &self.view
    }

    pub fn coordinator(&self) -> &MutationCoordinator {
        &self.coordinator
    }

    pub async fn list(&self, filter: &ClassFilter, options: ViewOptions) -> Result<LoadOutcome> {
        self.view
            .load(ViewQuery::new(filter.criteria(), options))
            .await
    }

    /// One class with its students (and their user accounts) and the
    /// professors assigned to it.
    pub async fn detail(
        &self,
        id: impl Into<RecordKey>,
    ) -> Result<(DenormalizedRecord, Vec<RelationError>)> {
        let mut relations = list_relations();
        relations.extend([
            RelationDescriptor::one("etudiants.id_utilisateur", UTILISATEURS, "etudiants.user"),
            RelationDescriptor::many("id", CLASSES_PROFESSEUR, "affectations").on("id_classe"),
            RelationDescriptor::many("affectations.id_professeur", PROFESSEURS, "professeurs"),
            RelationDescriptor::one("professeurs.id_utilisateur", UTILISATEURS, "professeurs.user"),
        ]);
        let (mut class, errors) = self
            .resolver
            .load_one(CLASSES, &id.into(), &relations)
            .await?;
        derive_occupancy(&mut class);
        Ok((class, errors))
    }

    /// New classes start available.
    pub async fn create(&self, form: &Record) -> std::result::Result<MutationOutcome, MutationError> {
        let payload = form_payload(form).with(ClassState::FIELD, ClassState::Available.as_wire());
        let libelle = payload.get_str("libelle").unwrap_or_default().to_lowercase();
        let request = MutationRequest::create(CLASSES, payload).keyed(format!("libelle:{libelle}"));
        self.validate_and_submit(request, None).await
    }

    pub async fn update(
        &self,
        id: impl Into<RecordKey>,
        form: &Record,
    ) -> std::result::Result<MutationOutcome, MutationError> {
        let id = id.into();
        let request =
            MutationRequest::update(CLASSES, id.clone(), form_payload(form), UpdateMode::Partial);
        self.validate_and_submit(request, Some(&id)).await
    }

    async fn validate_and_submit(
        &self,
        request: MutationRequest,
        current: Option<&RecordKey>,
    ) -> std::result::Result<MutationOutcome, MutationError> {
        let mut errors = Validator::class_form().validate(&request.payload);
        if !errors.contains("libelle") {
            let libelle = request.payload.get_str("libelle").unwrap_or_default();
            let filiere = request
                .payload
                .get("id_filiere")
                .cloned()
                .unwrap_or(JsonValue::Null);
            let checked = check_unique_class(
                self.coordinator.store().as_ref(),
                libelle,
                &filiere,
                current,
                &mut errors,
            )
            .await;
            if let Err(source) = checked {
                return Err(MutationError { request, source });
            }
        }
        self.coordinator.submit_validated(request, errors).await
    }

    pub async fn archive(
        &self,
        id: impl Into<RecordKey>,
    ) -> std::result::Result<MutationOutcome, MutationError> {
        self.coordinator
            .submit(ClassState::Archived.transition(id, Record::new()))
            .await
    }

    pub async fn restore(
        &self,
        id: impl Into<RecordKey>,
    ) -> std::result::Result<MutationOutcome, MutationError> {
        self.coordinator
            .submit(ClassState::Available.transition(id, Record::new()))
            .await
    }

    pub async fn delete(
        &self,
        id: impl Into<RecordKey>,
    ) -> std::result::Result<MutationOutcome, MutationError> {
        self.coordinator
            .submit(MutationRequest::delete(CLASSES, id))
            .await
    }
}

use crate::client::{SharedStore, UpdateMode};
use crate::core::{Record, RecordKey, Result};
use crate::domain::actor::{Actor, Role};
use crate::domain::collections::{
    CLASSES, COURS, COURS_CLASSES, MODULES, PROFESSEURS, SEMESTRES, UTILISATEURS,
};
use crate::domain::etudiant::newest_first;
use crate::domain::{form_list, sync_links};
use crate::domain::status::{CourseStatus, EntityStatus};
use crate::domain::validation::Validator;
use crate::filter::FilterCriterion;
use crate::join::{JoinResolver, RelationDescriptor};
use crate::mutation::{MutationCoordinator, MutationError, MutationOutcome, MutationRequest};
use crate::view::{LoadOutcome, ViewManager, ViewOptions, ViewQuery, ViewSource};
use futures::future::try_join_all;
use serde_json::Value as JsonValue;
use std::sync::Arc;

const FORM_FIELDS: &[&str] = &[
    "id_module",
    "id_professeur",
    "id_semestre",
    "date_cours",
    "salle",
    "heure_debut",
    "heure_fin",
];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CourseFilter {
    /// Matches the module label or the professor's name.
    pub search: String,
    pub semestre: Option<JsonValue>,
    /// School year label, through the course's semester.
    pub annee: Option<JsonValue>,
    pub status: Option<CourseStatus>,
}

impl CourseFilter {
    pub fn criteria(&self) -> Vec<FilterCriterion> {
        let mut criteria = vec![
            FilterCriterion::search(["module.libelle", "enseignant"], &self.search),
            FilterCriterion::equals_opt("id_semestre", self.semestre.clone()),
            FilterCriterion::equals_opt("semestre.annee_scolaire", self.annee.clone()),
        ];
        criteria.extend(self.status.map(|s| s.criterion()));
        criteria
    }
}

fn form_payload(form: &Record) -> Record {
    let mut payload = Record::new();
    for field in FORM_FIELDS {
        if let Some(value) = form.get(field) {
            payload.insert(*field, value.clone());
        }
    }
    payload
}

/// `enseignant`: "Prénom Nom" of the professor's user account.
pub fn derive_professor_name(course: &mut Record) {
    let name = ["prenom", "nom"]
        .iter()
        .filter_map(|field| {
            course
                .get_path(&format!("professeur.utilisateur.{field}"))
                .and_then(JsonValue::as_str)
        })
        .collect::<Vec<_>>()
        .join(" ");
    course.insert("enseignant", name);
}

pub struct CourseRegistry {
    view: Arc<ViewManager>,
    coordinator: MutationCoordinator,
}

impl CourseRegistry {
    pub fn new(store: SharedStore, actor: &Actor) -> Result<Self> {
        actor.require(Role::Rp)?;
        let view = Arc::new(ViewManager::new(
            "rp.cours",
            JoinResolver::new(store.clone()),
            ViewSource::new(COURS)
                .relation(RelationDescriptor::one("id_module", MODULES, "module"))
                .relation(RelationDescriptor::one("id_professeur", PROFESSEURS, "professeur"))
                .relation(RelationDescriptor::one(
                    "professeur.id_utilisateur",
                    UTILISATEURS,
                    "professeur.utilisateur",
                ))
                .relation(RelationDescriptor::one("id_semestre", SEMESTRES, "semestre"))
                .relation(RelationDescriptor::many("id", COURS_CLASSES, "links").on("id_cours"))
                .relation(RelationDescriptor::many("links.id_classe", CLASSES, "classes"))
                .derive(derive_professor_name),
        ));
        let coordinator = MutationCoordinator::new(store).refreshing(view.clone());
        Ok(Self { view, coordinator })
    }

    pub fn view(&self) -> &Arc<ViewManager> {
        &self.view
    }

    pub async fn list(&self, filter: &CourseFilter, options: ViewOptions) -> Result<LoadOutcome> {
        let options = newest_first(options, "date_cours");
        self.view
            .load(ViewQuery::new(filter.criteria(), options))
            .await
    }

    /// Creates a planned course and links it to every class in `classes`.
    ///
    /// The links are written before the list refreshes. A failed link fails
    /// the request; the course itself stays stored.
    pub async fn create(&self, form: &Record) -> std::result::Result<MutationOutcome, MutationError> {
        let payload =
            form_payload(form).with(CourseStatus::FIELD, CourseStatus::Planned.as_wire());
        let classes = form_list(form, "classes");

        let errors =
            Validator::course_form().validate(&payload.clone().with("classes", classes.clone()));
        let request = MutationRequest::create(COURS, payload);
        if !errors.is_empty() {
            return self.coordinator.submit_validated(request, errors).await;
        }

        let store = self.coordinator.store().clone();
        self.coordinator
            .submit_then(request, |course| async move {
                let course_id = course
                    .as_ref()
                    .and_then(|c| c.get("id"))
                    .cloned()
                    .unwrap_or(JsonValue::Null);
                try_join_all(classes.into_iter().map(|class_id| {
                    let link = Record::new()
                        .with("id_cours", course_id.clone())
                        .with("id_classe", class_id);
                    store.create(COURS_CLASSES, link)
                }))
                .await?;
                Ok(course)
            })
            .await
    }

    /// Edits the schedule fields of a course and relinks it to exactly the
    /// classes in `classes`. The status is left as it is.
    pub async fn update(
        &self,
        id: impl Into<RecordKey>,
        form: &Record,
    ) -> std::result::Result<MutationOutcome, MutationError> {
        let id = id.into();
        let payload = form_payload(form);
        let classes = form_list(form, "classes");

        let errors =
            Validator::course_form().validate(&payload.clone().with("classes", classes.clone()));
        let request = MutationRequest::update(COURS, id.clone(), payload, UpdateMode::Partial);
        if !errors.is_empty() {
            return self.coordinator.submit_validated(request, errors).await;
        }

        let store = self.coordinator.store().clone();
        self.coordinator
            .submit_then(request, |course| async move {
                sync_links(store.as_ref(), COURS_CLASSES, "id_cours", &id, "id_classe", &classes)
                    .await?;
                Ok(course)
            })
            .await
    }

    pub async fn set_status(
        &self,
        id: impl Into<RecordKey>,
        status: CourseStatus,
    ) -> std::result::Result<MutationOutcome, MutationError> {
        self.coordinator
            .submit(status.transition(id, Record::new()))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record;

    #[test]
    fn professor_name_is_first_then_last_name() {
        let mut course = record!({
            "id": 1,
            "professeur": { "id": 2, "utilisateur": { "nom": "Ndiaye", "prenom": "Moussa" } }
        });
        derive_professor_name(&mut course);
        assert_eq!(course.get_str("enseignant"), Some("Moussa Ndiaye"));

        let mut orphan = record!({ "id": 3, "professeur": null });
        derive_professor_name(&mut orphan);
        assert_eq!(orphan.get_str("enseignant"), Some(""));
    }
}

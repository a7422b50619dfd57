use super::actor::{Actor, Role};
use super::collections::{
    ABSENCES, ATTACHES, COURS, COURS_CLASSES, ETUDIANTS, JUSTIFICATIONS, MODULES, PROFESSEURS,
    UTILISATEURS,
};
use super::status::{AbsenceJustification, EntityStatus, JustificationStatus};
use super::validation::Validator;
use super::{profile_of, record_id, timestamp};
use crate::client::SharedStore;
use crate::core::{DashboardError, Record, RecordKey, Result, loose_eq};
use crate::filter::FilterCriterion;
use crate::join::{JoinResolver, RelationDescriptor};
use crate::mutation::{MutationCoordinator, MutationError, MutationOutcome, MutationRequest};
use crate::view::{LoadOutcome, SortKey, ViewManager, ViewOptions, ViewQuery, ViewSource};
use serde_json::Value as JsonValue;
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StudentCourseFilter {
    pub semestre: Option<JsonValue>,
    pub search: String,
}

impl StudentCourseFilter {
    pub fn criteria(&self) -> Vec<FilterCriterion> {
        vec![
            FilterCriterion::equals_opt("id_semestre", self.semestre.clone()),
            FilterCriterion::search(["module.libelle", "salle"], &self.search),
        ]
    }
}

/// Date bounds are `YYYY-MM-DD`; either may be left open.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AbsenceFilter {
    pub from: Option<String>,
    pub to: Option<String>,
    pub justified: Option<AbsenceJustification>,
}

impl AbsenceFilter {
    pub fn criteria(&self) -> Vec<FilterCriterion> {
        let mut criteria = vec![FilterCriterion::range(
            "date_absence",
            self.from.clone().map(JsonValue::String),
            self.to.clone().map(JsonValue::String),
        )];
        criteria.extend(self.justified.map(|j| j.criterion()));
        criteria
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StudentJustificationFilter {
    pub status: Option<JustificationStatus>,
    pub from: Option<String>,
    pub to: Option<String>,
}

impl StudentJustificationFilter {
    pub fn criteria(&self) -> Vec<FilterCriterion> {
        let mut criteria = vec![FilterCriterion::range(
            "date_justification",
            self.from.clone().map(JsonValue::String),
            self.to.clone().map(JsonValue::String),
        )];
        criteria.extend(self.status.map(|s| s.criterion()));
        criteria
    }
}

/// Most recent first unless the caller chose an order.
pub(crate) fn newest_first(mut options: ViewOptions, field: &str) -> ViewOptions {
    if options.sort.is_empty() {
        options.sort.push(SortKey::desc(field));
    }
    options
}

/// Student space: timetable of the student's class, own absences and
/// justification requests.
pub struct StudentPortal {
    actor: Actor,
    student: Record,
    courses: Arc<ViewManager>,
    absences: Arc<ViewManager>,
    justifications: Arc<ViewManager>,
    coordinator: MutationCoordinator,
}

impl StudentPortal {
    pub async fn open(store: SharedStore, actor: Actor) -> Result<Self> {
        actor.require(Role::Etudiant)?;
        let student = profile_of(store.as_ref(), ETUDIANTS, &actor.user_id).await?;
        let student_id = record_id(&student, ETUDIANTS)?;
        let class_id = student.get("id_classe").cloned().unwrap_or(JsonValue::Null);

        let resolver = JoinResolver::new(store.clone());
        let courses = Arc::new(ViewManager::new(
            "etudiant.cours",
            resolver.clone(),
            ViewSource::new(COURS)
                .relation(RelationDescriptor::many("id", COURS_CLASSES, "links").on("id_cours"))
                .relation(RelationDescriptor::one("id_module", MODULES, "module"))
                .relation(RelationDescriptor::one("id_professeur", PROFESSEURS, "professeur"))
                .relation(RelationDescriptor::one(
                    "professeur.id_utilisateur",
                    UTILISATEURS,
                    "professeur.user",
                ))
                // A student without a class sees no course.
                .scope(FilterCriterion::one_of(
                    "links.id_classe",
                    Some(class_id).filter(|c| !c.is_null()),
                )),
        ));
        let absences = Arc::new(ViewManager::new(
            "etudiant.absences",
            resolver.clone(),
            ViewSource::new(ABSENCES)
                .base_filter("id_etudiant", &student_id)
                .relation(RelationDescriptor::one("id_cours", COURS, "cours"))
                .relation(RelationDescriptor::one("cours.id_module", MODULES, "module"))
                .relation(RelationDescriptor::one("id", JUSTIFICATIONS, "justification").on("id_absence")),
        ));
        let justifications = Arc::new(ViewManager::new(
            "etudiant.justifications",
            resolver,
            ViewSource::new(JUSTIFICATIONS)
                .base_filter("id_etudiant", &student_id)
                .relation(RelationDescriptor::one("id_absence", ABSENCES, "absence"))
                .relation(RelationDescriptor::one("absence.id_cours", COURS, "cours"))
                .relation(RelationDescriptor::one("cours.id_module", MODULES, "module"))
                .relation(RelationDescriptor::one("id_traitant", ATTACHES, "traitant"))
                .relation(RelationDescriptor::one(
                    "traitant.id_utilisateur",
                    UTILISATEURS,
                    "traitant.user",
                )),
        ));
        let coordinator = MutationCoordinator::new(store)
            .refreshing(absences.clone())
            .refreshing(justifications.clone());

        Ok(Self {
            actor,
            student,
            courses,
            absences,
            justifications,
            coordinator,
        })
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    pub fn student(&self) -> &Record {
        &self.student
    }

    pub fn courses_view(&self) -> &Arc<ViewManager> {
        &self.courses
    }

    pub fn absences_view(&self) -> &Arc<ViewManager> {
        &self.absences
    }

    pub fn justifications_view(&self) -> &Arc<ViewManager> {
        &self.justifications
    }

    pub async fn courses(
        &self,
        filter: &StudentCourseFilter,
        options: ViewOptions,
    ) -> Result<LoadOutcome> {
        let options = newest_first(options, "date_cours");
        self.courses
            .load(ViewQuery::new(filter.criteria(), options))
            .await
    }

    pub async fn absences(&self, filter: &AbsenceFilter, options: ViewOptions) -> Result<LoadOutcome> {
        let options = newest_first(options, "date_absence");
        self.absences
            .load(ViewQuery::new(filter.criteria(), options))
            .await
    }

    pub async fn justifications(
        &self,
        filter: &StudentJustificationFilter,
        options: ViewOptions,
    ) -> Result<LoadOutcome> {
        let options = newest_first(options, "date_justification");
        self.justifications
            .load(ViewQuery::new(filter.criteria(), options))
            .await
    }

    /// Files a justification for one of the student's own absences.
    ///
    /// Two submissions for the same absence cannot be in flight together.
    pub async fn submit_justification(
        &self,
        absence_id: impl Into<RecordKey>,
        motif: &str,
    ) -> std::result::Result<MutationOutcome, MutationError> {
        let absence_id = absence_id.into();
        let payload = Record::new()
            .with("id_absence", absence_id.to_value())
            .with("id_etudiant", self.student.get("id").cloned().unwrap_or(JsonValue::Null))
            .with("motif", motif.trim())
            .with("date_justification", timestamp())
            .with(
                JustificationStatus::FIELD,
                JustificationStatus::Pending.as_wire(),
            );
        let request =
            MutationRequest::create(JUSTIFICATIONS, payload).keyed(absence_id.clone());

        let errors = Validator::justification_form().validate(&request.payload);
        if !errors.is_empty() {
            return self.coordinator.submit_validated(request, errors).await;
        }
        if let Err(source) = self.check_owns_absence(&absence_id).await {
            return Err(MutationError { request, source });
        }
        self.coordinator.submit(request).await
    }

    async fn check_owns_absence(&self, absence_id: &RecordKey) -> Result<()> {
        let absence = self
            .coordinator
            .store()
            .fetch_one(ABSENCES, absence_id)
            .await?;
        let owner = absence.get("id_etudiant").cloned().unwrap_or(JsonValue::Null);
        let own = self.student.get("id").is_some_and(|id| loose_eq(id, &owner));
        if own {
            Ok(())
        } else {
            Err(DashboardError::Forbidden(format!(
                "absence '{absence_id}' does not belong to student '{}'",
                self.actor.user_id
            )))
        }
    }
}

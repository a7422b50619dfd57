use super::actor::{Actor, Role};
use super::collections::{
    ABSENCES, ANNEES_SCOLAIRES, ATTACHES, CLASSES, CLASSES_ATTACHES, COURS, ETUDIANTS,
    INSCRIPTIONS, JUSTIFICATIONS, MODULES, UTILISATEURS,
};
use super::status::{EntityStatus, InscriptionStatus, JustificationStatus, UserState};
use super::validation::{Validator, check_unique_email, check_unique_matricule};
use super::{
    DEFAULT_AVATAR, DEFAULT_PASSWORD, active_year, field_values, form_text, or_default,
    profile_of, record_id, timestamp,
};
use crate::client::SharedStore;
use crate::core::{DashboardError, FieldErrors, Record, RecordKey, Result, loose_eq};
use crate::filter::{FilterCriterion, FilterOperator};
use crate::join::{JoinResolver, RelationDescriptor};
use crate::mutation::{MutationCoordinator, MutationError, MutationOutcome, MutationRequest};
use crate::view::{LoadOutcome, ViewManager, ViewOptions, ViewQuery, ViewSource};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::{Level, event};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StudentFilter {
    pub search: String,
    pub classe: Option<JsonValue>,
}

impl StudentFilter {
    pub fn criteria(&self) -> Vec<FilterCriterion> {
        vec![
            FilterCriterion::search(["user.nom", "user.prenom", "matricule"], &self.search),
            FilterCriterion::equals_opt("id_classe", self.classe.clone()),
        ]
    }
}

/// Justification queue filter; shows pending requests unless told otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct JustificationFilter {
    pub status: Option<JustificationStatus>,
    pub search: String,
}

impl Default for JustificationFilter {
    fn default() -> Self {
        Self {
            status: Some(JustificationStatus::Pending),
            search: String::new(),
        }
    }
}

impl JustificationFilter {
    pub fn criteria(&self) -> Vec<FilterCriterion> {
        let mut criteria = vec![FilterCriterion::search(
            ["etudiant.user.nom", "etudiant.user.prenom", "etudiant.matricule"],
            &self.search,
        )];
        criteria.extend(self.status.map(|s| s.criterion()));
        criteria
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InscriptionFilter {
    pub status: Option<InscriptionStatus>,
    pub classe: Option<JsonValue>,
}

impl InscriptionFilter {
    pub fn criteria(&self) -> Vec<FilterCriterion> {
        let mut criteria = vec![FilterCriterion::equals_opt("id_classe", self.classe.clone())];
        criteria.extend(self.status.map(|s| s.criterion()));
        criteria
    }
}

fn assigned_to(fields: &[&str], class_ids: &[JsonValue]) -> FilterCriterion {
    FilterCriterion {
        fields: fields.iter().map(|f| f.to_string()).collect(),
        operator: FilterOperator::OneOf {
            values: class_ids.to_vec(),
        },
    }
}

/// Attaché workspace: students, absence justifications and enrollments of
/// the classes the attaché is assigned to.
pub struct AttacheDesk {
    actor: Actor,
    attache: Record,
    class_ids: Vec<JsonValue>,
    students: Arc<ViewManager>,
    justifications: Arc<ViewManager>,
    inscriptions: Arc<ViewManager>,
    coordinator: MutationCoordinator,
}

impl AttacheDesk {
    pub async fn open(store: SharedStore, actor: Actor) -> Result<Self> {
        actor.require(Role::Attache)?;
        let attache = profile_of(store.as_ref(), ATTACHES, &actor.user_id).await?;
        let attache_id = record_id(&attache, ATTACHES)?;
        let links = store
            .fetch_where(CLASSES_ATTACHES, &[("id_attache".to_string(), attache_id.to_string())])
            .await?;
        let class_ids = field_values(&links, "id_classe");
        event!(
            Level::DEBUG,
            attache = %attache_id,
            classes = class_ids.len(),
            "attaché desk opened"
        );

        let resolver = JoinResolver::new(store.clone());
        let students = Arc::new(ViewManager::new(
            "attache.etudiants",
            resolver.clone(),
            ViewSource::new(ETUDIANTS)
                .relation(RelationDescriptor::one("id_utilisateur", UTILISATEURS, "user"))
                .relation(RelationDescriptor::one("id_classe", CLASSES, "classe"))
                .scope(assigned_to(&["id_classe"], &class_ids)),
        ));
        let justifications = Arc::new(ViewManager::new(
            "attache.justifications",
            resolver.clone(),
            ViewSource::new(JUSTIFICATIONS)
                .relation(RelationDescriptor::one("id_absence", ABSENCES, "absence"))
                .relation(RelationDescriptor::one("absence.id_etudiant", ETUDIANTS, "etudiant"))
                .relation(RelationDescriptor::one("etudiant.id_utilisateur", UTILISATEURS, "etudiant.user"))
                .relation(RelationDescriptor::one("absence.id_cours", COURS, "cours"))
                .relation(RelationDescriptor::one("cours.id_module", MODULES, "module"))
                .scope(assigned_to(&["absence.id_classe", "etudiant.id_classe"], &class_ids)),
        ));
        let inscriptions = Arc::new(ViewManager::new(
            "attache.inscriptions",
            resolver,
            ViewSource::new(INSCRIPTIONS)
                .relation(RelationDescriptor::one("id_etudiant", ETUDIANTS, "etudiant"))
                .relation(RelationDescriptor::one("etudiant.id_utilisateur", UTILISATEURS, "etudiant.user"))
                .relation(RelationDescriptor::one("id_classe", CLASSES, "classe"))
                .scope(assigned_to(&["id_classe"], &class_ids)),
        ));
        let coordinator = MutationCoordinator::new(store)
            .refreshing(students.clone())
            .refreshing(justifications.clone())
            .refreshing(inscriptions.clone());

        Ok(Self {
            actor,
            attache,
            class_ids,
            students,
            justifications,
            inscriptions,
            coordinator,
        })
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    pub fn attache(&self) -> &Record {
        &self.attache
    }

    pub fn class_ids(&self) -> &[JsonValue] {
        &self.class_ids
    }

    pub fn students_view(&self) -> &Arc<ViewManager> {
        &self.students
    }

    pub fn justifications_view(&self) -> &Arc<ViewManager> {
        &self.justifications
    }

    pub fn inscriptions_view(&self) -> &Arc<ViewManager> {
        &self.inscriptions
    }

    pub fn coordinator(&self) -> &MutationCoordinator {
        &self.coordinator
    }

    pub async fn students(&self, filter: &StudentFilter, options: ViewOptions) -> Result<LoadOutcome> {
        self.students
            .load(ViewQuery::new(filter.criteria(), options))
            .await
    }

    pub async fn justifications(
        &self,
        filter: &JustificationFilter,
        options: ViewOptions,
    ) -> Result<LoadOutcome> {
        self.justifications
            .load(ViewQuery::new(filter.criteria(), options))
            .await
    }

    pub async fn inscriptions(
        &self,
        filter: &InscriptionFilter,
        options: ViewOptions,
    ) -> Result<LoadOutcome> {
        self.inscriptions
            .load(ViewQuery::new(filter.criteria(), options))
            .await
    }

    /// Accepts or refuses a justification, stamping who processed it and when.
    pub async fn process_justification(
        &self,
        id: impl Into<RecordKey>,
        decision: JustificationStatus,
        comment: &str,
    ) -> std::result::Result<MutationOutcome, MutationError> {
        let extra = Record::new()
            .with("commentaire_traitement", comment.trim())
            .with("id_traitant", self.attache.get("id").cloned().unwrap_or(JsonValue::Null))
            .with("date_traitement", timestamp());
        let request = decision.transition(id, extra);
        if decision == JustificationStatus::Pending {
            return Err(MutationError {
                request,
                source: DashboardError::InvalidInput(
                    "a justification can only be accepted or refused".to_string(),
                ),
            });
        }
        self.coordinator.submit(request).await
    }

    pub async fn process_inscription(
        &self,
        id: impl Into<RecordKey>,
        decision: InscriptionStatus,
    ) -> std::result::Result<MutationOutcome, MutationError> {
        let request = decision.transition(id, Record::new());
        if decision == InscriptionStatus::Pending {
            return Err(MutationError {
                request,
                source: DashboardError::InvalidInput(
                    "an inscription can only be validated or rejected".to_string(),
                ),
            });
        }
        self.coordinator.submit(request).await
    }

    /// Enrolls a new student in one of the attaché's classes: the user
    /// account, the student profile, then a pending inscription for the
    /// active school year. The outcome carries the student record.
    ///
    /// Email and matricule must be unused. The writes are sequential and a
    /// failure leaves the earlier ones in place.
    pub async fn enroll(&self, form: &Record) -> std::result::Result<MutationOutcome, MutationError> {
        let email = form_text(form, "email").to_lowercase();
        let matricule = form_text(form, "matricule");
        let class_id = form.get("classe_id").cloned().unwrap_or(JsonValue::Null);
        let user = Record::new()
            .with("nom", form_text(form, "nom"))
            .with("prenom", form_text(form, "prenom"))
            .with("email", email.clone())
            .with("telephone", form_text(form, "telephone"))
            .with("adresse", form_text(form, "adresse"))
            .with("id_role", Role::Etudiant.id().to_string())
            .with("avatar", or_default(form, "avatar", DEFAULT_AVATAR))
            .with(UserState::FIELD, UserState::Available.as_wire())
            .with("password", or_default(form, "password", DEFAULT_PASSWORD));
        let request = MutationRequest::create(UTILISATEURS, user)
            .keyed(format!("matricule:{}", matricule.to_lowercase()));

        let mut errors = Validator::enrollment_form().validate(form);
        if !errors.contains("classe_id") && !self.class_ids.iter().any(|id| loose_eq(id, &class_id)) {
            errors.add("classe_id", "Cette classe ne vous est pas attribuée");
        }
        let year = match self.enrollment_checks(&email, &matricule, &mut errors).await {
            Ok(year) => year,
            Err(source) => return Err(MutationError { request, source }),
        };
        if !errors.is_empty() {
            return self.coordinator.submit_validated(request, errors).await;
        }
        let Some(year) = year else {
            return Err(MutationError {
                request,
                source: DashboardError::InvalidInput("no active school year".to_string()),
            });
        };

        let store = self.coordinator.store().clone();
        self.coordinator
            .submit_then(request, |user| async move {
                let user_id = user
                    .as_ref()
                    .and_then(|u| u.get("id"))
                    .cloned()
                    .ok_or_else(|| {
                        DashboardError::InvalidInput("created user has no id".to_string())
                    })?;
                let student = store
                    .create(
                        ETUDIANTS,
                        Record::new()
                            .with("id_utilisateur", user_id)
                            .with("matricule", matricule)
                            .with("id_classe", class_id.clone()),
                    )
                    .await?;
                let inscription = Record::new()
                    .with("id_etudiant", student.get("id").cloned().unwrap_or(JsonValue::Null))
                    .with("id_classe", class_id)
                    .with("annee_scolaire", year)
                    .with("date_inscription", timestamp())
                    .with(InscriptionStatus::FIELD, InscriptionStatus::Pending.as_wire());
                store.create(INSCRIPTIONS, inscription).await?;
                Ok(Some(student))
            })
            .await
    }

    /// Store-backed enrollment checks; returns the active school year label.
    async fn enrollment_checks(
        &self,
        email: &str,
        matricule: &str,
        errors: &mut FieldErrors,
    ) -> Result<Option<JsonValue>> {
        let store = self.coordinator.store().as_ref();
        if !errors.contains("email") {
            check_unique_email(store, email, None, errors).await?;
        }
        if !errors.contains("matricule") {
            check_unique_matricule(store, matricule, errors).await?;
        }
        Ok(active_year(&store.fetch_collection(ANNEES_SCOLAIRES).await?))
    }
}

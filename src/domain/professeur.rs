use super::actor::{Actor, Role};
use super::collections::{
    ABSENCES, ANNEES_SCOLAIRES, CLASSES, COURS, COURS_CLASSES, ETUDIANTS, INSCRIPTIONS, MODULES,
    PROFESSEURS, SEMESTRES, UTILISATEURS,
};
use super::etudiant::newest_first;
use super::status::{AbsenceJustification, CourseStatus, EntityStatus, InscriptionStatus};
use super::{active_year, field_values, profile_of, record_id};
use crate::client::SharedStore;
use crate::core::{DashboardError, DenormalizedRecord, Record, RecordKey, Result, loose_eq};
use crate::filter::FilterCriterion;
use crate::join::{JoinResolver, RelationDescriptor};
use crate::mutation::{MutationCoordinator, MutationError, MutationOutcome, MutationRequest};
use crate::view::{LoadOutcome, SortKey, ViewManager, ViewOptions, ViewQuery, ViewSource, sort_records};
use chrono::Utc;
use futures::future::join_all;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::{Level, event};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfessorCourseFilter {
    pub status: Option<CourseStatus>,
    pub semestre: Option<JsonValue>,
    pub search: String,
}

impl ProfessorCourseFilter {
    pub fn criteria(&self) -> Vec<FilterCriterion> {
        let mut criteria = vec![
            FilterCriterion::equals_opt("id_semestre", self.semestre.clone()),
            FilterCriterion::search(["module.libelle", "classes.libelle", "salle"], &self.search),
        ];
        criteria.extend(self.status.map(|s| s.criterion()));
        criteria
    }
}

/// Attendance of one student in a roll call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbsenceMark {
    pub student_id: RecordKey,
    pub present: bool,
    pub justified: bool,
}

impl AbsenceMark {
    pub fn absent(student_id: impl Into<RecordKey>) -> Self {
        Self {
            student_id: student_id.into(),
            present: false,
            justified: false,
        }
    }

    pub fn present(student_id: impl Into<RecordKey>) -> Self {
        Self {
            present: true,
            ..Self::absent(student_id)
        }
    }

    pub fn justified(mut self) -> Self {
        self.justified = true;
        self
    }
}

pub struct ProfessorDesk {
    actor: Actor,
    professor: Record,
    resolver: JoinResolver,
    courses: Arc<ViewManager>,
    coordinator: MutationCoordinator,
    roll_calls: MutationCoordinator,
}

impl ProfessorDesk {
    pub async fn open(store: SharedStore, actor: Actor) -> Result<Self> {
        actor.require(Role::Professeur)?;
        let professor = profile_of(store.as_ref(), PROFESSEURS, &actor.user_id).await?;
        let professor_id = record_id(&professor, PROFESSEURS)?;

        let resolver = JoinResolver::new(store.clone());
        let courses = Arc::new(ViewManager::new(
            "professeur.cours",
            resolver.clone(),
            ViewSource::new(COURS)
                .base_filter("id_professeur", &professor_id)
                .relation(RelationDescriptor::one("id_module", MODULES, "module"))
                .relation(RelationDescriptor::one("id_semestre", SEMESTRES, "semestre"))
                .relation(RelationDescriptor::many("id", COURS_CLASSES, "links").on("id_cours"))
                .relation(RelationDescriptor::many("links.id_classe", CLASSES, "classes")),
        ));
        let coordinator = MutationCoordinator::new(store.clone()).refreshing(courses.clone());
        let roll_calls = MutationCoordinator::new(store);

        Ok(Self {
            actor,
            professor,
            resolver,
            courses,
            coordinator,
            roll_calls,
        })
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    pub fn professor(&self) -> &Record {
        &self.professor
    }

    pub fn courses_view(&self) -> &Arc<ViewManager> {
        &self.courses
    }

    pub async fn courses(
        &self,
        filter: &ProfessorCourseFilter,
        options: ViewOptions,
    ) -> Result<LoadOutcome> {
        let options = newest_first(options, "date_cours");
        self.courses
            .load(ViewQuery::new(filter.criteria(), options))
            .await
    }

    /// Students of the course's classes holding a validated inscription for
    /// the active school year, sorted by name. Each carries `user` and the
    /// matching `inscription`.
    pub async fn roster(&self, course_id: impl Into<RecordKey>) -> Result<Vec<DenormalizedRecord>> {
        let course_id = course_id.into();
        let store = self.resolver.store();
        let link_filter = [("id_cours".to_string(), course_id.to_string())];
        let relations = [
            RelationDescriptor::one("id_utilisateur", UTILISATEURS, "user"),
            RelationDescriptor::many("id", INSCRIPTIONS, "inscriptions").on("id_etudiant"),
        ];
        let (links, years, students) = futures::try_join!(
            store.fetch_where(COURS_CLASSES, &link_filter),
            store.fetch_collection(ANNEES_SCOLAIRES),
            self.resolver.load(ETUDIANTS, &relations)
        )?;

        let Some(active_year) = active_year(&years) else {
            event!(Level::WARN, course = %course_id, "no active school year, empty roster");
            return Ok(Vec::new());
        };
        let class_ids = field_values(&links, "id_classe");

        let mut roster: Vec<DenormalizedRecord> = students
            .records
            .into_iter()
            .filter(|s| {
                s.get("id_classe")
                    .is_some_and(|c| class_ids.iter().any(|id| loose_eq(id, c)))
            })
            .filter_map(|mut student| {
                let inscriptions = student.remove("inscriptions")?;
                let inscription = inscriptions.as_array()?.iter().find(|i| {
                    i.get("annee_scolaire")
                        .is_some_and(|year| loose_eq(year, &active_year))
                })?;
                let validated = inscription
                    .get(InscriptionStatus::FIELD)
                    .and_then(JsonValue::as_str)
                    .and_then(InscriptionStatus::from_wire)
                    == Some(InscriptionStatus::Validated);
                if !validated {
                    return None;
                }
                student.insert("inscription", inscription.clone());
                Some(student)
            })
            .collect();
        sort_records(&mut roster, &[SortKey::asc("user.nom"), SortKey::asc("user.prenom")]);
        Ok(roster)
    }

    /// Records one absence per absent student, concurrently.
    ///
    /// Present students are skipped. Each absence is keyed by course and
    /// student: a second roll call for the same student conflicts while the
    /// first is still in flight. Once it has settled, submitting again records
    /// another absence. Results come back in the order of `marks` minus the
    /// present ones.
    pub async fn mark_absences(
        &self,
        course_id: impl Into<RecordKey>,
        marks: &[AbsenceMark],
    ) -> Result<Vec<std::result::Result<MutationOutcome, MutationError>>> {
        let course_id = course_id.into();
        self.check_owns_course(&course_id).await?;

        let now = Utc::now();
        let date_absence = now.format("%Y-%m-%d").to_string();
        let heure_marquage = now.format("%Y-%m-%d %H:%M:%S").to_string();
        let marker = self.professor.get("id").cloned().unwrap_or(JsonValue::Null);

        let requests = marks.iter().filter(|m| !m.present).map(|mark| {
            let payload = Record::new()
                .with("id_etudiant", mark.student_id.to_value())
                .with("id_cours", course_id.to_value())
                .with("date_absence", date_absence.clone())
                .with("heure_marquage", heure_marquage.clone())
                .with("id_marqueur", marker.clone())
                .with(
                    AbsenceJustification::FIELD,
                    AbsenceJustification::from_flag(mark.justified).as_wire(),
                );
            MutationRequest::create(ABSENCES, payload)
                .keyed(format!("{course_id}:{}", mark.student_id))
        });
        let results = join_all(requests.map(|request| self.roll_calls.submit(request))).await;
        event!(
            Level::INFO,
            course = %course_id,
            absent = results.len(),
            failed = results.iter().filter(|r| r.is_err()).count(),
            "roll call recorded"
        );
        Ok(results)
    }

    pub async fn set_course_status(
        &self,
        course_id: impl Into<RecordKey>,
        status: CourseStatus,
    ) -> std::result::Result<MutationOutcome, MutationError> {
        let course_id = course_id.into();
        let request = status.transition(course_id.clone(), Record::new());
        if let Err(source) = self.check_owns_course(&course_id).await {
            return Err(MutationError { request, source });
        }
        self.coordinator.submit(request).await
    }

    async fn check_owns_course(&self, course_id: &RecordKey) -> Result<()> {
        let course = self.resolver.store().fetch_one(COURS, course_id).await?;
        let owner = course.get("id_professeur").cloned().unwrap_or(JsonValue::Null);
        if self.professor.get("id").is_some_and(|id| loose_eq(id, &owner)) {
            Ok(())
        } else {
            Err(DashboardError::Forbidden(format!(
                "course '{course_id}' is not taught by user '{}'",
                self.actor.user_id
            )))
        }
    }
}

use crate::client::{SharedStore, UpdateMode};
use crate::core::{DashboardError, DenormalizedRecord, Record, RecordKey, Result};
use crate::domain::actor::{Actor, Role};
use crate::domain::collections::{
    CLASSES, CLASSES_PROFESSEUR, COURS, MODULES, PROFESSEURS, UTILISATEURS,
};
use crate::domain::status::{EntityStatus, UserState};
use crate::domain::validation::{Validator, check_unique_email};
use crate::domain::{
    DEFAULT_AVATAR, DEFAULT_PASSWORD, form_list, form_text as text, or_default, sync_links,
};
use crate::filter::FilterCriterion;
use crate::join::{JoinResolver, RelationDescriptor, RelationError};
use crate::mutation::{MutationCoordinator, MutationError, MutationOutcome, MutationRequest};
use crate::view::{LoadOutcome, ViewManager, ViewOptions, ViewQuery, ViewSource};
use futures::future::try_join_all;
use serde_json::Value as JsonValue;
use std::sync::Arc;

const DEFAULT_ADDRESS: &str = "Non spécifié";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfessorFilter {
    /// Matches last name, first name or email.
    pub search: String,
    pub state: Option<UserState>,
}

impl ProfessorFilter {
    pub fn criteria(&self) -> Vec<FilterCriterion> {
        let mut criteria = vec![FilterCriterion::search(
            ["utilisateur.nom", "utilisateur.prenom", "utilisateur.email"],
            &self.search,
        )];
        if let Some(state) = self.state {
            criteria.push(FilterCriterion::equals(
                &format!("utilisateur.{}", UserState::FIELD),
                state.as_wire(),
            ));
        }
        criteria
    }
}

/// Professor accounts: a `utilisateurs` row with role 2, a `professeurs`
/// row pointing at it, and one `classes_professeur` row per class.
pub struct ProfessorRegistry {
    resolver: JoinResolver,
    view: Arc<ViewManager>,
    coordinator: MutationCoordinator,
}

impl ProfessorRegistry {
    pub fn new(store: SharedStore, actor: &Actor) -> Result<Self> {
        actor.require(Role::Rp)?;
        let resolver = JoinResolver::new(store.clone());
        let view = Arc::new(ViewManager::new(
            "rp.professeurs",
            resolver.clone(),
            ViewSource::new(PROFESSEURS)
                .relation(RelationDescriptor::one("id_utilisateur", UTILISATEURS, "utilisateur"))
                .relation(
                    RelationDescriptor::many("id", CLASSES_PROFESSEUR, "affectations")
                        .on("id_professeur"),
                )
                .relation(RelationDescriptor::many("affectations.id_classe", CLASSES, "classes")),
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

    pub async fn list(&self, filter: &ProfessorFilter, options: ViewOptions) -> Result<LoadOutcome> {
        self.view
            .load(ViewQuery::new(filter.criteria(), options))
            .await
    }

    /// Creates the user account, then the professor, then the class
    /// assignments. The outcome carries the professor record.
    pub async fn create(&self, form: &Record) -> std::result::Result<MutationOutcome, MutationError> {
        let email = text(form, "email").to_lowercase();
        let user = Record::new()
            .with("nom", text(form, "nom"))
            .with("prenom", text(form, "prenom"))
            .with("email", email.clone())
            .with("telephone", text(form, "telephone"))
            .with("id_role", Role::Professeur.id().to_string())
            .with("avatar", or_default(form, "avatar", DEFAULT_AVATAR))
            .with("adresse", or_default(form, "adresse", DEFAULT_ADDRESS))
            .with(UserState::FIELD, UserState::Available.as_wire())
            .with("password", or_default(form, "password", DEFAULT_PASSWORD));
        let request = MutationRequest::create(UTILISATEURS, user).keyed(format!("email:{email}"));

        let mut errors = Validator::professor_form().validate(form);
        if !errors.contains("email") {
            let checked =
                check_unique_email(self.coordinator.store().as_ref(), &email, None, &mut errors)
                    .await;
            if let Err(source) = checked {
                return Err(MutationError { request, source });
            }
        }
        if !errors.is_empty() {
            return self.coordinator.submit_validated(request, errors).await;
        }

        let professor = Record::new()
            .with("specialite", text(form, "specialite"))
            .with("grade", text(form, "grade"))
            .with("date_embauche", text(form, "date_embauche"));
        let classes = form_list(form, "classes");
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
                let professor = store
                    .create(PROFESSEURS, professor.with("id_utilisateur", user_id))
                    .await?;
                let professor_id = professor.get("id").cloned().unwrap_or(JsonValue::Null);
                try_join_all(classes.into_iter().map(|class_id| {
                    let link = Record::new()
                        .with("id_professeur", professor_id.clone())
                        .with("id_classe", class_id);
                    store.create(CLASSES_PROFESSEUR, link)
                }))
                .await?;
                Ok(Some(professor))
            })
            .await
    }

    /// One professor with the user account, the assigned classes and the
    /// courses they teach (each with its module).
    pub async fn detail(
        &self,
        id: impl Into<RecordKey>,
    ) -> Result<(DenormalizedRecord, Vec<RelationError>)> {
        let relations = [
            RelationDescriptor::one("id_utilisateur", UTILISATEURS, "utilisateur"),
            RelationDescriptor::many("id", CLASSES_PROFESSEUR, "affectations").on("id_professeur"),
            RelationDescriptor::many("affectations.id_classe", CLASSES, "classes"),
            RelationDescriptor::many("id", COURS, "cours").on("id_professeur"),
            RelationDescriptor::one("cours.id_module", MODULES, "cours.module"),
        ];
        self.resolver
            .load_one(PROFESSEURS, &id.into(), &relations)
            .await
    }

    /// Edits the professor and the user account behind it, then relinks the
    /// professor to exactly the classes in `classes`.
    ///
    /// The email stays unique across accounts other than the professor's own.
    /// Blank address and avatar keep their stored values. The outcome carries
    /// the professor record.
    pub async fn update(
        &self,
        professor_id: impl Into<RecordKey>,
        form: &Record,
    ) -> std::result::Result<MutationOutcome, MutationError> {
        let professor_id = professor_id.into();
        let store = self.coordinator.store().clone();
        let email = text(form, "email").to_lowercase();
        let changes = Record::new()
            .with("specialite", text(form, "specialite"))
            .with("grade", text(form, "grade"));
        let request =
            MutationRequest::update(PROFESSEURS, professor_id.clone(), changes, UpdateMode::Partial);

        let user_id = match store.fetch_one(PROFESSEURS, &professor_id).await {
            Ok(professor) => match professor.key("id_utilisateur") {
                Some(user_id) => user_id,
                None => {
                    return Err(MutationError {
                        request,
                        source: DashboardError::InvalidInput(format!(
                            "professor '{professor_id}' has no user account"
                        )),
                    });
                }
            },
            Err(source) => return Err(MutationError { request, source }),
        };

        let mut errors = Validator::professor_form().validate(form);
        if !errors.contains("email") {
            let checked =
                check_unique_email(store.as_ref(), &email, Some(&user_id), &mut errors).await;
            if let Err(source) = checked {
                return Err(MutationError { request, source });
            }
        }
        if !errors.is_empty() {
            return self.coordinator.submit_validated(request, errors).await;
        }

        let mut account = Record::new()
            .with("nom", text(form, "nom"))
            .with("prenom", text(form, "prenom"))
            .with("email", email)
            .with("telephone", text(form, "telephone"));
        for field in ["adresse", "avatar"] {
            let value = text(form, field);
            if !value.is_empty() {
                account.insert(field, value);
            }
        }
        let classes = form_list(form, "classes");

        self.coordinator
            .submit_then(request, |professor| async move {
                store
                    .update(UTILISATEURS, &user_id, account, UpdateMode::Partial)
                    .await?;
                sync_links(
                    store.as_ref(),
                    CLASSES_PROFESSEUR,
                    "id_professeur",
                    &professor_id,
                    "id_classe",
                    &classes,
                )
                .await?;
                Ok(professor)
            })
            .await
    }

    /// Archiving a professor archives the user account behind it.
    pub async fn archive(
        &self,
        professor_id: impl Into<RecordKey>,
    ) -> std::result::Result<MutationOutcome, MutationError> {
        self.set_state(professor_id.into(), UserState::Archived).await
    }

    pub async fn restore(
        &self,
        professor_id: impl Into<RecordKey>,
    ) -> std::result::Result<MutationOutcome, MutationError> {
        self.set_state(professor_id.into(), UserState::Available).await
    }

    async fn set_state(
        &self,
        professor_id: RecordKey,
        state: UserState,
    ) -> std::result::Result<MutationOutcome, MutationError> {
        let professor = match self
            .coordinator
            .store()
            .fetch_one(PROFESSEURS, &professor_id)
            .await
        {
            Ok(professor) => professor,
            Err(source) => {
                return Err(MutationError {
                    request: state.transition(professor_id, Record::new()),
                    source,
                });
            }
        };
        match professor.key("id_utilisateur") {
            Some(user_id) => {
                self.coordinator
                    .submit(state.transition(user_id, Record::new()))
                    .await
            }
            None => Err(MutationError {
                request: state.transition(professor_id.clone(), Record::new()),
                source: DashboardError::InvalidInput(format!(
                    "professor '{professor_id}' has no user account"
                )),
            }),
        }
    }
}

use crate::core::{DashboardError, Record, RecordKey, Result, normalize_key};
use serde::Serialize;
use std::fmt;

/// `utilisateurs.id_role`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Rp,
    Professeur,
    Attache,
    Etudiant,
}

impl Role {
    pub fn id(&self) -> u8 {
        match self {
            Self::Rp => 1,
            Self::Professeur => 2,
            Self::Attache => 3,
            Self::Etudiant => 4,
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        match id.trim() {
            "1" => Some(Self::Rp),
            "2" => Some(Self::Professeur),
            "3" => Some(Self::Attache),
            "4" => Some(Self::Etudiant),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Rp => "Responsable pédagogique",
            Self::Professeur => "Professeur",
            Self::Attache => "Attaché",
            Self::Etudiant => "Étudiant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The signed-in user, as handed over by the authentication layer.
///
/// Only used to scope queries; nothing here checks credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Actor {
    pub user_id: RecordKey,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: impl Into<RecordKey>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }

    /// From a `utilisateurs` record.
    pub fn from_user(user: &Record) -> Result<Self> {
        let user_id = user
            .id()
            .ok_or_else(|| DashboardError::InvalidInput("user record has no id".to_string()))?;
        let role = user
            .get("id_role")
            .and_then(normalize_key)
            .and_then(|id| Role::from_id(&id))
            .ok_or_else(|| {
                DashboardError::InvalidInput(format!("user '{user_id}' has no known role"))
            })?;
        Ok(Self { user_id, role })
    }

    pub fn require(&self, role: Role) -> Result<()> {
        if self.role == role {
            Ok(())
        } else {
            Err(DashboardError::Forbidden(format!(
                "{} space requires role {}, user '{}' is {}",
                role.label(),
                role.id(),
                self.user_id,
                self.role
            )))
        }
    }
}

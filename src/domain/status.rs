//! Closed status enums over the store's status strings.
//!
//! The store keeps the French wire strings; each enum knows the collection and
//! field it lives in so a transition can be built from the value alone.

use super::collections;
use crate::core::{DashboardError, Record, RecordKey, Result};
use crate::filter::FilterCriterion;
use crate::mutation::MutationRequest;
use std::fmt;

/// A status column with a closed set of values.
pub trait EntityStatus: Copy + Eq + fmt::Debug + Send + Sync + Sized + 'static {
    const COLLECTION: &'static str;
    const FIELD: &'static str;
    const ALL: &'static [Self];

    fn as_wire(&self) -> &'static str;

    /// Accepts the canonical string and the legacy spellings.
    fn from_wire(raw: &str) -> Option<Self>;

    fn parse(raw: &str) -> Result<Self> {
        Self::from_wire(raw).ok_or_else(|| {
            DashboardError::InvalidInput(format!(
                "'{raw}' is not a valid {}.{}",
                Self::COLLECTION,
                Self::FIELD
            ))
        })
    }

    fn of(record: &Record) -> Option<Self> {
        record.get_str(Self::FIELD).and_then(Self::from_wire)
    }

    fn criterion(&self) -> FilterCriterion {
        FilterCriterion::equals(Self::FIELD, self.as_wire())
    }

    /// Status change request on `id`, with `extra` fields written alongside.
    fn transition(&self, id: impl Into<RecordKey>, extra: Record) -> MutationRequest {
        MutationRequest::status_transition(Self::COLLECTION, id, Self::FIELD, self.as_wire(), extra)
    }
}

macro_rules! entity_status {
    (
        $(#[$meta:meta])*
        $name:ident in $collection:expr, $field:literal {
            $( $variant:ident => $wire:literal $(| $alias:literal)* ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        pub enum $name {
            $( #[serde(rename = $wire $(, alias = $alias)*)] $variant, )+
        }

        impl EntityStatus for $name {
            const COLLECTION: &'static str = $collection;
            const FIELD: &'static str = $field;
            const ALL: &'static [Self] = &[$(Self::$variant),+];

            fn as_wire(&self) -> &'static str {
                match self {
                    $(Self::$variant => $wire,)+
                }
            }

            fn from_wire(raw: &str) -> Option<Self> {
                match raw.trim() {
                    $($wire $(| $alias)* => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_wire())
            }
        }
    };
}

entity_status! {
    /// `classes.state`
    ClassState in collections::CLASSES, "state" {
        Available => "disponible",
        Archived => "archivé" | "archiver" | "archive",
    }
}

entity_status! {
    /// `utilisateurs.state`; archiving a professor archives the user.
    UserState in collections::UTILISATEURS, "state" {
        Available => "disponible",
        Archived => "archivé" | "archiver" | "archive",
    }
}

entity_status! {
    /// `cours.statut`
    CourseStatus in collections::COURS, "statut" {
        Planned => "planifié" | "planifier",
        Done => "effectué" | "effectuer",
        Cancelled => "annulé" | "annuler",
    }
}

entity_status! {
    /// `inscriptions.statut`
    InscriptionStatus in collections::INSCRIPTIONS, "statut" {
        Pending => "en attente",
        Validated => "validée" | "valider",
        Rejected => "rejetée" | "rejeter",
    }
}

entity_status! {
    /// `justifications.statut`
    JustificationStatus in collections::JUSTIFICATIONS, "statut" {
        Pending => "en attente",
        Accepted => "acceptée" | "accepter",
        Refused => "refusée" | "refuser",
    }
}

entity_status! {
    /// `absences.justified`
    AbsenceJustification in collections::ABSENCES, "justified" {
        Justified => "justifier",
        Unjustified => "non justifier",
    }
}

impl AbsenceJustification {
    pub fn from_flag(justified: bool) -> Self {
        if justified {
            Self::Justified
        } else {
            Self::Unjustified
        }
    }
}

use crate::client::ResourceStore;
use crate::core::{Record, Result, loose_eq};
use crate::domain::collections::{CLASSES, COURS, ETUDIANTS, INSCRIPTIONS, PROFESSEURS};
use crate::domain::status::{ClassState, CourseStatus, EntityStatus, InscriptionStatus};
use serde::Serialize;
use tracing::{Level, event};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClassCounts {
    pub total: usize,
    pub available: usize,
    pub archived: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CourseCounts {
    pub total: usize,
    pub planned: usize,
    pub done: usize,
    pub cancelled: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InscriptionCounts {
    pub total: usize,
    pub pending: usize,
    pub validated: usize,
    pub rejected: usize,
}

/// Headcount of one class, for the distribution chart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassHeadcount {
    pub libelle: String,
    pub etudiants: usize,
}

/// Figures shown on the RP home page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DashboardStats {
    pub classes: ClassCounts,
    pub professeurs: usize,
    pub cours: CourseCounts,
    pub etudiants: usize,
    pub inscriptions: InscriptionCounts,
    pub distribution: Vec<ClassHeadcount>,
}

fn count_status<S: EntityStatus>(records: &[Record], status: S) -> usize {
    records.iter().filter(|r| S::of(r) == Some(status)).count()
}

/// Fetches the five collections concurrently; any failure fails the whole.
pub async fn dashboard_stats(store: &dyn ResourceStore) -> Result<DashboardStats> {
    let (classes, professeurs, cours, etudiants, inscriptions) = futures::try_join!(
        store.fetch_collection(CLASSES),
        store.fetch_collection(PROFESSEURS),
        store.fetch_collection(COURS),
        store.fetch_collection(ETUDIANTS),
        store.fetch_collection(INSCRIPTIONS)
    )?;

    let archived = count_status(&classes, ClassState::Archived);
    let distribution = classes
        .iter()
        .filter(|c| ClassState::of(c) != Some(ClassState::Archived))
        .map(|class| ClassHeadcount {
            libelle: class.get_str("libelle").unwrap_or_default().to_string(),
            etudiants: class.get("id").map_or(0, |id| {
                etudiants
                    .iter()
                    .filter(|e| e.get("id_classe").is_some_and(|c| loose_eq(c, id)))
                    .count()
            }),
        })
        .collect();

    let stats = DashboardStats {
        classes: ClassCounts {
            total: classes.len(),
            available: classes.len() - archived,
            archived,
        },
        professeurs: professeurs.len(),
        cours: CourseCounts {
            total: cours.len(),
            planned: count_status(&cours, CourseStatus::Planned),
            done: count_status(&cours, CourseStatus::Done),
            cancelled: count_status(&cours, CourseStatus::Cancelled),
        },
        etudiants: etudiants.len(),
        inscriptions: InscriptionCounts {
            total: inscriptions.len(),
            pending: count_status(&inscriptions, InscriptionStatus::Pending),
            validated: count_status(&inscriptions, InscriptionStatus::Validated),
            rejected: count_status(&inscriptions, InscriptionStatus::Rejected),
        },
        distribution,
    };
    event!(
        Level::DEBUG,
        classes = stats.classes.total,
        cours = stats.cours.total,
        etudiants = stats.etudiants,
        "dashboard stats computed"
    );
    Ok(stats)
}

//! Collection names of the school store.

pub const ABSENCES: &str = "absences";
pub const ANNEES_SCOLAIRES: &str = "annee_scolaire";
pub const ATTACHES: &str = "attaches";
pub const CLASSES: &str = "classes";
pub const CLASSES_ATTACHES: &str = "classes_attaches";
pub const CLASSES_PROFESSEUR: &str = "classes_professeur";
pub const COURS: &str = "cours";
pub const COURS_CLASSES: &str = "cours_classes";
pub const ETUDIANTS: &str = "etudiants";
pub const FILIERES: &str = "filieres";
pub const INSCRIPTIONS: &str = "inscriptions";
pub const JUSTIFICATIONS: &str = "justifications";
pub const MODULES: &str = "modules";
pub const NIVEAUX: &str = "niveaux";
pub const PROFESSEURS: &str = "professeurs";
pub const SEMESTRES: &str = "semestres";
pub const UTILISATEURS: &str = "utilisateurs";

pub const ALL: &[&str] = &[
    ABSENCES,
    ANNEES_SCOLAIRES,
    ATTACHES,
    CLASSES,
    CLASSES_ATTACHES,
    CLASSES_PROFESSEUR,
    COURS,
    COURS_CLASSES,
    ETUDIANTS,
    FILIERES,
    INSCRIPTIONS,
    JUSTIFICATIONS,
    MODULES,
    NIVEAUX,
    PROFESSEURS,
    SEMESTRES,
    UTILISATEURS,
];

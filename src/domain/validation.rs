//! Form validation for the dashboard's create and edit forms.
//!
//! Rules are chained; each one appends to a shared [`FieldErrors`] so every
//! failing field is reported in one pass. Only the first message per field
//! is kept.

use super::collections;
use crate::client::ResourceStore;
use crate::core::{FieldErrors, Record, RecordKey, Result, loose_eq};
use chrono::NaiveTime;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value as JsonValue;

lazy_static! {
    static ref EMAIL_PATTERN: Regex = Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap();
}

/// One check in a [`Validator`] chain.
pub trait ValidationRule: Send + Sync {
    fn check(&self, record: &Record, errors: &mut FieldErrors);
}

/// Missing, null, blank strings and empty lists count as absent.
pub fn is_blank(value: Option<&JsonValue>) -> bool {
    match value {
        None | Some(JsonValue::Null) => true,
        Some(JsonValue::String(s)) => s.trim().is_empty(),
        Some(JsonValue::Array(items)) => items.is_empty(),
        Some(_) => false,
    }
}

fn text(record: &Record, field: &str) -> Option<String> {
    match record.get(field)? {
        JsonValue::String(s) => Some(s.trim().to_string()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// ============================================================================
// RULES
// ============================================================================

#[derive(Debug, Clone)]
pub struct Required {
    field: String,
    message: String,
}

impl Required {
    pub fn new(field: &str) -> Self {
        Self {
            field: field.to_string(),
            message: format!("Le champ {field} est requis"),
        }
    }

    pub fn with_message(field: &str, message: &str) -> Self {
        Self {
            field: field.to_string(),
            message: message.to_string(),
        }
    }
}

impl ValidationRule for Required {
    fn check(&self, record: &Record, errors: &mut FieldErrors) {
        if is_blank(record.get(&self.field)) {
            errors.add(&self.field, &self.message);
        }
    }
}

#[derive(Debug, Clone)]
pub struct MaxLength {
    field: String,
    max: usize,
}

impl MaxLength {
    pub fn new(field: &str, max: usize) -> Self {
        Self {
            field: field.to_string(),
            max,
        }
    }
}

impl ValidationRule for MaxLength {
    fn check(&self, record: &Record, errors: &mut FieldErrors) {
        if let Some(value) = text(record, &self.field) {
            if value.chars().count() > self.max {
                errors.add(&self.field, format!("Maximum {} caractères", self.max));
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct EmailFormat {
    field: String,
}

impl EmailFormat {
    pub fn new(field: &str) -> Self {
        Self {
            field: field.to_string(),
        }
    }
}

impl ValidationRule for EmailFormat {
    fn check(&self, record: &Record, errors: &mut FieldErrors) {
        match text(record, &self.field) {
            Some(email) if !email.is_empty() => {
                if !EMAIL_PATTERN.is_match(&email) {
                    errors.add(&self.field, "Email invalide");
                }
            }
            _ => errors.add(&self.field, "Email requis"),
        }
    }
}

/// `end` must be strictly after `start`; both are `HH:MM` or `HH:MM:SS`.
#[derive(Debug, Clone)]
pub struct TimeOrder {
    start: String,
    end: String,
}

impl TimeOrder {
    pub fn new(start: &str, end: &str) -> Self {
        Self {
            start: start.to_string(),
            end: end.to_string(),
        }
    }
}

fn parse_time(raw: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .ok()
}

impl ValidationRule for TimeOrder {
    fn check(&self, record: &Record, errors: &mut FieldErrors) {
        let start = text(record, &self.start).and_then(|s| parse_time(&s));
        let end = text(record, &self.end).and_then(|s| parse_time(&s));
        if let (Some(start), Some(end)) = (start, end) {
            if end <= start {
                errors.add(&self.end, "L'heure de fin doit être après l'heure de début");
            }
        }
    }
}

/// The field must hold an array with at least one element.
#[derive(Debug, Clone)]
pub struct NonEmptyList {
    field: String,
    message: String,
}

impl NonEmptyList {
    pub fn new(field: &str, message: &str) -> Self {
        Self {
            field: field.to_string(),
            message: message.to_string(),
        }
    }
}

impl ValidationRule for NonEmptyList {
    fn check(&self, record: &Record, errors: &mut FieldErrors) {
        let filled = matches!(record.get(&self.field), Some(JsonValue::Array(items)) if !items.is_empty());
        if !filled {
            errors.add(&self.field, &self.message);
        }
    }
}

#[derive(Debug, Clone)]
pub struct PositiveNumber {
    field: String,
    message: String,
}

impl PositiveNumber {
    pub fn new(field: &str, message: &str) -> Self {
        Self {
            field: field.to_string(),
            message: message.to_string(),
        }
    }
}

impl ValidationRule for PositiveNumber {
    fn check(&self, record: &Record, errors: &mut FieldErrors) {
        let number = text(record, &self.field).and_then(|s| s.parse::<f64>().ok());
        if !matches!(number, Some(n) if n > 0.0) {
            errors.add(&self.field, &self.message);
        }
    }
}

// ============================================================================
// VALIDATOR
// ============================================================================

#[derive(Default)]
pub struct Validator {
    rules: Vec<Box<dyn ValidationRule>>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rule(mut self, rule: impl ValidationRule + 'static) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    pub fn required(self, field: &str, message: &str) -> Self {
        self.rule(Required::with_message(field, message))
    }

    pub fn validate(&self, record: &Record) -> FieldErrors {
        let mut errors = FieldErrors::new();
        for rule in &self.rules {
            rule.check(record, &mut errors);
        }
        errors
    }

    pub fn class_form() -> Self {
        Self::new()
            .required("libelle", "Le libellé est requis")
            .rule(MaxLength::new("libelle", 50))
            .required("id_filiere", "Sélectionnez une filière")
            .required("id_niveau", "Sélectionnez un niveau")
            .rule(PositiveNumber::new("capacite_max", "Capacité invalide"))
    }

    pub fn course_form() -> Self {
        Self::new()
            .required("id_module", "Sélectionnez un module")
            .required("id_professeur", "Sélectionnez un professeur")
            .required("id_semestre", "Sélectionnez un semestre")
            .required("date_cours", "La date est requise")
            .required("salle", "La salle est requise")
            .required("heure_debut", "L'heure de début est requise")
            .required("heure_fin", "L'heure de fin est requise")
            .rule(TimeOrder::new("heure_debut", "heure_fin"))
            .rule(NonEmptyList::new(
                "classes",
                "Au moins une classe doit être sélectionnée",
            ))
    }

    pub fn professor_form() -> Self {
        Self::new()
            .required("nom", "Le nom est requis")
            .rule(MaxLength::new("nom", 50))
            .required("prenom", "Le prénom est requis")
            .rule(MaxLength::new("prenom", 50))
            .required("grade", "Le grade est requis")
            .required("specialite", "La spécialité est requise")
            .required("telephone", "Le téléphone est requis")
            .rule(EmailFormat::new("email"))
            .rule(NonEmptyList::new("classes", "Affectez au moins une classe"))
    }

    pub fn justification_form() -> Self {
        Self::new().required("motif", "Le motif est obligatoire")
    }

    pub fn enrollment_form() -> Self {
        Self::new()
            .required("nom", "Le nom est requis")
            .required("prenom", "Le prénom est requis")
            .required("adresse", "L'adresse est requise")
            .required("telephone", "Le téléphone est requis")
            .required("classe_id", "Sélectionnez une classe")
            .rule(EmailFormat::new("email"))
            .required("matricule", "Matricule requis")
    }
}

// ============================================================================
// UNIQUENESS
// ============================================================================

fn same_text(a: Option<&JsonValue>, b: &str) -> bool {
    a.and_then(JsonValue::as_str)
        .is_some_and(|a| a.trim().to_lowercase() == b.trim().to_lowercase())
}

fn is_current(record: &Record, current: Option<&RecordKey>) -> bool {
    match (current, record.get("id")) {
        (Some(current), Some(id)) => loose_eq(id, &JsonValue::String(current.to_string())),
        _ => false,
    }
}

/// Case-insensitive uniqueness of `field` in `collection`, ignoring `current`.
pub async fn check_unique(
    store: &dyn ResourceStore,
    collection: &str,
    field: &str,
    value: &str,
    current: Option<&RecordKey>,
    message: &str,
    errors: &mut FieldErrors,
) -> Result<()> {
    if value.trim().is_empty() {
        return Ok(());
    }
    let taken = store
        .fetch_collection(collection)
        .await?
        .iter()
        .any(|record| !is_current(record, current) && same_text(record.get(field), value));
    if taken {
        errors.add(field, message);
    }
    Ok(())
}

pub async fn check_unique_email(
    store: &dyn ResourceStore,
    email: &str,
    current_user: Option<&RecordKey>,
    errors: &mut FieldErrors,
) -> Result<()> {
    check_unique(
        store,
        collections::UTILISATEURS,
        "email",
        email,
        current_user,
        "Email déjà utilisé",
        errors,
    )
    .await
}

pub async fn check_unique_matricule(
    store: &dyn ResourceStore,
    matricule: &str,
    errors: &mut FieldErrors,
) -> Result<()> {
    check_unique(
        store,
        collections::ETUDIANTS,
        "matricule",
        matricule,
        None,
        "Matricule déjà utilisé",
        errors,
    )
    .await
}

/// A class label is unique within its filière.
pub async fn check_unique_class(
    store: &dyn ResourceStore,
    libelle: &str,
    filiere: &JsonValue,
    current: Option<&RecordKey>,
    errors: &mut FieldErrors,
) -> Result<()> {
    if libelle.trim().is_empty() {
        return Ok(());
    }
    let taken = store
        .fetch_collection(collections::CLASSES)
        .await?
        .iter()
        .any(|class| {
            !is_current(class, current)
                && same_text(class.get("libelle"), libelle)
                && class.get("id_filiere").is_some_and(|f| loose_eq(f, filiere))
        });
    if taken {
        errors.add("libelle", "Cette classe existe déjà pour cette filière");
    }
    Ok(())
}

use crate::core::{DashboardError, Result, path_segments};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cardinality {
    /// Attach the first matching target record, or `null`.
    One,
    /// Attach every matching target record, possibly `[]`.
    Many,
}

/// How to attach records of `target_collection` onto a base record.
///
/// `foreign_key` and `result_field` are dotted paths. A `result_field` such as
/// `student.user` writes into an object attached by an earlier relation of the
/// same pass; when `foreign_key` starts with the same parent (`student.id_utilisateur`)
/// it is read relative to that object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationDescriptor {
    pub foreign_key: String,
    pub target_collection: String,
    pub target_key: String,
    pub cardinality: Cardinality,
    pub result_field: String,
}

impl RelationDescriptor {
    pub fn new(
        foreign_key: &str,
        target_collection: &str,
        cardinality: Cardinality,
        result_field: &str,
    ) -> Self {
        Self {
            foreign_key: foreign_key.to_string(),
            target_collection: target_collection.to_string(),
            target_key: "id".to_string(),
            cardinality,
            result_field: result_field.to_string(),
        }
    }

    pub fn one(foreign_key: &str, target_collection: &str, result_field: &str) -> Self {
        Self::new(foreign_key, target_collection, Cardinality::One, result_field)
    }

    pub fn many(foreign_key: &str, target_collection: &str, result_field: &str) -> Self {
        Self::new(foreign_key, target_collection, Cardinality::Many, result_field)
    }

    /// Join against `field` of the target instead of its `id`.
    pub fn on(mut self, target_key: &str) -> Self {
        self.target_key = target_key.to_string();
        self
    }

    /// Parent path and leaf of `result_field`.
    pub(crate) fn result_location(&self) -> (Vec<&str>, &str) {
        let mut segments: Vec<&str> = path_segments(&self.result_field).collect();
        let leaf = segments.pop().unwrap_or_default();
        (segments, leaf)
    }

    /// Foreign key relative to the result parent, when it lives under it.
    pub(crate) fn relative_foreign_key(&self) -> Option<&str> {
        let (parent, _) = self.result_location();
        if parent.is_empty() {
            return None;
        }
        let prefix = parent.join(".");
        self.foreign_key
            .strip_prefix(prefix.as_str())
            .and_then(|rest| rest.strip_prefix('.'))
            .filter(|rest| !rest.is_empty())
    }
}

/// Rejects descriptor sets that cannot produce a well-formed record.
pub fn validate_relations(relations: &[RelationDescriptor]) -> Result<()> {
    let mut results = HashSet::new();

    for relation in relations {
        if path_segments(&relation.foreign_key).next().is_none() {
            return Err(DashboardError::InvalidRelation(format!(
                "relation '{}' has an empty foreign key",
                relation.result_field
            )));
        }
        if path_segments(&relation.target_key).next().is_none() {
            return Err(DashboardError::InvalidRelation(format!(
                "relation '{}' has an empty target key",
                relation.result_field
            )));
        }
        crate::client::validate_collection_name(&relation.target_collection)
            .map_err(|e| DashboardError::InvalidRelation(e.to_string()))?;

        let normalized: Vec<&str> = path_segments(&relation.result_field).collect();
        if normalized.is_empty() {
            return Err(DashboardError::InvalidRelation(format!(
                "relation on '{}' has an empty result field",
                relation.foreign_key
            )));
        }
        let normalized = normalized.join(".");
        if normalized == relation.foreign_key {
            return Err(DashboardError::InvalidRelation(format!(
                "result field '{normalized}' would overwrite its own foreign key"
            )));
        }
        if !results.insert(normalized.clone()) {
            return Err(DashboardError::InvalidRelation(format!(
                "result field '{normalized}' is declared twice"
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_result_fields_split_into_parent_and_leaf() {
        let relation = RelationDescriptor::one("student.id_utilisateur", "utilisateurs", "student.user");
        let (parent, leaf) = relation.result_location();
        assert_eq!(parent, vec!["student"]);
        assert_eq!(leaf, "user");
        assert_eq!(relation.relative_foreign_key(), Some("id_utilisateur"));

        let root_key = RelationDescriptor::one("id_classe", "classes", "student.classe");
        assert_eq!(root_key.relative_foreign_key(), None);
    }

    #[test]
    fn duplicate_and_self_overwriting_results_are_rejected() {
        let duplicate = [
            RelationDescriptor::one("id_utilisateur", "utilisateurs", "user"),
            RelationDescriptor::one("id_createur", "utilisateurs", "user"),
        ];
        assert!(matches!(
            validate_relations(&duplicate),
            Err(DashboardError::InvalidRelation(_))
        ));

        let overwrite = [RelationDescriptor::one("id_classe", "classes", "id_classe")];
        assert!(validate_relations(&overwrite).is_err());

        let bad_target = [RelationDescriptor::one("id_classe", "../classes", "classe")];
        assert!(validate_relations(&bad_target).is_err());

        let ok = [
            RelationDescriptor::one("id_etudiant", "etudiants", "student"),
            RelationDescriptor::one("student.id_utilisateur", "utilisateurs", "student.user"),
            RelationDescriptor::many("id", "cours_classes", "links").on("id_cours"),
        ];
        assert!(validate_relations(&ok).is_ok());
    }
}

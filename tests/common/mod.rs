#![allow(dead_code)]

use async_trait::async_trait;
use ecole221::{InMemoryStore, Record, RecordKey, ResourceStore, Result, SharedStore, UpdateMode};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// A small school: two active classes and an archived one, three students,
/// one professor, one attaché, three courses and two pending justifications.
pub fn school_document() -> Value {
    json!({
        "utilisateurs": [
            { "id": "1", "nom": "Diop", "prenom": "Awa", "email": "awa.diop@ecole221.sn", "id_role": "1", "state": "disponible" },
            { "id": "2", "nom": "Sarr", "prenom": "Moussa", "email": "moussa.sarr@ecole221.sn", "id_role": "2", "state": "disponible" },
            { "id": "3", "nom": "Fall", "prenom": "Aminata", "email": "aminata.fall@ecole221.sn", "id_role": "3", "state": "disponible" },
            { "id": 10, "nom": "Ndiaye", "prenom": "Fatou", "email": "fatou.ndiaye@ecole221.sn", "id_role": 4, "state": "disponible" },
            { "id": "11", "nom": "Ba", "prenom": "Ibrahima", "email": "ibrahima.ba@ecole221.sn", "id_role": "4", "state": "disponible" },
            { "id": "12", "nom": "Sow", "prenom": "Mariama", "email": "mariama.sow@ecole221.sn", "id_role": "4", "state": "disponible" }
        ],
        "filieres": [
            { "id": "1", "libelle": "Informatique" },
            { "id": "2", "libelle": "Gestion" }
        ],
        "niveaux": [
            { "id": "1", "libelle": "Licence 1" },
            { "id": "2", "libelle": "Licence 2" }
        ],
        "annee_scolaire": [
            { "id": "1", "libelle": "2023-2024", "est_active": 0 },
            { "id": "2", "libelle": "2024-2025", "est_active": 1 }
        ],
        "classes": [
            { "id": 5, "libelle": "L1 Info", "id_filiere": "1", "id_niveau": "1", "id_annee": "2", "capacite_max": 30, "state": "disponible" },
            { "id": "6", "libelle": "L2 Gestion", "id_filiere": 2, "id_niveau": 2, "id_annee": 2, "capacite_max": "25", "state": "disponible" },
            { "id": "7", "libelle": "L3 Info", "id_filiere": "1", "id_niveau": "2", "id_annee": "1", "capacite_max": 20, "state": "archivé" }
        ],
        "etudiants": [
            { "id": 1, "id_utilisateur": 10, "id_classe": 5, "matricule": "ETU-001" },
            { "id": "2", "id_utilisateur": "11", "id_classe": "5", "matricule": "ETU-002" },
            { "id": "3", "id_utilisateur": "12", "id_classe": "6", "matricule": "ETU-003" }
        ],
        "inscriptions": [
            { "id": "1", "id_etudiant": "1", "id_classe": "5", "annee_scolaire": "2024-2025", "statut": "validée" },
            { "id": "2", "id_etudiant": "2", "id_classe": "5", "annee_scolaire": "2024-2025", "statut": "en attente" },
            { "id": "3", "id_etudiant": "3", "id_classe": "6", "annee_scolaire": "2024-2025", "statut": "validée" }
        ],
        "professeurs": [
            { "id": "1", "id_utilisateur": "2", "specialite": "Algorithmique", "grade": "Docteur" }
        ],
        "classes_professeur": [
            { "id": "1", "id_professeur": "1", "id_classe": "5" }
        ],
        "attaches": [
            { "id": "1", "id_utilisateur": "3" }
        ],
        "classes_attaches": [
            { "id": "1", "id_attache": "1", "id_classe": "5" }
        ],
        "modules": [
            { "id": "1", "libelle": "Algorithmique" },
            { "id": "2", "libelle": "Comptabilité" }
        ],
        "semestres": [
            { "id": "1", "libelle": "Semestre 1", "annee_scolaire": "2024-2025" }
        ],
        "cours": [
            { "id": "1", "id_module": "1", "id_professeur": "1", "id_semestre": "1", "date_cours": "2024-11-04", "heure_debut": "08:00", "heure_fin": "10:00", "salle": "B12", "statut": "planifié" },
            { "id": "2", "id_module": "2", "id_professeur": "1", "id_semestre": "1", "date_cours": "2024-11-06", "heure_debut": "10:00", "heure_fin": "12:00", "salle": "A03", "statut": "effectué" },
            { "id": "3", "id_module": "2", "id_professeur": "9", "id_semestre": "1", "date_cours": "2024-10-01", "heure_debut": "14:00", "heure_fin": "16:00", "salle": "A01", "statut": "annulé" }
        ],
        "cours_classes": [
            { "id": "1", "id_cours": "1", "id_classe": "5" },
            { "id": "2", "id_cours": "2", "id_classe": "6" }
        ],
        "absences": [
            { "id": "1", "id_etudiant": "1", "id_cours": "1", "date_absence": "2024-11-04", "justified": "non justifier" },
            { "id": "2", "id_etudiant": "3", "id_cours": "2", "date_absence": "2024-11-06", "justified": "non justifier" }
        ],
        "justifications": [
            { "id": "1", "id_absence": "1", "id_etudiant": "1", "motif": "Malade", "date_justification": "2024-11-05T09:00:00.000Z", "statut": "en attente" },
            { "id": "2", "id_absence": "2", "id_etudiant": "3", "motif": "Transport", "date_justification": "2024-11-07T09:00:00.000Z", "statut": "en attente" }
        ]
    })
}

pub fn school_store() -> Arc<InMemoryStore> {
    Arc::new(InMemoryStore::from_json(school_document()).expect("school fixture"))
}

pub fn shared(store: &Arc<InMemoryStore>) -> SharedStore {
    store.clone()
}

pub fn ids(records: &[Record]) -> Vec<String> {
    records
        .iter()
        .map(|r| r.id().map(|id| id.to_string()).unwrap_or_default())
        .collect()
}

// ============================================================================
// GATED STORE
// ============================================================================

/// One armed gate: the next call touching its collection signals `entered`
/// and then waits for `release`.
#[derive(Clone, Default)]
pub struct Gate {
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
}

/// Wraps an in-memory store so a test can hold a single call open while
/// others proceed.
pub struct GatedStore {
    inner: Arc<InMemoryStore>,
    gates: Mutex<HashMap<String, Gate>>,
}

impl GatedStore {
    pub fn new(inner: Arc<InMemoryStore>) -> Self {
        Self {
            inner,
            gates: Mutex::new(HashMap::new()),
        }
    }

    pub fn inner(&self) -> &Arc<InMemoryStore> {
        &self.inner
    }

    /// Arms a one-shot gate on `collection`.
    pub fn gate(&self, collection: &str) -> Gate {
        let gate = Gate::default();
        self.gates
            .lock()
            .unwrap()
            .insert(collection.to_string(), gate.clone());
        gate
    }

    async fn pass(&self, collection: &str) {
        let gate = self.gates.lock().unwrap().remove(collection);
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
    }
}

#[async_trait]
impl ResourceStore for GatedStore {
    async fn fetch_collection(&self, name: &str) -> Result<Vec<Record>> {
        self.pass(name).await;
        self.inner.fetch_collection(name).await
    }

    async fn fetch_where(&self, name: &str, filters: &[(String, String)]) -> Result<Vec<Record>> {
        self.pass(name).await;
        self.inner.fetch_where(name, filters).await
    }

    async fn fetch_one(&self, name: &str, id: &RecordKey) -> Result<Record> {
        self.pass(name).await;
        self.inner.fetch_one(name, id).await
    }

    async fn create(&self, name: &str, payload: Record) -> Result<Record> {
        self.pass(name).await;
        self.inner.create(name, payload).await
    }

    async fn update(&self, name: &str, id: &RecordKey, payload: Record, mode: UpdateMode) -> Result<Record> {
        self.pass(name).await;
        self.inner.update(name, id, payload, mode).await
    }

    async fn remove(&self, name: &str, id: &RecordKey) -> Result<()> {
        self.pass(name).await;
        self.inner.remove(name, id).await
    }
}

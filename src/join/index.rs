use crate::core::{Record, normalize_key};
use std::collections::HashMap;

/// Positions of target records by normalized key value.
///
/// Positions are kept in target order so `many` relations attach records in
/// the order the store returned them.
#[derive(Debug, Default, Clone)]
pub struct KeyIndex {
    positions: HashMap<String, Vec<usize>>,
}

impl KeyIndex {
    pub fn build(records: &[Record], key_field: &str) -> Self {
        let mut positions: HashMap<String, Vec<usize>> = HashMap::with_capacity(records.len());
        for (position, record) in records.iter().enumerate() {
            for value in record.values_at(key_field) {
                if let Some(key) = normalize_key(value) {
                    let slot = positions.entry(key).or_default();
                    if slot.last() != Some(&position) {
                        slot.push(position);
                    }
                }
            }
        }
        Self { positions }
    }

    pub fn get(&self, key: &str) -> &[usize] {
        self.positions.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Union of the positions matching any of `keys`, in target order.
    pub fn lookup_all<'a, I>(&self, keys: I) -> Vec<usize>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut out: Vec<usize> = keys.into_iter().flat_map(|k| self.get(k).iter().copied()).collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    /// First position matching the first key that matches anything.
    pub fn lookup_first<'a, I>(&self, keys: I) -> Option<usize>
    where
        I: IntoIterator<Item = &'a str>,
    {
        keys.into_iter().find_map(|k| self.get(k).first().copied())
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record;

    #[test]
    fn mixed_id_representations_share_a_slot() {
        let targets = vec![
            record!({ "id": "3", "libelle": "L1" }),
            record!({ "id": 4, "libelle": "L2" }),
            record!({ "id": null }),
        ];
        let index = KeyIndex::build(&targets, "id");
        assert_eq!(index.get("3"), &[0]);
        assert_eq!(index.get("4"), &[1]);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn many_lookups_keep_target_order() {
        let links = vec![
            record!({ "id": 1, "id_cours": 9, "id_classe": 2 }),
            record!({ "id": 2, "id_cours": 8, "id_classe": 1 }),
            record!({ "id": 3, "id_cours": "9", "id_classe": 1 }),
        ];
        let index = KeyIndex::build(&links, "id_cours");
        assert_eq!(index.lookup_all(["9"]), vec![0, 2]);
        assert_eq!(index.lookup_all(["9", "8"]), vec![0, 1, 2]);
        assert_eq!(index.lookup_first(["7", "8"]), Some(1));
        assert!(index.lookup_first(["7"]).is_none());
    }
}

//! Label index to structure name tables

use labelmesh_core::{Error, Result};
use std::collections::BTreeMap;
use std::path::Path;

/// Anatomical structures of the bundled abdominal segmentation
const DEFAULT_LABELS: [(i32, &str); 17] = [
    (1, "Liver"),
    (2, "Spleen"),
    (3, "Pancreas"),
    (4, "Heart"),
    (5, "Body"),
    (6, "Gallbladder"),
    (7, "Stomach"),
    (8, "Small_bowel"),
    (9, "Colon"),
    (10, "Kidney"),
    (11, "Veins"),
    (12, "Lungs"),
    (13, "Spine"),
    (14, "Ribs"),
    (15, "Shoulders"),
    (16, "Hips"),
    (17, "Back_muscles"),
];

/// Ordered mapping from label value to structure name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMap {
    labels: BTreeMap<i32, String>,
}

impl Default for LabelMap {
    fn default() -> Self {
        Self {
            labels: DEFAULT_LABELS
                .iter()
                .map(|&(index, name)| (index, name.to_string()))
                .collect(),
        }
    }
}

impl LabelMap {
    pub fn empty() -> Self {
        Self {
            labels: BTreeMap::new(),
        }
    }

    /// A map holding only `(index, name)`
    pub fn single(index: i32, name: &str) -> Self {
        let mut map = Self::empty();
        map.insert(index, name);
        map
    }

    /// Parse `{"4": "Heart", ...}`
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: BTreeMap<String, String> =
            serde_json::from_str(json).map_err(|e| Error::InvalidData(format!("Invalid label map: {}", e)))?;
        let mut map = Self::empty();
        for (key, name) in raw {
            let index: i32 = key
                .trim()
                .parse()
                .map_err(|_| Error::InvalidData(format!("Label key '{}' is not an integer", key)))?;
            map.insert(index, &name);
        }
        Ok(map)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn to_json(&self) -> Result<String> {
        let raw: BTreeMap<String, &str> = self
            .labels
            .iter()
            .map(|(index, name)| (index.to_string(), name.as_str()))
            .collect();
        serde_json::to_string_pretty(&raw).map_err(|e| Error::InvalidData(e.to_string()))
    }

    pub fn insert(&mut self, index: i32, name: &str) -> Option<String> {
        self.labels.insert(index, name.to_string())
    }

    pub fn get(&self, index: i32) -> Option<&str> {
        self.labels.get(&index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Entries in ascending label order
    pub fn iter(&self) -> impl Iterator<Item = (i32, &str)> + '_ {
        self.labels.iter().map(|(&index, name)| (index, name.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_map() {
        let map = LabelMap::default();
        assert_eq!(map.len(), 17);
        assert_eq!(map.get(1), Some("Liver"));
        assert_eq!(map.get(4), Some("Heart"));
        assert_eq!(map.get(17), Some("Back_muscles"));
        assert_eq!(map.get(0), None);

        let indices: Vec<i32> = map.iter().map(|(i, _)| i).collect();
        assert_eq!(indices, (1..=17).collect::<Vec<_>>());
    }

    #[test]
    fn test_single_override() {
        let map = LabelMap::single(4, "Heart");
        assert_eq!(map.iter().collect::<Vec<_>>(), vec![(4, "Heart")]);
    }

    #[test]
    fn test_json_map() {
        let map = LabelMap::from_json(r#"{"10": "Kidney", "2": "Spleen"}"#).unwrap();
        assert_eq!(map.iter().collect::<Vec<_>>(), vec![(2, "Spleen"), (10, "Kidney")]);

        let round = LabelMap::from_json(&map.to_json().unwrap()).unwrap();
        assert_eq!(round, map);
    }

    #[test]
    fn test_json_errors() {
        assert!(LabelMap::from_json("[1, 2]").is_err());
        assert!(LabelMap::from_json(r#"{"liver": "Liver"}"#).is_err());
        assert!(LabelMap::from_json_file("/nonexistent/labels.json").is_err());
    }
}

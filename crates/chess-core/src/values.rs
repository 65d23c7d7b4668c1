//! Ordered move→value sequences.

use serde::{Deserialize, Serialize};

/// An explicit, ordered sequence of `(move, value)` pairs.
///
/// Evaluation vectors are compared key by key and read in order (best move
/// first), so the order is part of the value and never derived from map
/// iteration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MoveValues(Vec<(String, f64)>);

impl MoveValues {
    /// Creates an empty sequence.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Appends an entry, replacing the value if the move is already present.
    pub fn insert(&mut self, mv: impl Into<String>, value: f64) {
        let mv = mv.into();
        match self.0.iter_mut().find(|(m, _)| *m == mv) {
            Some(entry) => entry.1 = value,
            None => self.0.push((mv, value)),
        }
    }

    /// Value for a move.
    #[must_use]
    pub fn get(&self, mv: &str) -> Option<f64> {
        self.0.iter().find(|(m, _)| m == mv).map(|(_, v)| *v)
    }

    /// Returns true if the move is present.
    #[must_use]
    pub fn contains(&self, mv: &str) -> bool {
        self.get(mv).is_some()
    }

    /// Entries in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(m, v)| (m.as_str(), *v))
    }

    /// Moves in order.
    pub fn moves(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(m, _)| m.as_str())
    }

    /// First entry, i.e. the best one once sorted.
    #[must_use]
    pub fn first(&self) -> Option<(&str, f64)> {
        self.0.first().map(|(m, v)| (m.as_str(), *v))
    }

    /// Largest value, ignoring NaN entries.
    #[must_use]
    pub fn max_value(&self) -> Option<f64> {
        self.0
            .iter()
            .map(|(_, v)| *v)
            .filter(|v| !v.is_nan())
            .reduce(f64::max)
    }

    /// Sum of all values.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.0.iter().map(|(_, v)| *v).sum()
    }

    /// Sorts by value, highest first. Ties keep their move order.
    pub fn sort_descending(&mut self) {
        self.0.sort_by(|a, b| b.1.total_cmp(&a.1));
    }

    /// Applies `f` to every value.
    #[must_use]
    pub fn map_values(&self, mut f: impl FnMut(f64) -> f64) -> Self {
        Self(self.0.iter().map(|(m, v)| (m.clone(), f(*v))).collect())
    }

    /// Divides every value by the total so the sequence sums to one.
    ///
    /// A sequence with a non-positive total is returned unchanged.
    #[must_use]
    pub fn normalized(&self) -> Self {
        let total = self.total();
        if total <= 0.0 || !total.is_finite() {
            return self.clone();
        }
        self.map_values(|v| v / total)
    }
}

impl FromIterator<(String, f64)> for MoveValues {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        let mut values = MoveValues::new();
        for (mv, v) in iter {
            values.insert(mv, v);
        }
        values
    }
}

impl<'a> FromIterator<(&'a str, f64)> for MoveValues {
    fn from_iter<I: IntoIterator<Item = (&'a str, f64)>>(iter: I) -> Self {
        iter.into_iter().map(|(m, v)| (m.to_string(), v)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_replaces_existing_move() {
        let mut values = MoveValues::new();
        values.insert("e2e4", 30.0);
        values.insert("d2d4", 25.0);
        values.insert("e2e4", 35.0);
        assert_eq!(values.len(), 2);
        assert_eq!(values.get("e2e4"), Some(35.0));
    }

    #[test]
    fn sort_descending_is_stable() {
        let mut values: MoveValues = [("a", 1.0), ("b", 3.0), ("c", 1.0), ("d", 2.0)]
            .into_iter()
            .collect();
        values.sort_descending();
        let order: Vec<&str> = values.moves().collect();
        assert_eq!(order, vec!["b", "d", "a", "c"]);
    }

    #[test]
    fn normalized_sums_to_one() {
        let values: MoveValues = [("a", 0.5), ("b", 0.3)].into_iter().collect();
        let normalized = values.normalized();
        assert!((normalized.total() - 1.0).abs() < 1e-12);
        assert!((normalized.get("a").unwrap() - 0.625).abs() < 1e-12);
    }

    #[test]
    fn max_value_skips_nan() {
        let values: MoveValues = [("a", f64::NAN), ("b", -3.0)].into_iter().collect();
        assert_eq!(values.max_value(), Some(-3.0));
        assert_eq!(MoveValues::new().max_value(), None);
    }

    #[test]
    fn serializes_as_ordered_pairs() {
        let values: MoveValues = [("e2e4", 0.5), ("d2d4", 0.25)].into_iter().collect();
        let json = serde_json::to_string(&values).unwrap();
        assert_eq!(json, r#"[["e2e4",0.5],["d2d4",0.25]]"#);
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Cache keys over the geometry-affecting subset of a parameter set.

use crate::params::{ParamValue, Parameters};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Stable serialization of the parameters that influence geometry.
///
/// Keys are sorted, absent keys are omitted, and every other parameter is
/// ignored, so toggling a non-geometric option maps to the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GeometryKey(String);

impl GeometryKey {
    pub fn new<'a>(params: &Parameters, geometry_keys: impl IntoIterator<Item = &'a str>) -> Self {
        let subset: BTreeMap<&str, &ParamValue> = geometry_keys
            .into_iter()
            .filter_map(|key| params.get_key_value(key).map(|(k, v)| (k.as_str(), v)))
            .collect();
        // A map of plain JSON values always serializes.
        let json = serde_json::to_string(&subset).unwrap_or_default();
        Self(json)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// SHA-256 hex digest of the key, for use where a fixed-length key is needed.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.0.as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl fmt::Display for GeometryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignores_non_geometric_parameters() {
        let mut a = Parameters::new();
        a.insert("width_units".into(), 2.into());
        a.insert("show_labels".into(), true.into());
        let mut b = a.clone();
        b.insert("show_labels".into(), false.into());

        let keys = ["width_units", "depth_units"];
        assert_eq!(GeometryKey::new(&a, keys), GeometryKey::new(&b, keys));
        assert_eq!(GeometryKey::new(&a, keys).as_str(), r#"{"width_units":2}"#);
    }

    #[test]
    fn key_order_does_not_matter() {
        let mut p = Parameters::new();
        p.insert("a".into(), 1.into());
        p.insert("b".into(), 2.into());
        assert_eq!(GeometryKey::new(&p, ["a", "b"]), GeometryKey::new(&p, ["b", "a"]));
    }

    #[test]
    fn geometric_change_changes_digest() {
        let mut p = Parameters::new();
        p.insert("width_units".into(), 2.into());
        let first = GeometryKey::new(&p, ["width_units"]).digest();
        p.insert("width_units".into(), 3.into());
        let second = GeometryKey::new(&p, ["width_units"]).digest();
        assert_ne!(first, second);
        assert_eq!(first.len(), 64);
    }
}

//! Overlay merging for layered configuration.
//!
//! A config is built by merging successive overlays onto a base:
//! nested objects merge field by field, lists append (base first), maps
//! merge key by key, and scalars are replaced only when the overlay
//! actually provides a value (`Some`).

use std::collections::BTreeMap;


/// Merge an overlay of the same type into `self`.
pub trait Merge {
    fn merge(&mut self, overlay: Self);
}

impl Merge for String {
    fn merge(&mut self, overlay: Self) {
        *self = overlay;
    }
}

impl<T: Merge> Merge for Option<T> {
    fn merge(&mut self, overlay: Self) {
        match (self.as_mut(), overlay) {
            (_, None) => {}
            (Some(base), Some(over)) => base.merge(over),
            (None, Some(over)) => *self = Some(over),
        }
    }
}

impl<T> Merge for Vec<T> {
    fn merge(&mut self, overlay: Self) {
        self.extend(overlay);
    }
}

impl<V: Merge> Merge for BTreeMap<String, V> {
    fn merge(&mut self, overlay: Self) {
        for (key, value) in overlay {
            match self.get_mut(&key) {
                Some(existing) => existing.merge(value),
                None => {
                    self.insert(key, value);
                }
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, PartialEq)]
    struct Inner {
        image: Option<String>,
        tags: Vec<String>,
    }

    impl Merge for Inner {
        fn merge(&mut self, overlay: Self) {
            self.image.merge(overlay.image);
            self.tags.merge(overlay.tags);
        }
    }

    #[test]
    fn option_none_keeps_base() {
        let mut base = Some("a".to_string());
        base.merge(None);
        assert_eq!(base.as_deref(), Some("a"));
    }

    #[test]
    fn option_some_replaces_scalar() {
        let mut base = Some("nvidia".to_string());
        base.merge(Some("runc".to_string()));
        assert_eq!(base.as_deref(), Some("runc"));
    }

    #[test]
    fn option_fills_missing() {
        let mut base: Option<String> = None;
        base.merge(Some("mlbox/mnist:0.1".to_string()));
        assert_eq!(base.as_deref(), Some("mlbox/mnist:0.1"));
    }

    #[test]
    fn vec_appends_in_order() {
        let mut base = vec![1, 2];
        base.merge(vec![3]);
        assert_eq!(base, vec![1, 2, 3]);
    }

    #[test]
    fn nested_option_struct_recurses() {
        let mut base = Some(Inner { image: Some("a".into()), tags: vec!["x".into()] });
        base.merge(Some(Inner { image: None, tags: vec!["y".into()] }));
        let inner = base.unwrap();
        assert_eq!(inner.image.as_deref(), Some("a"));
        assert_eq!(inner.tags, vec!["x".to_string(), "y".to_string()]);
    }

    #[test]
    fn map_merges_per_key() {
        let mut base: BTreeMap<String, Option<String>> = BTreeMap::new();
        base.insert("A".into(), Some("1".into()));
        base.insert("B".into(), Some("2".into()));
        let mut over = BTreeMap::new();
        over.insert("B".into(), Some("20".into()));
        over.insert("C".into(), Some("3".into()));
        base.merge(over);
        assert_eq!(base["A"].as_deref(), Some("1"));
        assert_eq!(base["B"].as_deref(), Some("20"));
        assert_eq!(base["C"].as_deref(), Some("3"));
    }
}

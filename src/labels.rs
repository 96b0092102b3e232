use std::collections::BTreeMap;

use crate::view::Tag;

/// Merges the default labels with the tags of a row. Tags win over defaults on key collisions.
///
/// This is the label set handed to resource builders, so it still holds unexported labels.
pub fn raw_labels(
    default_labels: &BTreeMap<String, String>,
    tags: &[Tag],
) -> BTreeMap<String, String> {
    let mut labels = default_labels.clone();
    for tag in tags {
        labels.insert(tag.key.clone(), tag.value.clone());
    }
    labels
}

/// Builds the labels that get exported with a time series.
pub fn make_labels(
    default_labels: &BTreeMap<String, String>,
    unexported_labels: &[String],
    tags: &[Tag],
) -> BTreeMap<String, String> {
    strip_unexported(raw_labels(default_labels, tags), unexported_labels)
}

pub(crate) fn strip_unexported(
    mut labels: BTreeMap<String, String>,
    unexported_labels: &[String],
) -> BTreeMap<String, String> {
    for key in unexported_labels {
        labels.remove(key);
    }
    labels
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn tags_override_defaults() {
        let defaults = labels(&[("a", "1"), ("b", "2")]);
        let tags = [Tag::new("a", "9")];

        assert_eq!(
            make_labels(&defaults, &[], &tags),
            labels(&[("a", "9"), ("b", "2")])
        );
    }

    #[test]
    fn unexported_labels_are_removed() {
        let defaults = labels(&[("a", "1"), ("b", "2")]);
        let tags = [Tag::new("a", "9")];

        assert_eq!(
            make_labels(&defaults, &["b".to_string()], &tags),
            labels(&[("a", "9")])
        );
    }

    #[test]
    fn unexported_tags_are_removed_too() {
        let tags = [Tag::new("project_id", "p1"), Tag::new("zone", "us-east1")];

        assert_eq!(
            make_labels(&BTreeMap::new(), &["project_id".to_string()], &tags),
            labels(&[("zone", "us-east1")])
        );
    }

    #[test]
    fn raw_labels_keep_unexported_keys() {
        let defaults = labels(&[("project_id", "default")]);
        let tags = [Tag::new("project_id", "p1")];

        assert_eq!(
            raw_labels(&defaults, &tags),
            labels(&[("project_id", "p1")])
        );
    }

    #[test]
    fn defaults_are_left_untouched() {
        let defaults = labels(&[("a", "1")]);
        let _ = make_labels(&defaults, &["a".to_string()], &[Tag::new("a", "2")]);

        assert_eq!(defaults, labels(&[("a", "1")]));
    }
}

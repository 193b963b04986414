//! Property-based tests for tag ordering.
//!
//! These tests use proptest to verify ordering invariants across many
//! randomly generated tag lists.

use proptest::prelude::*;

use kairos_core::{parse_version, MatchPredicate, SortMode, VersionConstraint};

use crate::resolver::{order_by_name, order_by_version};

/// Strategy for generating semantic version tags, optionally `v`-prefixed.
fn semver_tag_strategy() -> impl Strategy<Value = String> {
    (
        prop::bool::ANY,
        0u64..20,
        0u64..20,
        0u64..20,
        prop::option::of("(alpha|beta|rc)\\.[0-9]{1,2}"),
    )
        .prop_map(|(v, major, minor, patch, pre)| {
            let prefix = if v { "v" } else { "" };
            match pre {
                Some(pre) => format!("{prefix}{major}.{minor}.{patch}-{pre}"),
                None => format!("{prefix}{major}.{minor}.{patch}"),
            }
        })
}

/// Strategy for generating tags that are not semantic versions.
fn non_semver_tag_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("latest".to_string()),
        Just("stable".to_string()),
        "[a-f0-9]{7,12}",
        "[0-9]{1,2}\\.[0-9]{1,2}",
    ]
}

/// Strategy for generating mixed tag lists.
fn tag_list_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(
        prop_oneof![semver_tag_strategy(), non_semver_tag_strategy()],
        0..40,
    )
}

proptest! {
    #[test]
    fn prop_name_order_is_sorted_permutation(tags in tag_list_strategy()) {
        let list = order_by_name(tags.iter().map(String::as_str).collect());
        let names = list.names();

        prop_assert!(names.windows(2).all(|w| w[0] <= w[1]));

        let mut expected: Vec<&str> = tags.iter().map(String::as_str).collect();
        expected.sort_unstable();
        prop_assert_eq!(names, expected);
    }

    #[test]
    fn prop_version_order_keeps_only_semver(tags in tag_list_strategy()) {
        let constraint = VersionConstraint::new(SortMode::SemVer);
        let list = order_by_version(tags.iter().map(String::as_str).collect(), &constraint);

        let expected = tags.iter().filter(|t| parse_version(t).is_some()).count();
        prop_assert_eq!(list.len(), expected);
        for tag in list.tags() {
            prop_assert!(parse_version(&tag.name).is_some());
        }
    }

    #[test]
    fn prop_version_order_is_non_decreasing(tags in prop::collection::vec(semver_tag_strategy(), 0..40)) {
        let constraint = VersionConstraint::new(SortMode::SemVer);
        let list = order_by_version(tags.iter().map(String::as_str).collect(), &constraint);

        let versions: Vec<_> = list
            .tags()
            .iter()
            .filter_map(|t| parse_version(&t.name))
            .collect();
        prop_assert_eq!(versions.len(), tags.len());
        prop_assert!(versions.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn prop_version_order_is_input_order_independent(mut tags in tag_list_strategy()) {
        let constraint = VersionConstraint::new(SortMode::SemVer);
        let first = order_by_version(tags.iter().map(String::as_str).collect(), &constraint);

        tags.reverse();
        let second = order_by_version(tags.iter().map(String::as_str).collect(), &constraint);

        prop_assert_eq!(first.names(), second.names());
    }

    #[test]
    fn prop_none_predicate_accepts_nothing(tags in tag_list_strategy()) {
        let constraint = VersionConstraint::new(SortMode::Lexical)
            .with_match(MatchPredicate::None);
        prop_assert!(tags.iter().all(|t| !constraint.accepts(t)));
    }
}

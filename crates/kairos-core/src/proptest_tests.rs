//! Property-based tests for kairos-core types.
//!
//! These tests use proptest to verify invariants across many randomly generated inputs.

use proptest::prelude::*;

use crate::{parse_version, ContainerImage, MatchPredicate, SortMode, VersionConstraint};

/// Strategy for generating registry hosts.
fn registry_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-z]{3,8}\\.(io|com|dev)",
        "[a-z]{3,8}\\.[a-z]{3,8}\\.(io|com):[0-9]{4}",
        Just("localhost:5000".to_string()),
    ]
}

/// Strategy for generating image names of one to three components.
fn name_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec("[a-z][a-z0-9-]{1,10}", 1..=3).prop_map(|parts| parts.join("/"))
}

/// Strategy for generating tags.
fn tag_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9][a-zA-Z0-9._-]{0,15}"
}

/// Strategy for generating digests.
fn digest_strategy() -> impl Strategy<Value = String> {
    "sha256:[a-f0-9]{64}"
}

proptest! {
    #[test]
    fn prop_image_reference_components(
        registry in prop::option::of(registry_strategy()),
        name in name_strategy(),
        tag in prop::option::of(tag_strategy()),
        digest in prop::option::of(digest_strategy()),
    ) {
        let mut reference = String::new();
        if let Some(registry) = &registry {
            reference.push_str(registry);
            reference.push('/');
        }
        reference.push_str(&name);
        if let Some(tag) = &tag {
            reference.push(':');
            reference.push_str(tag);
        }
        if let Some(digest) = &digest {
            reference.push('@');
            reference.push_str(digest);
        }

        let image = ContainerImage::from_identifier(&reference).unwrap();
        prop_assert_eq!(&image.registry, &registry);
        prop_assert_eq!(&image.name, &name);
        prop_assert_eq!(&image.tag, &tag);
        prop_assert_eq!(&image.digest, &digest);
        prop_assert_eq!(image.to_string(), reference);
    }

    #[test]
    fn prop_sort_mode_names_are_canonical(
        mode in prop_oneof![
            Just(SortMode::Lexical),
            Just(SortMode::SemVer),
            Just(SortMode::Chronological),
        ]
    ) {
        prop_assert_eq!(SortMode::parse(mode.as_str()).unwrap(), mode);
        prop_assert_eq!(SortMode::parse(&mode.as_str().to_uppercase()).unwrap(), mode);
    }

    #[test]
    fn prop_ignored_tags_are_never_accepted(
        tags in prop::collection::vec(tag_strategy(), 1..20),
        pick in any::<prop::sample::Index>(),
    ) {
        let ignored = pick.get(&tags).clone();
        let constraint = VersionConstraint::new(SortMode::Lexical).with_ignore([ignored.clone()]);

        prop_assert!(!constraint.accepts(&ignored));
        for tag in tags.iter().filter(|t| **t != ignored) {
            prop_assert!(constraint.accepts(tag));
        }
    }

    #[test]
    fn prop_anchored_regex_matches_prefix(prefix in "[a-z]{1,5}", tag in tag_strategy()) {
        let predicate = MatchPredicate::regex(&format!("^{prefix}")).unwrap();
        prop_assert_eq!(predicate.matches(&tag), tag.starts_with(&prefix));
    }

    #[test]
    fn prop_v_prefix_is_tolerated(major in 0u64..100, minor in 0u64..100, patch in 0u64..100) {
        let plain = format!("{major}.{minor}.{patch}");
        let prefixed = format!("v{plain}");
        prop_assert_eq!(parse_version(&plain), parse_version(&prefixed));
        prop_assert!(parse_version(&plain).is_some());
    }
}

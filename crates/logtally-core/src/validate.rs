//! Id-set validity check.
//!
//! A record is valid when its `event_type` is a recognised [`RequestKind`]
//! and the set of ids in its `ids` array equals the set of ids carried by
//! `id=` chunks of its query string. Order and duplicates do not matter on
//! either side.

use std::collections::BTreeSet;
use std::num::ParseIntError;

use crate::record::{Record, RequestKind, Validity};

/// Prefix of a query chunk that carries an id.
pub const ID_PREFIX: &str = "id=";

/// An `id=` chunk whose suffix is not a base-10 `i64`.
///
/// This is a malformed record, not an invalid one.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed id fragment 'id={fragment}': {source}")]
pub struct IdFragmentError {
    /// The text after `id=`.
    pub fragment: String,
    pub source: ParseIntError,
}

/// Collect the ids carried by `id=` chunks of a query string.
///
/// Chunks are separated by `&`. A chunk counts only if it starts with the
/// exact prefix `id=` and has at least one character after it; every other
/// chunk is an unrelated query parameter and is skipped. Whitespace around
/// the number is ignored.
///
/// # Errors
///
/// Returns [`IdFragmentError`] on the first `id=` suffix that does not parse
/// as an integer.
pub fn query_ids(query_string: &str) -> Result<BTreeSet<i64>, IdFragmentError> {
    let mut ids = BTreeSet::new();
    for chunk in query_string.split('&') {
        let Some(raw) = chunk.strip_prefix(ID_PREFIX) else {
            continue;
        };
        if raw.is_empty() {
            continue;
        }
        let id = raw.trim().parse::<i64>().map_err(|source| IdFragmentError {
            fragment: raw.to_string(),
            source,
        })?;
        ids.insert(id);
    }
    Ok(ids)
}

/// Classify one record as valid or non-valid.
///
/// Records with an unrecognised `event_type` are non-valid without looking
/// at their ids, so a bad `id=` fragment on such a record is not an error.
///
/// # Errors
///
/// Returns [`IdFragmentError`] if the record has a recognised kind and its
/// query string contains a malformed `id=` fragment.
pub fn validate(record: &Record) -> Result<Validity, IdFragmentError> {
    if record.event_type.parse::<RequestKind>().is_err() {
        return Ok(Validity::NonValid);
    }

    let from_query = query_ids(&record.query_string)?;
    let from_body: BTreeSet<i64> = record.ids.iter().copied().collect();
    Ok(Validity::from(from_query == from_body))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(event_type: &str, ids: &[i64], query_string: &str) -> Record {
        Record {
            timestamp: 1_525_392_515,
            event_type: event_type.into(),
            ids: ids.to_vec(),
            query_string: query_string.into(),
        }
    }

    #[test]
    fn exact_match_is_valid() {
        let r = record(
            "delete",
            &[7, 3, 9],
            "btksf=btksf&id=3&id=7&id=9&dabbq=dabbq&wtcbd=wtcbd",
        );
        assert_eq!(validate(&r), Ok(Validity::Valid));
    }

    #[test]
    fn id_set_mismatch_is_non_valid() {
        let r = record(
            "create",
            &[7, 6, 5, 4, 8, 1],
            "id=19&id=15&ohxhi=ohxhi&id=12&id=16&id=13&nabao=nabao&id=18&id=14&zanhw=zanhw&id=20",
        );
        assert_eq!(validate(&r), Ok(Validity::NonValid));
    }

    #[test]
    fn query_duplicates_collapse() {
        let r = record("update", &[1, 2], "id=1&id=1&id=2");
        assert_eq!(validate(&r), Ok(Validity::Valid));
    }

    #[test]
    fn body_duplicates_collapse() {
        let r = record("update", &[2, 1, 2, 2], "id=2&id=1");
        assert_eq!(validate(&r), Ok(Validity::Valid));
    }

    #[test]
    fn empty_sets_are_equal() {
        assert_eq!(validate(&record("create", &[], "")), Ok(Validity::Valid));
        assert_eq!(
            validate(&record("create", &[], "foo=bar&baz=qux")),
            Ok(Validity::Valid)
        );
    }

    #[test]
    fn subset_is_non_valid() {
        let r = record("create", &[1, 2, 3], "id=1&id=2");
        assert_eq!(validate(&r), Ok(Validity::NonValid));
        let r = record("create", &[1], "id=1&id=2");
        assert_eq!(validate(&r), Ok(Validity::NonValid));
    }

    #[test]
    fn unrecognized_kind_is_non_valid_regardless_of_ids() {
        let r = record("cancel", &[1, 2], "id=1&id=2");
        assert_eq!(validate(&r), Ok(Validity::NonValid));
    }

    #[test]
    fn unrecognized_kind_skips_id_parsing() {
        let r = record("cancel", &[1], "id=abc");
        assert_eq!(validate(&r), Ok(Validity::NonValid));
    }

    #[test]
    fn malformed_fragment_is_an_error_not_non_valid() {
        let r = record("create", &[1], "id=1&id=abc");
        let err = validate(&r).expect_err("should fail");
        assert_eq!(err.fragment, "abc");
        assert!(err.to_string().contains("id=abc"));
    }

    #[test]
    fn bare_prefix_contributes_nothing() {
        let ids = query_ids("id=&id=5").expect("parse");
        assert_eq!(ids.into_iter().collect::<Vec<_>>(), vec![5]);
    }

    #[test]
    fn near_miss_prefixes_are_ignored() {
        let ids = query_ids("xid=1&ID=2& id=3&uid=4&id=5").expect("parse");
        assert_eq!(ids.into_iter().collect::<Vec<_>>(), vec![5]);
    }

    #[test]
    fn negative_and_large_ids_parse() {
        let ids = query_ids("id=-4&id=9223372036854775807").expect("parse");
        assert!(ids.contains(&-4));
        assert!(ids.contains(&i64::MAX));
    }

    #[test]
    fn overflowing_id_is_malformed() {
        let err = query_ids("id=9223372036854775808").expect_err("overflow");
        assert_eq!(err.fragment, "9223372036854775808");
    }

    #[test]
    fn whitespace_around_id_is_trimmed() {
        let ids = query_ids("id= 5&id=7 &id=\t9\n").expect("parse");
        assert_eq!(ids.into_iter().collect::<Vec<_>>(), vec![5, 7, 9]);
    }

    #[test]
    fn whitespace_only_id_is_malformed() {
        let err = query_ids("id=  ").expect_err("no digits");
        assert_eq!(err.fragment, "  ");
    }
}

//! Structural equality used to decide whether something really changed.
//!
//! Collections are compared order-independently under a natural key, so a
//! reordered list or a new field that doesn't affect the key is not treated
//! as a change. Inputs are small; the quadratic comparisons are deliberate.

use chrono::{DateTime, DurationRound, TimeDelta, Utc};

use crate::types::{Breadcrumb, ChildReference, ImageSize, PhotoMetadata};

/// Compare two timestamps at minute precision.
pub fn dates_equal(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => truncate_to_minute(a) == truncate_to_minute(b),
        (None, None) => true,
        _ => false,
    }
}

fn truncate_to_minute(date: DateTime<Utc>) -> DateTime<Utc> {
    date.duration_trunc(TimeDelta::minutes(1)).unwrap_or(date)
}

/// Fixed-point form of a decimal-degree coordinate at 3 decimal places.
pub fn normalize_coordinate(degrees: f64) -> i64 {
    (degrees * 1000.0).round() as i64
}

/// Compare two `(latitude, longitude)` pairs after normalization.
pub fn coordinates_equal(a: Option<(f64, f64)>, b: Option<(f64, f64)>) -> bool {
    match (a, b) {
        (Some((lat_a, lon_a)), Some((lat_b, lon_b))) => {
            normalize_coordinate(lat_a) == normalize_coordinate(lat_b)
                && normalize_coordinate(lon_a) == normalize_coordinate(lon_b)
        }
        (None, None) => true,
        _ => false,
    }
}

/// Multiset equality of two slices under `key`, ignoring order.
pub fn collections_equal_by<T, K, F>(a: &[T], b: &[T], key: F) -> bool
where
    K: PartialEq,
    F: Fn(&T) -> K,
{
    if a.len() != b.len() {
        return false;
    }
    let keys_b: Vec<K> = b.iter().map(&key).collect();
    let mut matched = vec![false; keys_b.len()];
    a.iter().all(|item| {
        let k = key(item);
        match keys_b
            .iter()
            .enumerate()
            .find(|(i, kb)| !matched[*i] && **kb == k)
        {
            Some((i, _)) => {
                matched[i] = true;
                true
            }
            None => false,
        }
    })
}

pub fn image_sizes_equal(a: &[ImageSize], b: &[ImageSize]) -> bool {
    collections_equal_by(a, b, |s| (s.width, s.height))
}

pub fn metadata_equal(a: &[PhotoMetadata], b: &[PhotoMetadata]) -> bool {
    collections_equal_by(a, b, |m| (m.name.clone(), m.value.clone()))
}

pub fn keywords_equal(a: &[String], b: &[String]) -> bool {
    collections_equal_by(a, b, |k| k.clone())
}

/// Breadcrumbs match on path and title.
pub fn breadcrumbs_equal(a: &[Breadcrumb], b: &[Breadcrumb]) -> bool {
    collections_equal_by(a, b, |c| (c.path.clone(), c.title.clone()))
}

/// Child references match on path alone.
pub fn children_equal(a: &[ChildReference], b: &[ChildReference]) -> bool {
    collections_equal_by(a, b, |c| c.path.clone())
}

//! Image collection manager.
//!
//! Pure list operations over a property's images. Every function here leaves
//! the list in the shape the rest of the platform reads back without repair:
//!
//! - `order` is exactly `1..=N`, matching list position.
//! - When `N > 0`, exactly one image has `is_cover`.
//!
//! Each mutating operation finishes with [`resequence`] and
//! [`reconcile_cover`] rather than patching cover state by hand. File removal
//! is the caller's business: operations that drop images hand them back so
//! the service can delete their files after the record is saved.

use crate::ingest::ValidationError;
use crate::types::StoredImage;
use std::collections::{HashMap, HashSet};

/// Assign `order = position + 1` to every image.
pub fn resequence(images: &mut [StoredImage]) {
    for (idx, img) in images.iter_mut().enumerate() {
        img.order = idx as u32 + 1;
    }
}

/// Restore the single-cover invariant.
///
/// - no cover: the first image by order becomes cover
/// - several covers: the lowest-order one keeps it
/// - empty list: nothing to do
pub fn reconcile_cover(images: &mut [StoredImage]) {
    let keep = images
        .iter()
        .enumerate()
        .filter(|(_, img)| img.is_cover)
        .min_by_key(|(_, img)| img.order)
        .map(|(idx, _)| idx)
        .or_else(|| {
            images
                .iter()
                .enumerate()
                .min_by_key(|(_, img)| img.order)
                .map(|(idx, _)| idx)
        });
    for (idx, img) in images.iter_mut().enumerate() {
        img.is_cover = Some(idx) == keep;
    }
}

fn finish(images: &mut [StoredImage]) {
    resequence(images);
    reconcile_cover(images);
}

/// Initial list for a new property: upload order, first image is cover.
pub fn create(mut images: Vec<StoredImage>) -> Vec<StoredImage> {
    for img in &mut images {
        img.is_cover = false;
    }
    finish(&mut images);
    images
}

/// Result of merging a retained subset with new uploads.
#[derive(Debug, Clone, PartialEq)]
pub struct Merge {
    pub images: Vec<StoredImage>,
    /// Previously stored images that were not retained.
    pub removed: Vec<StoredImage>,
}

/// Check a retained-URL list against the current images without changing
/// anything.
pub fn check_retained(existing: &[StoredImage], retained_urls: &[String]) -> Result<(), ValidationError> {
    let known: HashSet<&str> = existing.iter().map(|img| img.url.as_str()).collect();
    let mut seen = HashSet::new();
    for url in retained_urls {
        if !known.contains(url.as_str()) {
            return Err(ValidationError::UnknownRetainedImage(url.clone()));
        }
        if !seen.insert(url.as_str()) {
            return Err(ValidationError::DuplicateRetainedImage(url.clone()));
        }
    }
    Ok(())
}

/// Replace the list with `retained_urls` (in the given order) followed by
/// `new_images`.
///
/// Cover goes to the first retained image, or the first new image when
/// nothing is retained.
pub fn merge_retained(
    existing: Vec<StoredImage>,
    retained_urls: &[String],
    new_images: Vec<StoredImage>,
) -> Result<Merge, ValidationError> {
    check_retained(&existing, retained_urls)?;

    let mut by_url: HashMap<String, StoredImage> = existing
        .into_iter()
        .map(|img| (img.url.clone(), img))
        .collect();

    let mut images: Vec<StoredImage> = retained_urls
        .iter()
        .filter_map(|url| by_url.remove(url))
        .chain(new_images)
        .collect();
    for img in &mut images {
        img.is_cover = false;
    }
    finish(&mut images);

    let mut removed: Vec<StoredImage> = by_url.into_values().collect();
    removed.sort_by_key(|img| img.order);
    Ok(Merge { images, removed })
}

/// Append a batch. The existing cover stays; the first new image becomes
/// cover only if the list was empty.
pub fn append(images: &mut Vec<StoredImage>, new_images: Vec<StoredImage>) {
    let had_images = !images.is_empty();
    images.extend(new_images.into_iter().map(|mut img| {
        if had_images {
            img.is_cover = false;
        }
        img
    }));
    finish(images);
}

/// Remove one image by id and return it. Remaining images are
/// re-sequenced; if the cover was removed the new first image takes over.
pub fn remove(images: &mut Vec<StoredImage>, image_id: &str) -> Option<StoredImage> {
    let idx = images.iter().position(|img| img.id == image_id)?;
    let removed = images.remove(idx);
    finish(images);
    Some(removed)
}

/// Make `image_id` the only cover. Returns `false`, leaving the list
/// unchanged, if the id is absent.
pub fn set_cover(images: &mut [StoredImage], image_id: &str) -> bool {
    if !images.iter().any(|img| img.id == image_id) {
        return false;
    }
    for img in images.iter_mut() {
        img.is_cover = img.id == image_id;
    }
    true
}

/// Reorder to follow `ordered_ids`, which must be a permutation of the
/// current ids. The cover flag stays on whichever image held it.
pub fn reorder(images: &mut Vec<StoredImage>, ordered_ids: &[String]) -> Result<(), ValidationError> {
    if ordered_ids.len() != images.len() {
        return Err(ValidationError::MalformedReorder(format!(
            "expected {} ids, got {}",
            images.len(),
            ordered_ids.len()
        )));
    }

    let mut positions: HashMap<&str, usize> = HashMap::with_capacity(ordered_ids.len());
    for (pos, id) in ordered_ids.iter().enumerate() {
        if positions.insert(id.as_str(), pos).is_some() {
            return Err(ValidationError::MalformedReorder(format!("duplicate id {id}")));
        }
    }
    if let Some(missing) = images.iter().find(|img| !positions.contains_key(img.id.as_str())) {
        return Err(ValidationError::MalformedReorder(format!(
            "id {} missing from list",
            missing.id
        )));
    }

    images.sort_by_key(|img| positions.get(img.id.as_str()).copied().unwrap_or(usize::MAX));
    finish(images);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{assert_invariants, sample_image};

    fn list(ids: &[&str], cover: &str) -> Vec<StoredImage> {
        ids.iter()
            .enumerate()
            .map(|(i, id)| sample_image(id, i as u32 + 1, *id == cover))
            .collect()
    }

    fn ids(images: &[StoredImage]) -> Vec<&str> {
        images.iter().map(|i| i.id.as_str()).collect()
    }

    fn cover(images: &[StoredImage]) -> Option<&str> {
        images.iter().find(|i| i.is_cover).map(|i| i.id.as_str())
    }

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn url(id: &str) -> String {
        format!("/uploads/{id}.jpg")
    }

    // =========================================================================
    // reconcile_cover
    // =========================================================================

    #[test]
    fn reconcile_picks_first_when_none() {
        let mut images = list(&["a", "b"], "");
        reconcile_cover(&mut images);
        assert_eq!(cover(&images), Some("a"));
    }

    #[test]
    fn reconcile_keeps_lowest_order_of_many() {
        let mut images = list(&["a", "b", "c"], "");
        images[1].is_cover = true;
        images[2].is_cover = true;
        reconcile_cover(&mut images);
        assert_eq!(cover(&images), Some("b"));
        assert_invariants(&images);
    }

    #[test]
    fn reconcile_empty_is_noop() {
        let mut images: Vec<StoredImage> = Vec::new();
        reconcile_cover(&mut images);
        assert!(images.is_empty());
    }

    // =========================================================================
    // create / append
    // =========================================================================

    #[test]
    fn scenario_a_create_three() {
        let images = create(list(&["1", "2", "3"], ""));
        assert_eq!(images.iter().map(|i| i.order).collect::<Vec<_>>(), [1, 2, 3]);
        assert_eq!(cover(&images), Some("1"));
    }

    #[test]
    fn create_ignores_incoming_cover_flags() {
        let images = create(list(&["1", "2"], "2"));
        assert_eq!(cover(&images), Some("1"));
    }

    #[test]
    fn append_keeps_existing_cover() {
        let mut images = list(&["a", "b"], "b");
        append(&mut images, vec![sample_image("c", 1, true), sample_image("d", 2, false)]);
        assert_eq!(ids(&images), ["a", "b", "c", "d"]);
        assert_eq!(cover(&images), Some("b"));
        assert_invariants(&images);
    }

    #[test]
    fn append_to_empty_makes_first_new_cover() {
        let mut images = Vec::new();
        append(&mut images, vec![sample_image("x", 1, false), sample_image("y", 2, false)]);
        assert_eq!(cover(&images), Some("x"));
        assert_invariants(&images);
    }

    // =========================================================================
    // merge_retained
    // =========================================================================

    #[test]
    fn scenario_b_retain_b_add_c() {
        let existing = list(&["A", "B"], "A");
        let merge = merge_retained(existing, &[url("B")], vec![sample_image("C", 1, true)]).unwrap();
        assert_eq!(ids(&merge.images), ["B", "C"]);
        assert_eq!(cover(&merge.images), Some("B"));
        assert_eq!(merge.images[0].order, 1);
        assert_eq!(merge.images[1].order, 2);
        assert_eq!(ids(&merge.removed), ["A"]);
    }

    #[test]
    fn merge_preserves_client_order() {
        let existing = list(&["a", "b", "c", "d"], "a");
        let retained = vec![url("d"), url("b"), url("c")];
        let merge = merge_retained(existing, &retained, Vec::new()).unwrap();
        assert_eq!(ids(&merge.images), ["d", "b", "c"]);
        assert_eq!(cover(&merge.images), Some("d"));
        assert_invariants(&merge.images);
    }

    #[test]
    fn merge_with_nothing_retained_covers_first_new() {
        let existing = list(&["a", "b"], "a");
        let merge = merge_retained(
            existing,
            &[],
            vec![sample_image("n1", 1, false), sample_image("n2", 2, false)],
        )
        .unwrap();
        assert_eq!(ids(&merge.images), ["n1", "n2"]);
        assert_eq!(cover(&merge.images), Some("n1"));
        assert_eq!(ids(&merge.removed), ["a", "b"]);
    }

    #[test]
    fn merge_to_empty_is_legal() {
        let merge = merge_retained(list(&["a"], "a"), &[], Vec::new()).unwrap();
        assert!(merge.images.is_empty());
        assert_eq!(merge.removed.len(), 1);
    }

    #[test]
    fn merge_rejects_unknown_url() {
        let err = merge_retained(list(&["a"], "a"), &[url("zzz")], Vec::new()).unwrap_err();
        assert_eq!(err, ValidationError::UnknownRetainedImage(url("zzz")));
    }

    #[test]
    fn merge_rejects_duplicate_url() {
        let err = merge_retained(list(&["a", "b"], "a"), &[url("a"), url("a")], Vec::new()).unwrap_err();
        assert_eq!(err, ValidationError::DuplicateRetainedImage(url("a")));
    }

    // =========================================================================
    // remove
    // =========================================================================

    #[test]
    fn scenario_c_delete_middle() {
        let mut images = list(&["A", "B", "C"], "A");
        let removed = remove(&mut images, "B").unwrap();
        assert_eq!(removed.id, "B");
        assert_eq!(ids(&images), ["A", "C"]);
        assert_eq!(images[1].order, 2);
        assert_eq!(cover(&images), Some("A"));
    }

    #[test]
    fn deleting_cover_promotes_new_first() {
        for n in 2..=5 {
            let names: Vec<String> = (0..n).map(|i| format!("i{i}")).collect();
            let refs: Vec<&str> = names.iter().map(String::as_str).collect();
            let mut images = list(&refs, "i0");
            remove(&mut images, "i0");
            assert_eq!(images.len(), n - 1);
            assert_eq!(cover(&images), Some("i1"));
            assert_invariants(&images);
        }
    }

    #[test]
    fn deleting_last_image_leaves_empty_list() {
        let mut images = list(&["only"], "only");
        assert!(remove(&mut images, "only").is_some());
        assert!(images.is_empty());
    }

    #[test]
    fn remove_unknown_id_changes_nothing() {
        let mut images = list(&["a", "b"], "a");
        let before = images.clone();
        assert!(remove(&mut images, "nope").is_none());
        assert_eq!(images, before);
    }

    // =========================================================================
    // set_cover
    // =========================================================================

    #[test]
    fn set_cover_moves_flag() {
        let mut images = list(&["a", "b", "c"], "a");
        assert!(set_cover(&mut images, "c"));
        assert_eq!(cover(&images), Some("c"));
        assert_invariants(&images);
    }

    #[test]
    fn set_cover_is_idempotent() {
        let mut once = list(&["a", "b", "c"], "a");
        set_cover(&mut once, "b");
        let mut twice = once.clone();
        set_cover(&mut twice, "b");
        assert_eq!(once, twice);
    }

    #[test]
    fn set_cover_unknown_id_is_rejected() {
        let mut images = list(&["a", "b"], "a");
        let before = images.clone();
        assert!(!set_cover(&mut images, "zzz"));
        assert_eq!(images, before);
    }

    // =========================================================================
    // reorder
    // =========================================================================

    fn permutations(items: &[&'static str]) -> Vec<Vec<&'static str>> {
        if items.len() <= 1 {
            return vec![items.to_vec()];
        }
        let mut out = Vec::new();
        for i in 0..items.len() {
            let mut rest = items.to_vec();
            let head = rest.remove(i);
            for mut tail in permutations(&rest) {
                tail.insert(0, head);
                out.push(tail);
            }
        }
        out
    }

    #[test]
    fn every_permutation_reorders_and_keeps_cover() {
        let base = ["a", "b", "c", "d"];
        for cover_id in base {
            for perm in permutations(&base) {
                let mut images = list(&base, cover_id);
                reorder(&mut images, &strings(&perm)).unwrap();
                assert_eq!(ids(&images), perm);
                assert_eq!(cover(&images), Some(cover_id));
                assert_invariants(&images);
            }
        }
    }

    #[test]
    fn reorder_size_mismatch_changes_nothing() {
        let mut images = list(&["a", "b", "c"], "a");
        let before = images.clone();
        assert!(matches!(
            reorder(&mut images, &strings(&["c", "a"])),
            Err(ValidationError::MalformedReorder(_))
        ));
        assert_eq!(images, before);
    }

    #[test]
    fn reorder_duplicate_changes_nothing() {
        let mut images = list(&["a", "b", "c"], "a");
        let before = images.clone();
        assert!(reorder(&mut images, &strings(&["a", "a", "b"])).is_err());
        assert_eq!(images, before);
    }

    #[test]
    fn reorder_unknown_id_changes_nothing() {
        let mut images = list(&["a", "b", "c"], "a");
        let before = images.clone();
        let err = reorder(&mut images, &strings(&["a", "b", "x"])).unwrap_err();
        assert!(err.to_string().contains("c"));
        assert_eq!(images, before);
    }

    #[test]
    fn reorder_empty_list() {
        let mut images: Vec<StoredImage> = Vec::new();
        assert!(reorder(&mut images, &[]).is_ok());
    }
}

use std::collections::{BTreeSet, HashMap};

use url::Url;

use super::model::{Diff, DiffId, Region, RegionId, RegionKind};

/// The central table of all regions and their diffs.
///
/// Pure bookkeeping: callers are responsible for the overlap and emptiness
/// invariants before calling in.
#[derive(Debug, Default)]
pub struct RegionStore {
    regions: HashMap<RegionId, Region>,
    by_document: HashMap<Url, BTreeSet<RegionId>>,
    diff_owner: HashMap<DiffId, RegionId>,
    next_region_id: u64,
    next_diff_id: u64,
}

impl RegionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an id and insert a region.
    pub fn create(
        &mut self,
        document: &Url,
        start_line: usize,
        end_line: usize,
        kind: RegionKind,
    ) -> RegionId {
        self.next_region_id += 1;
        let id = RegionId(self.next_region_id);
        self.insert(Region {
            id,
            document: document.clone(),
            start_line,
            end_line,
            kind,
        });
        id
    }

    /// Re-insert a region under its existing id (snapshot restore).
    pub fn restore(&mut self, region: Region) {
        self.next_region_id = self.next_region_id.max(region.id.0);
        self.insert(region);
    }

    fn insert(&mut self, region: Region) {
        if let RegionKind::EditZone(zone) = &region.kind {
            for diff_id in zone.diffs.keys() {
                self.diff_owner.insert(*diff_id, region.id);
            }
        }
        self.by_document
            .entry(region.document.clone())
            .or_default()
            .insert(region.id);
        self.regions.insert(region.id, region);
    }

    /// Remove a region and cascade-delete its diffs.
    pub fn delete(&mut self, id: RegionId) -> Option<Region> {
        let region = self.regions.remove(&id)?;
        if let Some(ids) = self.by_document.get_mut(&region.document) {
            ids.remove(&id);
            if ids.is_empty() {
                self.by_document.remove(&region.document);
            }
        }
        if let RegionKind::EditZone(zone) = &region.kind {
            for diff_id in zone.diffs.keys() {
                self.diff_owner.remove(diff_id);
            }
        }
        Some(region)
    }

    /// Remove every region of a document.
    pub fn clear_document(&mut self, document: &Url) -> Vec<Region> {
        self.regions_of(document)
            .into_iter()
            .filter_map(|id| self.delete(id))
            .collect()
    }

    /// Ids of the regions on a document, in creation order.
    pub fn regions_of(&self, document: &Url) -> Vec<RegionId> {
        self.by_document
            .get(document)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn get(&self, id: RegionId) -> Option<&Region> {
        self.regions.get(&id)
    }

    pub fn get_mut(&mut self, id: RegionId) -> Option<&mut Region> {
        self.regions.get_mut(&id)
    }

    pub fn contains(&self, id: RegionId) -> bool {
        self.regions.contains_key(&id)
    }

    /// Regions of a document, in creation order.
    pub fn iter_document<'a>(&'a self, document: &Url) -> impl Iterator<Item = &'a Region> + 'a {
        self.by_document
            .get(document)
            .into_iter()
            .flatten()
            .filter_map(|id| self.regions.get(id))
    }

    /// Allocate a fresh diff id.
    pub fn allocate_diff_id(&mut self) -> DiffId {
        self.next_diff_id += 1;
        DiffId(self.next_diff_id)
    }

    /// Attach a diff to its edit zone. Returns false if the region is not a live edit zone.
    pub fn insert_diff(&mut self, diff: Diff) -> bool {
        let Some(zone) = self
            .regions
            .get_mut(&diff.region)
            .and_then(Region::as_edit_zone_mut)
        else {
            return false;
        };
        self.diff_owner.insert(diff.id, diff.region);
        zone.diffs.insert(diff.id, diff);
        true
    }

    pub fn remove_diff(&mut self, id: DiffId) -> Option<Diff> {
        let region_id = self.diff_owner.remove(&id)?;
        self.regions
            .get_mut(&region_id)
            .and_then(Region::as_edit_zone_mut)
            .and_then(|zone| zone.diffs.remove(&id))
    }

    /// Drop all diffs of an edit zone.
    pub fn clear_diffs(&mut self, region: RegionId) -> Vec<Diff> {
        let Some(zone) = self
            .regions
            .get_mut(&region)
            .and_then(Region::as_edit_zone_mut)
        else {
            return Vec::new();
        };
        let diffs: Vec<Diff> = std::mem::take(&mut zone.diffs).into_values().collect();
        for diff in &diffs {
            self.diff_owner.remove(&diff.id);
        }
        diffs
    }

    pub fn region_of_diff(&self, id: DiffId) -> Option<RegionId> {
        self.diff_owner.get(&id).copied()
    }

    pub fn diff(&self, id: DiffId) -> Option<&Diff> {
        let region = self.region_of_diff(id)?;
        self.regions.get(&region)?.as_edit_zone()?.diffs.get(&id)
    }

    pub fn diff_mut(&mut self, id: DiffId) -> Option<&mut Diff> {
        let region = self.region_of_diff(id)?;
        self.regions
            .get_mut(&region)?
            .as_edit_zone_mut()?
            .diffs
            .get_mut(&id)
    }

    /// Find an exclusive region on `document` overlapping `[start_line, end_line]`.
    pub fn find_overlapping(
        &self,
        document: &Url,
        start_line: usize,
        end_line: usize,
        ignore: &[RegionId],
    ) -> Option<RegionId> {
        self.iter_document(document)
            .filter(|r| r.is_exclusive() && !ignore.contains(&r.id))
            .find(|r| r.overlaps(start_line, end_line))
            .map(|r| r.id)
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::DiffKind;
    use crate::region::model::{EditZone, EditorId, PromptZone};

    fn test_uri(name: &str) -> Url {
        Url::parse(&format!("file:///test/{}.rs", name)).unwrap()
    }

    fn diff(store: &mut RegionStore, region: RegionId) -> Diff {
        Diff {
            id: store.allocate_diff_id(),
            region,
            kind: DiffKind::Edit,
            start_line: 1,
            end_line: 1,
            original_start_line: 1,
            original_end_line: 1,
            code: "new".into(),
            original_code: "old".into(),
            enabled: true,
        }
    }

    #[test]
    fn test_ids_are_monotonic() {
        let mut store = RegionStore::new();
        let uri = test_uri("ids");
        let a = store.create(&uri, 1, 2, RegionKind::EditZone(EditZone::new("")));
        let b = store.create(&uri, 3, 4, RegionKind::EditZone(EditZone::new("")));
        store.delete(a);
        let c = store.create(&uri, 5, 6, RegionKind::EditZone(EditZone::new("")));
        assert!(a < b && b < c, "ids must never be reused");
    }

    #[test]
    fn test_regions_are_indexed_per_document() {
        let mut store = RegionStore::new();
        let one = test_uri("one");
        let two = test_uri("two");
        let a = store.create(&one, 1, 1, RegionKind::EditZone(EditZone::new("")));
        let b = store.create(&two, 1, 1, RegionKind::EditZone(EditZone::new("")));

        assert_eq!(store.regions_of(&one), vec![a]);
        assert_eq!(store.regions_of(&two), vec![b]);

        store.clear_document(&one);
        assert!(store.regions_of(&one).is_empty());
        assert_eq!(store.regions_of(&two), vec![b]);
    }

    #[test]
    fn test_delete_cascades_diffs() {
        let mut store = RegionStore::new();
        let uri = test_uri("cascade");
        let region = store.create(&uri, 1, 3, RegionKind::EditZone(EditZone::new("old")));
        let d = diff(&mut store, region);
        let diff_id = d.id;
        assert!(store.insert_diff(d));
        assert_eq!(store.region_of_diff(diff_id), Some(region));

        store.delete(region);
        assert!(store.diff(diff_id).is_none());
        assert!(store.region_of_diff(diff_id).is_none());
    }

    #[test]
    fn test_insert_diff_rejects_non_edit_zones() {
        let mut store = RegionStore::new();
        let uri = test_uri("prompt");
        let prompt = store.create(
            &uri,
            1,
            1,
            RegionKind::PromptZone(PromptZone {
                editor: EditorId(1),
                linked_edit_zone: None,
                user_text: String::new(),
            }),
        );
        let d = diff(&mut store, prompt);
        assert!(!store.insert_diff(d));
    }

    #[test]
    fn test_find_overlapping_respects_ignore_list() {
        let mut store = RegionStore::new();
        let uri = test_uri("overlap");
        let a = store.create(&uri, 5, 10, RegionKind::EditZone(EditZone::new("")));
        assert_eq!(store.find_overlapping(&uri, 8, 12, &[]), Some(a));
        assert_eq!(store.find_overlapping(&uri, 8, 12, &[a]), None);
        assert_eq!(store.find_overlapping(&uri, 11, 12, &[]), None);
    }

    #[test]
    fn test_restore_keeps_id_and_advances_counter() {
        let mut store = RegionStore::new();
        let uri = test_uri("restore");
        let a = store.create(&uri, 1, 1, RegionKind::EditZone(EditZone::new("")));
        let region = store.delete(a).unwrap();
        store.restore(region);
        assert!(store.contains(a));
        let b = store.create(&uri, 2, 2, RegionKind::EditZone(EditZone::new("")));
        assert!(b > a);
    }
}

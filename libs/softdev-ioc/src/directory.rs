//! Published-name directory
//!
//! Resolves calc inputs and output targets to live records, and tracks
//! which calc records process when a source changes. Entries hold weak
//! references; a model owns its records.

use crate::error::{IocError, Result};
use crate::record::Record;
use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use std::sync::{Arc, Weak};

pub(crate) struct Directory {
    records: DashMap<String, Weak<Record>>,
    /// Source name -> calc records with a `CP` input on it
    watchers: DashMap<String, Vec<Weak<Record>>>,
}

fn same(weak: &Weak<Record>, record: &Arc<Record>) -> bool {
    std::ptr::eq(weak.as_ptr(), Arc::as_ptr(record))
}

impl Directory {
    pub(crate) fn new() -> Self {
        Self {
            records: DashMap::new(),
            watchers: DashMap::new(),
        }
    }

    pub(crate) fn insert(&self, record: &Arc<Record>) -> Result<()> {
        match self.records.entry(record.pv_name().to_string()) {
            MapEntry::Occupied(mut slot) => {
                if slot.get().strong_count() > 0 {
                    return Err(IocError::DuplicateName(record.pv_name().to_string()));
                }
                // Left behind by a model dropped without shutdown
                slot.insert(Arc::downgrade(record));
            },
            MapEntry::Vacant(slot) => {
                slot.insert(Arc::downgrade(record));
            },
        }
        Ok(())
    }

    /// Remove `record`'s entry, leaving a same-named entry of another record
    pub(crate) fn remove(&self, record: &Arc<Record>) {
        self.records
            .remove_if(record.pv_name(), |_, weak| same(weak, record));
    }

    pub(crate) fn lookup(&self, pv_name: &str) -> Option<Arc<Record>> {
        self.records.get(pv_name).and_then(|weak| weak.upgrade())
    }

    pub(crate) fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .records
            .iter()
            .filter(|entry| entry.value().strong_count() > 0)
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    /// Process `watcher` whenever `source` changes
    ///
    /// `source` need not exist yet.
    pub(crate) fn watch(&self, source: &str, watcher: &Arc<Record>) {
        let mut list = self.watchers.entry(source.to_string()).or_default();
        if !list.iter().any(|weak| same(weak, watcher)) {
            list.push(Arc::downgrade(watcher));
        }
    }

    pub(crate) fn unwatch(&self, watcher: &Arc<Record>) {
        self.watchers.retain(|_, list| {
            list.retain(|weak| !same(weak, watcher) && weak.strong_count() > 0);
            !list.is_empty()
        });
    }

    pub(crate) fn watchers(&self, source: &str) -> Vec<Arc<Record>> {
        self.watchers
            .get(source)
            .map(|list| list.iter().filter_map(Weak::upgrade).collect())
            .unwrap_or_default()
    }
}

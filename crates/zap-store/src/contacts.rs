use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;
use zap_core::ContactData;
use zap_core::jid::{fallback_name, normalize, phone_of};

/// Candidate names for one contact, as reported by the gateway.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactRecord {
    pub name: Option<String>,
    pub notify: Option<String>,
    pub verified_name: Option<String>,
}

impl ContactRecord {
    pub fn new(name: Option<&str>, notify: Option<&str>, verified_name: Option<&str>) -> Self {
        Self {
            name: clean(name),
            notify: clean(notify),
            verified_name: clean(verified_name),
        }
    }

    pub fn named(name: &str) -> Self {
        Self::new(Some(name), None, None)
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.notify.is_none() && self.verified_name.is_none()
    }

    /// Present fields in `update` overwrite, absent ones keep what we had.
    pub fn merge(&mut self, update: &ContactRecord) {
        if update.name.is_some() {
            self.name.clone_from(&update.name);
        }
        if update.notify.is_some() {
            self.notify.clone_from(&update.notify);
        }
        if update.verified_name.is_some() {
            self.verified_name.clone_from(&update.verified_name);
        }
    }

    /// Priority: name > notify > verified_name
    pub fn display_name(&self) -> Option<&str> {
        self.name
            .as_deref()
            .or(self.notify.as_deref())
            .or(self.verified_name.as_deref())
    }
}

impl From<&ContactData> for ContactRecord {
    fn from(contact: &ContactData) -> Self {
        Self::new(
            contact.name.as_deref(),
            contact.notify.as_deref(),
            contact.verified_name.as_deref(),
        )
    }
}

fn clean(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Every key one logical contact is stored under: raw id, canonical id and
/// phone number, for each of the given identifiers.
pub fn identity_keys<S: AsRef<str>>(ids: &[S]) -> Vec<String> {
    let mut keys: Vec<String> = Vec::new();
    for id in ids {
        let raw = id.as_ref().trim();
        for key in [raw.to_string(), normalize(raw), phone_of(raw)] {
            if !key.is_empty() && !keys.contains(&key) {
                keys.push(key);
            }
        }
    }
    keys
}

/// Last link of the name chain: a label synthesized from the id itself.
pub fn fallback_label(id: &str) -> String {
    let canonical = normalize(id);
    if canonical.is_empty() {
        fallback_name(id)
    } else {
        fallback_name(&canonical)
    }
}

/// Multi-key name store for one account.
///
/// Keys are kept ordered so the phone-number scan visits them in the same
/// order every time.
#[derive(Debug, Default)]
pub struct ContactDirectory {
    records: BTreeMap<String, ContactRecord>,
    push_names: BTreeMap<String, String>,
}

impl ContactDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.push_names.clear();
    }

    pub fn record(&self, key: &str) -> Option<&ContactRecord> {
        self.records.get(key)
    }

    /// Merge `partial` under every key derived from `ids`.
    pub fn merge<S: AsRef<str>>(&mut self, ids: &[S], partial: &ContactRecord) {
        if partial.is_empty() {
            return;
        }
        for key in identity_keys(ids) {
            self.records.entry(key).or_default().merge(partial);
        }
    }

    pub fn merge_contact(&mut self, contact: &ContactData) {
        let mut ids = vec![contact.jid.as_str()];
        ids.extend(contact.lid.as_deref());
        ids.extend(contact.phone_number.as_deref());
        self.merge(&ids, &ContactRecord::from(contact));
    }

    pub fn set_push_name(&mut self, id: &str, name: &str) {
        let name = name.trim();
        if name.is_empty() {
            return;
        }
        for key in identity_keys(&[id]) {
            self.push_names.insert(key, name.to_string());
        }
    }

    pub fn push_name(&self, id: &str) -> Option<&str> {
        [normalize(id), id.trim().to_string(), phone_of(id)]
            .iter()
            .filter(|key| !key.is_empty())
            .find_map(|key| self.push_names.get(key))
            .map(String::as_str)
    }

    /// True when a stored record with a usable name exists for `id` itself.
    pub fn has_entry(&self, id: &str) -> bool {
        self.exact(id).is_some()
    }

    /// The offline part of the resolution chain: exact keys, then any key
    /// sharing the phone number, then push names.
    pub fn lookup(&self, id: &str) -> Option<String> {
        self.exact(id)
            .or_else(|| self.by_phone(id))
            .or_else(|| self.push_name(id))
            .map(str::to_string)
    }

    /// Cache a live group subject under `id`, returning the cleaned name.
    pub fn remember_group_subject(&mut self, id: &str, subject: &str) -> Option<String> {
        let record = ContactRecord::named(subject);
        let name = record.name.clone()?;
        debug!(jid = %normalize(id), "Cached group subject");
        self.merge(&[id], &record);
        Some(name)
    }

    fn exact(&self, id: &str) -> Option<&str> {
        [normalize(id), id.trim().to_string()]
            .iter()
            .filter(|key| !key.is_empty())
            .find_map(|key| self.records.get(key).and_then(ContactRecord::display_name))
    }

    fn by_phone(&self, id: &str) -> Option<&str> {
        let phone = phone_of(id);
        if phone.is_empty() {
            return None;
        }
        self.records
            .iter()
            .filter(|(key, _)| phone_of(key) == phone)
            .find_map(|(_, record)| record.display_name())
    }
}

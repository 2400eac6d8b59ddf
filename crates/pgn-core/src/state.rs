//! Durable `channel id -> summary message id` mapping.
//!
//! The whole map is rewritten on every change. A missing file is created
//! empty, an unreadable one is treated as empty: losing history only costs a
//! duplicate post, refusing to start would cost every post.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use tracing::warn;

use crate::{
    domain::{ChannelId, MessageId},
    Result,
};

pub type MessageStateMap = BTreeMap<ChannelId, MessageId>;

#[derive(Debug)]
pub struct MessageStateStore {
    path: PathBuf,
    map: MessageStateMap,
}

impl MessageStateStore {
    /// Load the map from `path`, creating an empty file if it does not exist.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();

        if !path.exists() {
            let store = Self {
                path,
                map: MessageStateMap::new(),
            };
            if let Err(e) = store.save() {
                warn!(path = %store.path.display(), "error creating message ids file: {e}");
            }
            return store;
        }

        let map = match read_map(&path) {
            Ok(map) => map,
            Err(e) => {
                warn!(path = %path.display(), "error reading message ids file, starting empty: {e}");
                MessageStateMap::new()
            }
        };

        Self { path, map }
    }

    /// Overwrite the backing file with the full current mapping.
    pub fn save(&self) -> Result<()> {
        let mut txt = serde_json::to_string(&self.map)?;
        txt.push('\n');

        let tmp = tmp_path(&self.path);
        fs::write(&tmp, txt)?;
        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    pub fn get(&self, channel_id: &ChannelId) -> Option<&MessageId> {
        self.map.get(channel_id)
    }

    /// Record the live message for a channel. Returns true if the map changed.
    pub fn record(&mut self, channel_id: ChannelId, message_id: MessageId) -> bool {
        match self.map.insert(channel_id, message_id.clone()) {
            Some(prev) => prev != message_id,
            None => true,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ChannelId, &MessageId)> {
        self.map.iter()
    }
}

fn read_map(path: &Path) -> Result<MessageStateMap> {
    let txt = fs::read_to_string(path)?;
    if txt.trim().is_empty() {
        return Ok(MessageStateMap::new());
    }
    Ok(serde_json::from_str(&txt)?)
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_file_creates_empty_object() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("messageIDs.json");

        let store = MessageStateStore::load(&path);
        assert!(store.is_empty());
        assert_eq!(fs::read_to_string(&path).unwrap(), "{}\n");
    }

    #[test]
    fn load_corrupt_file_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("messageIDs.json");
        fs::write(&path, "{not json").unwrap();

        let store = MessageStateStore::load(&path);
        assert!(store.is_empty());
        // The corrupt file is left alone until the next successful change.
        assert_eq!(fs::read_to_string(&path).unwrap(), "{not json");
    }

    #[test]
    fn save_then_load_keeps_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("messageIDs.json");

        let mut store = MessageStateStore::load(&path);
        assert!(store.record("C2".into(), "M2".into()));
        assert!(store.record("C1".into(), "M1".into()));
        store.save().unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "{\"C1\":\"M1\",\"C2\":\"M2\"}\n"
        );
        assert!(!dir.path().join("messageIDs.json.tmp").exists());

        let reloaded = MessageStateStore::load(&path);
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.get(&"C1".into()), Some(&MessageId::from("M1")));
    }

    #[test]
    fn record_reports_whether_map_changed() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = MessageStateStore::load(dir.path().join("ids.json"));

        assert!(store.record("C1".into(), "M1".into()));
        assert!(!store.record("C1".into(), "M1".into()));
        assert!(store.record("C1".into(), "M2".into()));
        assert_eq!(store.get(&"C1".into()), Some(&MessageId::from("M2")));
    }

    #[test]
    fn save_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone").join("ids.json");

        let mut store = MessageStateStore::load(&path);
        store.record("C1".into(), "M1".into());
        assert!(store.save().is_err());
    }
}

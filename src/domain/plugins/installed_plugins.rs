use serde::{Deserialize, Serialize};

use super::plugin_info::PluginInfo;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("registry index {index} out of range (len {len})")]
pub struct IndexOutOfRange {
    pub index: usize,
    pub len: usize,
}

/// The installed-plugin document: `{ "pluginList": [ ... ] }`.
///
/// Indices returned by the lookups are positions in `plugin_list` and stay
/// valid only until the next `insert`/`delete_by_key` on the same snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledPlugins {
    #[serde(rename = "pluginList", default)]
    pub plugin_list: Vec<PluginInfo>,
}

impl InstalledPlugins {
    pub fn find_all(&self) -> &[PluginInfo] {
        &self.plugin_list
    }

    pub fn find_many_by_name(&self, name: &str) -> Vec<(usize, &PluginInfo)> {
        self.plugin_list
            .iter()
            .enumerate()
            .filter(|(_, p)| p.name == name)
            .collect()
    }

    /// First record with this name, removed ones included.
    pub fn find_one_by_name(&self, name: &str) -> Option<(usize, &PluginInfo)> {
        self.find_one(|p| p.name == name)
    }

    pub fn find_one_not_removed_by_name_and_optional_version(
        &self,
        name: &str,
        version: Option<&str>,
    ) -> Option<(usize, &PluginInfo)> {
        self.find_one(|p| {
            !p.is_removed
                && p.name == name
                && version.is_none_or(|v| v.is_empty() || p.version == v)
        })
    }

    fn find_one<F>(&self, predicate: F) -> Option<(usize, &PluginInfo)>
    where
        F: Fn(&PluginInfo) -> bool,
    {
        self.plugin_list
            .iter()
            .enumerate()
            .find(|(_, p)| predicate(p))
    }

    pub fn insert(&mut self, info: PluginInfo) -> usize {
        self.plugin_list.push(info);
        self.plugin_list.len() - 1
    }

    pub fn update(&mut self, index: usize, info: PluginInfo) -> Result<(), IndexOutOfRange> {
        let len = self.plugin_list.len();
        let slot = self
            .plugin_list
            .get_mut(index)
            .ok_or(IndexOutOfRange { index, len })?;
        *slot = info;
        Ok(())
    }

    pub fn delete_by_key(&mut self, index: usize) -> Result<PluginInfo, IndexOutOfRange> {
        if index >= self.plugin_list.len() {
            return Err(IndexOutOfRange {
                index,
                len: self.plugin_list.len(),
            });
        }
        Ok(self.plugin_list.remove(index))
    }

    pub fn persistent(&self) -> impl Iterator<Item = &PluginInfo> {
        self.plugin_list.iter().filter(|p| p.is_persist())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, version: &str, removed: bool) -> PluginInfo {
        PluginInfo {
            plugin_id: PluginInfo::local_id(name, version),
            name: name.into(),
            version: version.into(),
            is_removed: removed,
            ..Default::default()
        }
    }

    #[test]
    fn not_removed_lookup_skips_soft_deleted_and_pins_version() {
        let mut plugins = InstalledPlugins::default();
        plugins.insert(record("demo", "1.0", true));
        plugins.insert(record("demo", "2.0", false));

        let (idx, found) = plugins
            .find_one_not_removed_by_name_and_optional_version("demo", None)
            .unwrap();
        assert_eq!(idx, 1);
        assert_eq!(found.version, "2.0");

        assert!(plugins
            .find_one_not_removed_by_name_and_optional_version("demo", Some("1.0"))
            .is_none());
        assert_eq!(plugins.find_one_by_name("demo").unwrap().0, 0);
        assert_eq!(plugins.find_many_by_name("demo").len(), 2);
    }

    #[test]
    fn update_out_of_range_fails() {
        let mut plugins = InstalledPlugins::default();
        let err = plugins.update(3, record("x", "1", false)).unwrap_err();
        assert_eq!(err, IndexOutOfRange { index: 3, len: 0 });
    }

    #[test]
    fn delete_by_key_splices() {
        let mut plugins = InstalledPlugins::default();
        plugins.insert(record("a", "1", false));
        plugins.insert(record("b", "1", false));
        plugins.insert(record("c", "1", false));
        let removed = plugins.delete_by_key(1).unwrap();
        assert_eq!(removed.name, "b");
        let names: Vec<_> = plugins.find_all().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["a", "c"]);
    }
}

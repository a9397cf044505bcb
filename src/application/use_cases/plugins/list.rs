use crate::application::dto::plugins::PluginListRequest;
use crate::application::ports::control_plane::ControlPlane;
use crate::application::ports::installed_plugin_store::InstalledPluginStore;
use crate::application::use_cases::plugins::errors::PluginManagerError;
use crate::domain::plugins::{PluginInfo, platform};

pub struct ListPlugins<'a, S, C>
where
    S: InstalledPluginStore + ?Sized,
    C: ControlPlane + ?Sized,
{
    pub registry: &'a S,
    pub control_plane: &'a C,
}

impl<'a, S, C> ListPlugins<'a, S, C>
where
    S: InstalledPluginStore + ?Sized,
    C: ControlPlane + ?Sized,
{
    /// Installed plugins (`local`) or catalog entries for this machine's
    /// arch, optionally narrowed to one name. Removed records are skipped.
    pub async fn execute(
        &self,
        plugin_name: Option<&str>,
        local: bool,
    ) -> Result<Vec<PluginInfo>, PluginManagerError> {
        let name = plugin_name.filter(|n| !n.is_empty());
        let list = if local {
            let plugins = self
                .registry
                .load()
                .await
                .map_err(PluginManagerError::LoadInstalledPlugins)?;
            match name {
                Some(name) => plugins
                    .find_many_by_name(name)
                    .into_iter()
                    .map(|(_, info)| info.clone())
                    .collect(),
                None => plugins.find_all().to_vec(),
            }
        } else {
            let request = PluginListRequest {
                os_type: platform::current_os_type().to_string(),
                plugin_name: name.unwrap_or_default().to_string(),
                version: String::new(),
                arch: platform::current_arch().to_string(),
            };
            self.control_plane
                .list_plugins(&request)
                .await
                .map_err(PluginManagerError::GetOnlinePackageInfo)?
        };
        Ok(list.into_iter().filter(|info| !info.is_removed).collect())
    }
}

/// Fixed-width table with the columns printed by `--list`.
pub fn render_table(plugins: &[PluginInfo]) -> String {
    const HEADERS: [&str; 6] = ["Name", "Version", "Publisher", "OsType", "Arch", "PluginType"];
    let rows: Vec<[String; 6]> = plugins
        .iter()
        .map(|p| {
            [
                p.name.clone(),
                p.version.clone(),
                p.publisher.clone(),
                p.os_type.clone(),
                p.arch.clone(),
                p.plugin_type().as_str().to_string(),
            ]
        })
        .collect();

    let mut widths = HEADERS.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    let mut push_row = |cells: &mut dyn Iterator<Item = &str>| {
        let line = cells
            .zip(widths)
            .map(|(cell, width)| format!("{cell:<width$}"))
            .collect::<Vec<_>>()
            .join("  ");
        out.push_str(line.trim_end());
        out.push('\n');
    };
    push_row(&mut HEADERS.iter().copied());
    for row in &rows {
        push_row(&mut row.iter().map(String::as_str));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::plugins::PluginType;

    #[test]
    fn table_aligns_columns() {
        let plugins = vec![PluginInfo {
            name: "ecs_tool".into(),
            version: "1.0".into(),
            publisher: "aliyun".into(),
            os_type: "linux".into(),
            arch: "x64".into(),
            plugin_type: PluginType::Persist,
            ..Default::default()
        }];
        let table = render_table(&plugins);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("Name      Version"));
        assert!(lines[1].starts_with("ecs_tool  1.0"));
        assert!(lines[1].ends_with("Persist"));
    }
}

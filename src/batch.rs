//! Sequential generation of many items.
use crate::error::Result;
use crate::identity::TileParams;
use crate::item::ItemBuilder;
use crate::stac_operations;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ItemTask {
    pub href: String,
    pub output: PathBuf,
}

impl ItemTask {
    pub fn new(href: &str, output: PathBuf) -> Self {
        ItemTask {
            href: href.to_string(),
            output,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Default, PartialEq, Eq)]
pub struct ItemPlan {
    tasks: Vec<ItemTask>,
}

/// What happened to each task of an executed plan.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PlanReport {
    pub written: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
}

impl ItemPlan {
    pub fn new(tasks: Vec<ItemTask>) -> Self {
        Self { tasks }
    }

    pub fn tasks(&self) -> &[ItemTask] {
        &self.tasks
    }

    /// One task per href, each written to `<output_dir>/<item id>.json`.
    pub fn from_hrefs<S: AsRef<str>>(
        builder: &ItemBuilder,
        hrefs: &[S],
        output_dir: &Path,
    ) -> Result<Self> {
        let tasks = hrefs
            .iter()
            .map(|href| {
                let href = href.as_ref();
                let identity = builder.identify(href)?;
                Ok(ItemTask::new(
                    href,
                    output_dir.join(format!("{}.json", identity.id)),
                ))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { tasks })
    }

    /// Render an href for every tile location of one year.
    pub fn from_tiles<S: AsRef<str>>(
        builder: &ItemBuilder,
        version: &str,
        year: &str,
        locations: &[S],
        output_dir: &Path,
    ) -> Result<Self> {
        let hrefs = locations
            .iter()
            .map(|loc| builder.href_for(&TileParams::new(version, year, loc.as_ref())))
            .collect::<Result<Vec<_>>>()?;
        Self::from_hrefs(builder, &hrefs, output_dir)
    }

    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let plan: Self = serde_json::from_str(&content)?;
        Ok(plan)
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Run the tasks in order, stopping at the first failure. Existing
    /// outputs are left alone unless `overwrite` is set.
    pub async fn execute(&self, builder: &ItemBuilder, overwrite: bool) -> Result<PlanReport> {
        let mut report = PlanReport::default();
        for (i, task) in self.tasks.iter().enumerate() {
            if task.output.exists() && !overwrite {
                info!(output = %task.output.display(), "Output file already exists");
                report.skipped.push(task.output.clone());
                continue;
            }
            info!(task = i + 1, total = self.tasks.len(), href = %task.href, "Current task");

            let item = builder.create_item(&task.href).await?;
            let value = stac_operations::add_self_link(&item, &task.output)?;
            stac_operations::write_json(&value, &task.output)?;
            report.written.push(task.output.clone());
        }
        Ok(report)
    }
}

/// Hrefs or tile locations listed one per line; blank lines and `#` comments
/// are ignored.
pub fn read_list<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)?;
    let entries = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect();
    Ok(entries)
}

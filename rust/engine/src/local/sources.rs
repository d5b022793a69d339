// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! SCAD source files, fetched once and written into every fresh instance.

use crate::config::ScadSource;
use crate::error::{RenderError, Result};
use bytes::Bytes;
use std::path::{Component, Path};

#[derive(Debug, Clone, Default)]
pub struct SourceCache {
    files: Vec<(String, Bytes)>,
}

impl SourceCache {
    /// Fetch every named file from `source`. Names are deduplicated.
    pub async fn load(client: &reqwest::Client, source: &ScadSource, names: &[&str]) -> Result<Self> {
        let mut files: Vec<(String, Bytes)> = Vec::with_capacity(names.len());
        for name in names {
            if files.iter().any(|(existing, _)| existing == name) {
                continue;
            }
            check_relative(name)?;
            let content = match source {
                ScadSource::Http(base) => fetch(client, &format!("{}{}", base, name), name).await?,
                ScadSource::Directory(dir) => tokio::fs::read(dir.join(name))
                    .await
                    .map(Bytes::from)
                    .map_err(|e| RenderError::Init(format!("Failed to read {}: {}", name, e)))?,
            };
            tracing::debug!(file = %name, size = content.len(), "Cached SCAD source");
            files.push((name.to_string(), content));
        }
        Ok(Self { files })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.files.iter().any(|(n, _)| n == name)
    }

    pub fn covers<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> bool {
        names.into_iter().all(|name| self.contains(name))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub async fn write_into(&self, dir: &Path) -> Result<()> {
        for (name, content) in &self.files {
            let path = dir.join(name);
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, content).await?;
        }
        Ok(())
    }
}

async fn fetch(client: &reqwest::Client, url: &str, name: &str) -> Result<Bytes> {
    let resp = client
        .get(url)
        .send()
        .await
        .map_err(|e| RenderError::Init(format!("Failed to fetch {}: {}", name, e)))?;
    if !resp.status().is_success() {
        return Err(RenderError::Init(format!(
            "Failed to fetch {}: {}",
            name,
            resp.status().as_u16()
        )));
    }
    resp.bytes()
        .await
        .map_err(|e| RenderError::Init(format!("Failed to fetch {}: {}", name, e)))
}

/// Source names must stay inside the instance directory.
fn check_relative(name: &str) -> Result<()> {
    let ok = !name.is_empty()
        && Path::new(name)
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if ok {
        Ok(())
    } else {
        Err(RenderError::Init(format!("invalid SCAD file name '{}'", name)))
    }
}

//! Upstream registry and materialization.
//!
//! # Responsibilities
//! - Hold the member set of every service that currently has members
//! - Apply idempotent upsert/remove mutations
//! - Materialize: render and write the artifact, or delete it when empty
//!
//! # Design Decisions
//! - One registry-wide lock spans mutate + render + write, so a concurrent
//!   remove and upsert for the same service cannot interleave on disk
//! - An empty member set has no entry and no file
//! - Rendering failures leave the previous artifact untouched
//! - Filesystem failures do not roll back the in-memory mutation

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio::fs;
use tokio::sync::Mutex;

use crate::observability::metrics;
use crate::render::{RenderInput, Renderer};
use crate::upstream::member::{MemberSet, UpstreamMember};
use crate::upstream::target::ServiceTarget;

/// Filesystem failures while applying an artifact.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to delete {path}: {source}")]
    Delete {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// What materialization did to the filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Materialized {
    /// Artifact rendered and written.
    Written { path: PathBuf, members: usize },
    /// Member set empty: artifact removed (or already absent).
    Deleted { path: PathBuf },
    /// Rendering failed; nothing on disk changed.
    Skipped { path: PathBuf, reason: String },
}

impl Materialized {
    /// True when the proxy should be reloaded.
    pub fn changed_disk(&self) -> bool {
        !matches!(self, Materialized::Skipped { .. })
    }
}

/// Result of an upsert or remove.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    /// Whether the member set changed.
    pub changed: bool,
    pub materialized: Materialized,
}

struct RegistryEntry {
    target: ServiceTarget,
    members: MemberSet,
}

/// Per-service upstream state, guarded by a single lock.
pub struct UpstreamRegistry {
    renderer: Arc<dyn Renderer>,
    entries: Mutex<HashMap<String, RegistryEntry>>,
}

impl UpstreamRegistry {
    pub fn new(renderer: Arc<dyn Renderer>) -> Self {
        Self {
            renderer,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Add `member`, replacing any member with the same address, then materialize.
    pub async fn upsert(
        &self,
        target: &ServiceTarget,
        member: UpstreamMember,
    ) -> Result<Mutation, RegistryError> {
        let mut entries = self.entries.lock().await;
        self.upsert_locked(&mut entries, target, member).await
    }

    /// Like [`UpstreamRegistry::upsert`], but `admit` is evaluated under the
    /// registry lock first; `None` when it refuses the member.
    pub async fn upsert_if<F>(
        &self,
        target: &ServiceTarget,
        member: UpstreamMember,
        admit: F,
    ) -> Result<Option<Mutation>, RegistryError>
    where
        F: FnOnce() -> bool,
    {
        let mut entries = self.entries.lock().await;
        if !admit() {
            return Ok(None);
        }
        self.upsert_locked(&mut entries, target, member)
            .await
            .map(Some)
    }

    /// Remove the member at `address` (no-op if absent), then materialize.
    pub async fn remove(
        &self,
        target: &ServiceTarget,
        address: &str,
    ) -> Result<Mutation, RegistryError> {
        let mut entries = self.entries.lock().await;
        self.refresh_target(&mut entries, target).await;

        let changed = entries
            .get_mut(&target.service_name)
            .and_then(|entry| entry.members.remove(address))
            .is_some();
        if changed {
            metrics::record_mutation("remove");
        }

        let materialized = self.materialize_locked(&mut entries, target).await?;
        Ok(Mutation {
            changed,
            materialized,
        })
    }

    /// Remove the member at `address` from a service that is no longer
    /// declared, materializing with the parameters it was last written with.
    ///
    /// `None` when the registry holds no members for `service_name`.
    pub async fn remove_undeclared(
        &self,
        service_name: &str,
        address: &str,
    ) -> Result<Option<Mutation>, RegistryError> {
        let mut entries = self.entries.lock().await;
        let Some(entry) = entries.get_mut(service_name) else {
            return Ok(None);
        };
        let target = entry.target.clone();

        let changed = entry.members.remove(address).is_some();
        if changed {
            metrics::record_mutation("remove");
        }

        let materialized = self.materialize_locked(&mut entries, &target).await?;
        Ok(Some(Mutation {
            changed,
            materialized,
        }))
    }

    /// Bring the service's artifact in line with its current member set.
    pub async fn materialize(&self, target: &ServiceTarget) -> Result<Materialized, RegistryError> {
        let mut entries = self.entries.lock().await;
        self.refresh_target(&mut entries, target).await;
        self.materialize_locked(&mut entries, target).await
    }

    /// Copy of a service's members.
    #[cfg(test)]
    pub(crate) async fn snapshot(&self, service_name: &str) -> Vec<UpstreamMember> {
        self.entries
            .lock()
            .await
            .get(service_name)
            .map(|entry| entry.members.as_slice().to_vec())
            .unwrap_or_default()
    }

    /// Number of services that currently have members.
    #[cfg(test)]
    pub(crate) async fn service_count(&self) -> usize {
        self.entries.lock().await.len()
    }

    async fn upsert_locked(
        &self,
        entries: &mut HashMap<String, RegistryEntry>,
        target: &ServiceTarget,
        member: UpstreamMember,
    ) -> Result<Mutation, RegistryError> {
        self.refresh_target(entries, target).await;

        let entry = entries
            .entry(target.service_name.clone())
            .or_insert_with(|| RegistryEntry {
                target: target.clone(),
                members: MemberSet::new(),
            });
        let changed = entry.members.upsert(member);
        metrics::record_mutation("upsert");

        let materialized = self.materialize_locked(entries, target).await?;
        Ok(Mutation {
            changed,
            materialized,
        })
    }

    /// Adopt the latest parameters; drop the old artifact if its path moved.
    async fn refresh_target(
        &self,
        entries: &mut HashMap<String, RegistryEntry>,
        target: &ServiceTarget,
    ) {
        let Some(entry) = entries.get_mut(&target.service_name) else {
            return;
        };
        if entry.target.artifact_path != target.artifact_path {
            let old = entry.target.artifact_path.clone();
            if let Err(e) = delete_artifact(&old).await {
                tracing::warn!(
                    service = %target.service_name,
                    error = %e,
                    "Failed to remove artifact at previous location"
                );
            }
        }
        entry.target = target.clone();
    }

    async fn materialize_locked(
        &self,
        entries: &mut HashMap<String, RegistryEntry>,
        target: &ServiceTarget,
    ) -> Result<Materialized, RegistryError> {
        let name = &target.service_name;
        let path = target.artifact_path.clone();

        let rendered = match entries.get(name) {
            Some(entry) if !entry.members.is_empty() => {
                let input = RenderInput {
                    service_name: &entry.target.service_name,
                    template: entry.target.template.as_deref(),
                    params: &entry.target.params,
                    members: entry.members.as_slice(),
                };
                Some((self.renderer.render(&input), entry.members.len()))
            }
            _ => None,
        };

        let Some((rendered, count)) = rendered else {
            entries.remove(name);
            metrics::record_members(name, 0);
            delete_artifact(&path).await?;
            tracing::info!(service = %name, path = %path.display(), "Removed upstream config");
            return Ok(Materialized::Deleted { path });
        };

        metrics::record_members(name, count);
        match rendered {
            Ok(text) => {
                write_artifact(&path, &text).await?;
                tracing::info!(
                    service = %name,
                    path = %path.display(),
                    members = count,
                    "Wrote upstream config"
                );
                Ok(Materialized::Written {
                    path,
                    members: count,
                })
            }
            Err(e) => {
                tracing::warn!(
                    service = %name,
                    error = %e,
                    "Rendering failed, keeping previous config"
                );
                Ok(Materialized::Skipped {
                    path,
                    reason: e.to_string(),
                })
            }
        }
    }
}

async fn write_artifact(path: &Path, text: &str) -> Result<(), RegistryError> {
    let io_err = |source| RegistryError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await.map_err(io_err)?;
    }
    fs::write(path, text).await.map_err(io_err)
}

async fn delete_artifact(path: &Path) -> Result<(), RegistryError> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(source) => Err(RegistryError::Delete {
            path: path.to_path_buf(),
            source,
        }),
    }
}

//! Reconciliation of cached remote records against local installation state

use crate::probe::InstallProbe;
use plugshelf_catalog::{Banners, CatalogSnapshot, Icons, PackageRecord};
use plugshelf_config::PackageDescriptor;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Actionable status of one tracked package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReconciliationStatus {
    NotInstalled,
    InstalledInactive,
    Active,
    UpdateAvailable { new_version: String },
}

impl ReconciliationStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ReconciliationStatus::NotInstalled => "not installed",
            ReconciliationStatus::InstalledInactive => "installed",
            ReconciliationStatus::Active => "active",
            ReconciliationStatus::UpdateAvailable { .. } => "update available",
        }
    }
}

/// What the host reports about a package on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalState {
    Missing,
    Installed { active: bool },
}

impl LocalState {
    pub fn from_flags(present: bool, active: bool) -> Self {
        if present {
            LocalState::Installed { active }
        } else {
            LocalState::Missing
        }
    }

    /// Ask the probe about the package with this slug
    pub fn probe(probe: &dyn InstallProbe, slug: &str) -> (Option<PathBuf>, Self) {
        match probe.installed_file(slug) {
            Some(file) => {
                let active = probe.is_active(&file);
                (Some(file), LocalState::Installed { active })
            }
            None => (None, LocalState::Missing),
        }
    }
}

/// Versions are equal when both parse as semver and compare equal, or when
/// their trimmed text is identical. An unknown installed version never
/// matches.
pub fn versions_match(installed: Option<&str>, remote: &str) -> bool {
    let Some(installed) = installed else {
        return false;
    };
    let (installed, remote) = (installed.trim(), remote.trim());
    match (semver::Version::parse(installed), semver::Version::parse(remote)) {
        (Ok(a), Ok(b)) => a == b,
        _ => installed == remote,
    }
}

/// Classify one package.
///
/// Missing packages are `NotInstalled`. Installed packages at the remote
/// version are `Active` or `InstalledInactive`; at any other version they are
/// `UpdateAvailable`, active or not.
pub fn classify(
    descriptor: &PackageDescriptor,
    record: &PackageRecord,
    local: LocalState,
) -> ReconciliationStatus {
    match local {
        LocalState::Missing => ReconciliationStatus::NotInstalled,
        LocalState::Installed { active } => {
            if versions_match(descriptor.installed_version.as_deref(), &record.version) {
                if active {
                    ReconciliationStatus::Active
                } else {
                    ReconciliationStatus::InstalledInactive
                }
            } else {
                ReconciliationStatus::UpdateAvailable {
                    new_version: record.version.clone(),
                }
            }
        }
    }
}

/// Entry in the updater feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateDescriptor {
    pub key: String,
    /// Plugin file, relative to the plugins directory
    pub plugin_file: PathBuf,
    pub slug: String,
    pub new_version: String,
    pub download_url: String,
    pub tested_platform_version: Option<String>,
    pub requires_platform_version: Option<String>,
    pub url: Option<String>,
    pub icons: Icons,
    pub banners: Banners,
}

impl UpdateDescriptor {
    fn new(record: &PackageRecord, plugin_file: PathBuf) -> Self {
        Self {
            key: record.key.clone(),
            plugin_file,
            slug: record.slug.clone(),
            new_version: record.version.clone(),
            download_url: record.download_link.clone(),
            tested_platform_version: record.tested_platform_version.clone(),
            requires_platform_version: record.requires_platform_version.clone(),
            url: record.site_url.clone(),
            icons: record.icons.clone(),
            banners: record.banners.clone(),
        }
    }
}

/// Two-bucket update feed handed to the host updater
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateFeed {
    /// Installed packages whose version differs from the catalog
    pub updates_available: Vec<UpdateDescriptor>,
    /// Everything else in the catalog: current or not installed
    pub up_to_date: Vec<UpdateDescriptor>,
}

/// Build the update feed for every descriptor present in the snapshot, in
/// descriptor order. Packages missing from the snapshot are left out.
pub fn build_update_feed(
    snapshot: &CatalogSnapshot,
    descriptors: &[PackageDescriptor],
    probe: &dyn InstallProbe,
) -> UpdateFeed {
    let mut feed = UpdateFeed::default();
    for descriptor in descriptors {
        let Some(record) = snapshot.get(&descriptor.key) else {
            continue;
        };
        match probe.installed_file(&record.slug) {
            Some(file) if !versions_match(descriptor.installed_version.as_deref(), &record.version) => {
                feed.updates_available.push(UpdateDescriptor::new(record, file));
            }
            Some(file) => feed.up_to_date.push(UpdateDescriptor::new(record, file)),
            None => feed
                .up_to_date
                .push(UpdateDescriptor::new(record, descriptor.local_file.clone())),
        }
    }
    feed
}

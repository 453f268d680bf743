//! Dataset sources: where children and members come from.
//!
//! [`DatasetSource`] is the seam the fetch dispatcher calls through.
//! [`Catalog`] is the file-backed implementation used by the CLI:
//!
//! ```toml
//! [[datasets]]
//! name = "IBMUSER.PROCLIB"
//! organization = "PO"
//! members = ["ASMCL", "LINK"]
//!
//! [[datasets]]
//! name = "IBMUSER.DATA"
//! organization = "PS"
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::model::Organization;
use crate::core::errors::{DstError, Result};
use crate::core::qualifier::QualifierPattern;

/// Data-access collaborator behind the fetch dispatcher.
pub trait DatasetSource: Send + Sync {
    /// Datasets under `qualifier`, as `(name, organization)` pairs.
    fn list_children(&self, qualifier: &str) -> Result<Vec<(String, Organization)>>;

    /// Member names of a partitioned dataset.
    fn list_members(&self, dataset: &str) -> Result<Vec<String>>;
}

/// One dataset entry in the catalog file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetEntry {
    pub name: String,
    pub organization: Organization,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    datasets: Vec<DatasetEntry>,
}

/// In-memory dataset catalog keyed by uppercase name.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    datasets: BTreeMap<String, DatasetEntry>,
}

impl Catalog {
    /// Build from entries. Names are uppercased; later duplicates win.
    #[must_use]
    pub fn from_entries(entries: impl IntoIterator<Item = DatasetEntry>) -> Self {
        let datasets = entries
            .into_iter()
            .map(|mut entry| {
                entry.name = entry.name.to_uppercase();
                (entry.name.clone(), entry)
            })
            .collect();
        Self { datasets }
    }

    /// Parse catalog TOML text. `origin` is only used in error messages.
    pub fn from_toml_str(raw: &str, origin: &Path) -> Result<Self> {
        let file: CatalogFile = toml::from_str(raw).map_err(|e| DstError::CatalogParse {
            path: origin.to_path_buf(),
            details: e.to_string(),
        })?;
        for entry in &file.datasets {
            if entry.name.trim().is_empty() {
                return Err(DstError::CatalogParse {
                    path: origin.to_path_buf(),
                    details: "dataset with empty name".to_string(),
                });
            }
        }
        Ok(Self::from_entries(file.datasets))
    }

    /// Load a catalog file from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|source| DstError::io(path, source))?;
        Self::from_toml_str(&raw, path)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }
}

impl DatasetSource for Catalog {
    fn list_children(&self, qualifier: &str) -> Result<Vec<(String, Organization)>> {
        let pattern = QualifierPattern::parse(qualifier)?;
        Ok(self
            .datasets
            .values()
            .filter(|entry| pattern.matches(&entry.name))
            .map(|entry| (entry.name.clone(), entry.organization.clone()))
            .collect())
    }

    fn list_members(&self, dataset: &str) -> Result<Vec<String>> {
        let key = dataset.to_uppercase();
        let entry = self
            .datasets
            .get(&key)
            .ok_or(DstError::DatasetNotFound { name: key.clone() })?;
        if !entry.organization.has_members() {
            return Err(DstError::NotPartitioned {
                name: key,
                organization: entry.organization.label().to_string(),
            });
        }
        let mut members = entry.members.clone();
        members.sort();
        Ok(members)
    }
}

/// File-backed catalog that can be re-read while the fetch worker holds it.
#[derive(Debug)]
pub struct ReloadableCatalog {
    path: PathBuf,
    inner: RwLock<Catalog>,
}

impl ReloadableCatalog {
    /// Load `path` once; later [`reload`](Self::reload) calls re-read it.
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            path: path.to_path_buf(),
            inner: RwLock::new(Catalog::load(path)?),
        })
    }

    /// Re-read the file. On error the previous contents stay in place.
    pub fn reload(&self) -> Result<usize> {
        let fresh = Catalog::load(&self.path)?;
        let count = fresh.len();
        *self.inner.write() = fresh;
        Ok(count)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

impl DatasetSource for ReloadableCatalog {
    fn list_children(&self, qualifier: &str) -> Result<Vec<(String, Organization)>> {
        self.inner.read().list_children(qualifier)
    }

    fn list_members(&self, dataset: &str) -> Result<Vec<String>> {
        self.inner.read().list_members(dataset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[[datasets]]
name = "IBMUSER.PROCLIB"
organization = "PO"
members = ["LINK", "ASMCL"]

[[datasets]]
name = "ibmuser.data"
organization = "PS"

[[datasets]]
name = "IBMUSER.TEST.LOAD"
organization = "PO-E"

[[datasets]]
name = "SYS1.MACLIB"
organization = "PO"
members = ["IEZBITS"]
"#;

    fn sample() -> Catalog {
        Catalog::from_toml_str(SAMPLE, Path::new("sample.toml")).unwrap()
    }

    #[test]
    fn parses_entries_and_uppercases_names() {
        let catalog = sample();
        assert_eq!(catalog.len(), 4);
        let children = catalog.list_children("IBMUSER").unwrap();
        let names: Vec<&str> = children.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(
            names,
            vec!["IBMUSER.DATA", "IBMUSER.PROCLIB", "IBMUSER.TEST.LOAD"]
        );
    }

    #[test]
    fn wildcard_qualifier_filters() {
        let catalog = sample();
        let children = catalog.list_children("IBMUSER.*.LOAD").unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].0, "IBMUSER.TEST.LOAD");
        assert_eq!(children[0].1, Organization::Partitioned);
    }

    #[test]
    fn unmatched_qualifier_is_empty_not_error() {
        assert!(sample().list_children("NOBODY").unwrap().is_empty());
    }

    #[test]
    fn invalid_qualifier_is_error() {
        let err = sample().list_children("IBMUSER..X").unwrap_err();
        assert_eq!(err.code(), "DST-2001");
    }

    #[test]
    fn members_are_sorted() {
        let members = sample().list_members("ibmuser.proclib").unwrap();
        assert_eq!(members, vec!["ASMCL", "LINK"]);
    }

    #[test]
    fn members_of_sequential_dataset_rejected() {
        let err = sample().list_members("IBMUSER.DATA").unwrap_err();
        assert_eq!(err.code(), "DST-2004");
    }

    #[test]
    fn members_of_unknown_dataset_rejected() {
        let err = sample().list_members("IBMUSER.NOPE").unwrap_err();
        assert_eq!(err.code(), "DST-2003");
    }

    #[test]
    fn malformed_catalog_reports_path() {
        let err = Catalog::from_toml_str("[[datasets]]\nname = 3", Path::new("bad.toml"))
            .unwrap_err();
        assert_eq!(err.code(), "DST-2002");
        assert!(err.to_string().contains("bad.toml"));
    }

    #[test]
    fn empty_name_rejected() {
        let raw = "[[datasets]]\nname = \"  \"\norganization = \"PS\"\n";
        assert!(Catalog::from_toml_str(raw, Path::new("x.toml")).is_err());
    }

    #[test]
    fn load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.toml");
        fs::write(&path, SAMPLE).unwrap();
        let catalog = Catalog::load(&path).unwrap();
        assert!(!catalog.is_empty());

        let missing = Catalog::load(&dir.path().join("missing.toml")).unwrap_err();
        assert_eq!(missing.code(), "DST-3002");
    }

    #[test]
    fn reload_picks_up_new_entries_and_keeps_old_on_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.toml");
        fs::write(&path, SAMPLE).unwrap();
        let catalog = ReloadableCatalog::open(&path).unwrap();
        assert_eq!(catalog.len(), 4);

        let extra = format!("{SAMPLE}\n[[datasets]]\nname = \"IBMUSER.NEW\"\norganization = \"PS\"\n");
        fs::write(&path, extra).unwrap();
        assert_eq!(catalog.reload().unwrap(), 5);
        assert_eq!(catalog.list_children("IBMUSER.NEW").unwrap().len(), 1);

        fs::write(&path, "not = [valid").unwrap();
        assert!(catalog.reload().is_err());
        assert_eq!(catalog.len(), 5);
    }
}

//! File-based ConfigStore implementation

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{debug, error, info};

use reddisc_core::{
    Error, Result,
    config_store::{ConfigSnapshot, ConfigStore, ModificationMarker},
    tenant::{Tenant, TenantId},
};

/// On-disk shape of the tenant file
#[derive(Debug, Default, Serialize, Deserialize)]
struct TenantDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_modified: Option<String>,

    #[serde(default)]
    tenants: BTreeMap<TenantId, Tenant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileFormat {
    Yaml,
    Toml,
    Json,
}

impl FileFormat {
    fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|s| s.to_str()) {
            Some("toml") => FileFormat::Toml,
            Some("json") => FileFormat::Json,
            _ => FileFormat::Yaml,
        }
    }
}

/// File-based tenant store
///
/// The modification marker combines the document's `last_modified` stamp
/// with the file's mtime and length, so both our own writes and hand edits
/// that leave the stamp alone are detected. Computing it never parses the
/// tenant map, so a broken body does not hide later edits.
#[derive(Debug)]
pub struct FileConfigStore {
    /// Path to the tenant file
    config_path: PathBuf,
    format: FileFormat,
}

impl FileConfigStore {
    /// Open an existing tenant file
    ///
    /// # Errors
    /// - `Error::ConfigNotFound` if the file doesn't exist
    /// - `Error::Config` if the home directory can't be resolved
    pub async fn new(config_path: impl Into<PathBuf>) -> Result<Self> {
        let config_path = expand_home(config_path.into())?;

        if !config_path.exists() {
            return Err(Error::ConfigNotFound);
        }

        info!("Initialized FileConfigStore for {:?}", config_path);

        Ok(Self {
            format: FileFormat::from_path(&config_path),
            config_path,
        })
    }

    /// Open a tenant file, creating an empty one if it doesn't exist
    pub async fn open_or_create(config_path: impl Into<PathBuf>) -> Result<Self> {
        let config_path = expand_home(config_path.into())?;
        let store = Self {
            format: FileFormat::from_path(&config_path),
            config_path,
        };

        if !store.config_path.exists() {
            store.write_document(&TenantDocument {
                last_modified: Some(ModificationMarker::now().to_string()),
                tenants: BTreeMap::new(),
            })?;
            info!("Created empty tenant file at {:?}", store.config_path);
        }

        Ok(store)
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Read the raw tenant file
    fn read_contents(&self) -> Result<String> {
        fs::read_to_string(&self.config_path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                return Error::ConfigNotFound;
            }
            error!("Failed to read tenant file: {}", e);
            Error::Io(e)
        })
    }

    /// Parse the tenant file
    fn parse_document(&self, contents: &str) -> Result<TenantDocument> {
        if contents.trim().is_empty() {
            return Ok(TenantDocument::default());
        }

        let document = match self.format {
            FileFormat::Toml => toml::from_str(contents).map_err(|e| {
                error!("Failed to parse TOML tenant file: {}", e);
                Error::Config(format!("Invalid TOML: {}", e))
            })?,
            FileFormat::Json => serde_json::from_str(contents).map_err(|e| {
                error!("Failed to parse JSON tenant file: {}", e);
                Error::Config(format!("Invalid JSON: {}", e))
            })?,
            FileFormat::Yaml => serde_yaml::from_str(contents).map_err(|e| {
                error!("Failed to parse YAML tenant file: {}", e);
                Error::Config(format!("Invalid YAML: {}", e))
            })?,
        };

        debug!("Successfully read tenant file");
        Ok(document)
    }

    /// Serialize and atomically replace the tenant file
    fn write_document(&self, document: &TenantDocument) -> Result<()> {
        let contents = match self.format {
            FileFormat::Toml => toml::to_string_pretty(document).map_err(|e| {
                error!("Failed to serialize TOML: {}", e);
                Error::Config(format!("TOML serialization error: {}", e))
            })?,
            FileFormat::Json => serde_json::to_string_pretty(document)?,
            FileFormat::Yaml => serde_yaml::to_string(document).map_err(|e| {
                error!("Failed to serialize YAML: {}", e);
                Error::Config(format!("YAML serialization error: {}", e))
            })?,
        };

        write_atomic(&self.config_path, contents.as_bytes()).map_err(|e| {
            error!("Failed to write tenant file: {}", e);
            Error::Io(e)
        })?;

        info!("Successfully wrote tenant file");
        Ok(())
    }

    fn marker_for(&self, stamp: Option<&str>) -> Result<ModificationMarker> {
        let metadata = fs::metadata(&self.config_path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::ConfigNotFound
            } else {
                Error::Io(e)
            }
        })?;

        let mtime = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_nanos())
            .unwrap_or_default();

        Ok(ModificationMarker::new(format!(
            "{}#{}#{}",
            stamp.unwrap_or("-"),
            mtime,
            metadata.len()
        )))
    }

    fn validate(tenants: &[Tenant]) -> Result<()> {
        for tenant in tenants {
            if tenant.id.as_str().is_empty() {
                return Err(Error::ConfigValidation(
                    "tenant id must not be empty".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ConfigStore for FileConfigStore {
    async fn read_all(&self) -> Result<ConfigSnapshot> {
        let contents = self.read_contents()?;
        let marker = self.marker_for(extract_stamp(&contents))?;
        let document = self.parse_document(&contents)?;
        Ok(ConfigSnapshot::from_map(document.tenants, marker))
    }

    async fn write_all(&self, tenants: Vec<Tenant>) -> Result<ModificationMarker> {
        Self::validate(&tenants)?;

        let stamp = ModificationMarker::now().to_string();
        let document = TenantDocument {
            last_modified: Some(stamp.clone()),
            tenants: tenants.into_iter().map(|t| (t.id.clone(), t)).collect(),
        };

        self.write_document(&document)?;
        self.marker_for(Some(&stamp))
    }

    async fn last_modified(&self) -> Result<ModificationMarker> {
        let contents = self.read_contents()?;
        self.marker_for(extract_stamp(&contents))
    }
}

/// Pick the top-level `last_modified` stamp out of the raw document without
/// parsing the tenant map. Matches the YAML (`key: v`), TOML (`key = "v"`) and
/// JSON (`"key": "v",`) forms the store writes.
fn extract_stamp(contents: &str) -> Option<&str> {
    contents.lines().find_map(|line| {
        let rest = line
            .trim_start()
            .strip_prefix('"')
            .unwrap_or(line.trim_start())
            .strip_prefix("last_modified")?;
        let rest = rest.strip_prefix('"').unwrap_or(rest).trim_start();
        let value = rest.strip_prefix(':').or_else(|| rest.strip_prefix('='))?;
        let value = value
            .trim()
            .trim_end_matches(',')
            .trim_end()
            .trim_matches(|c| c == '"' || c == '\'');
        (!value.is_empty()).then_some(value)
    })
}

/// Expand a leading `~` to the home directory
fn expand_home(path: PathBuf) -> Result<PathBuf> {
    match path.strip_prefix("~") {
        Ok(rest) => Ok(dirs::home_dir()
            .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))?
            .join(rest)),
        Err(_) => Ok(path),
    }
}

/// Write to a sibling temp file and rename it over the target
fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }

    let mut temp = path.as_os_str().to_owned();
    temp.push(".tmp");
    let temp_path = PathBuf::from(temp);

    let result = (|| {
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
        fs::rename(&temp_path, path)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

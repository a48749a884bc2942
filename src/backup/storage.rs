use crate::backup::dir_ops::clear_dir;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use crate::backup::validate::{validate_dir_exist_or_created, validate_valid_archive_base_name};

use bon::Builder;
use getset::Getters;
use serde::{Deserialize, Serialize};
use validator::Validate;

use std::fs::File;
use std::path::{Path, PathBuf};

pub static DEFAULT_ARCHIVE_BASE_NAME: &str = "hungyapp_backup";
pub static TMP_IMAGES_DIR_NAME: &str = "tmp";
pub static DATABASE_ARCHIVE_DIR: &str = "database";
pub static IMAGES_ARCHIVE_DIR: &str = "images";

fn default_archive_base_name() -> String {
    DEFAULT_ARCHIVE_BASE_NAME.to_owned()
}

/// How restored folders replace the live ones
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapMode {
    /// Build each folder in a sibling shadow directory, then rename it into place.
    #[default]
    Shadow,
    /// Copy straight over the live folder. A failure mid-copy leaves it half written.
    InPlace,
}

/// Where the backup subsystem reads and writes on disk
///
/// `persistence_store_dir` is optional: when it is not known the database is
/// neither exported nor restored.
#[derive(Clone, Debug, Serialize, Deserialize, Validate, Builder, PartialEq, Eq, Getters)]
#[serde(deny_unknown_fields)]
#[getset(get = "pub")]
pub struct StorageLocations {
    #[validate(custom(function = validate_dir_exist_or_created))]
    #[builder(into)]
    staging_dir: PathBuf,
    #[validate(custom(function = validate_dir_exist_or_created))]
    #[builder(into)]
    images_dir: PathBuf,
    #[serde(default)]
    #[builder(into)]
    persistence_store_dir: Option<PathBuf>,
    #[serde(default)]
    #[builder(default)]
    swap_mode: SwapMode,
    #[serde(default = "default_archive_base_name")]
    #[validate(custom(function = validate_valid_archive_base_name))]
    #[builder(default = default_archive_base_name(), into)]
    archive_base_name: String,
}

impl StorageLocations {
    /// The app-private layout: `<app_files>/backup`, `<app_files>/images`
    /// and `<app_files>/databases`.
    pub fn under_app_files<P: AsRef<Path>>(app_files: P) -> Self {
        let app_files = app_files.as_ref();
        Self::builder()
            .staging_dir(app_files.join("backup"))
            .images_dir(app_files.join("images"))
            .persistence_store_dir(app_files.join("databases"))
            .build()
    }

    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let locations: StorageLocations = File::open(path)
            .map_err(Error::from)
            .and_then(|f| serde_yml::from_reader(f).map_err(Error::from))
            .with_msg(format!("Parse YAML config failed: {:?}", path))?;
        locations
            .validate()
            .map_err(Error::from)
            .with_msg(format!("Config validation failed: {:?}", path))?;
        Ok(locations)
    }

    /// Scratch pictures that are never backed up.
    pub fn tmp_images_dir(&self) -> PathBuf {
        self.images_dir.join(TMP_IMAGES_DIR_NAME)
    }

    pub fn recipe_images_dir(&self, recipe_id: i64) -> Result<PathBuf> {
        let dir = self.images_dir.join(recipe_id.to_string());
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    pub fn clear_tmp_images_dir(&self) -> Result<()> {
        let dir = self.tmp_images_dir();
        std::fs::create_dir_all(&dir)?;
        clear_dir(dir)
    }

    pub fn with_swap_mode(mut self, swap_mode: SwapMode) -> Self {
        self.swap_mode = swap_mode;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_under_app_files_layout() {
        let locations = StorageLocations::under_app_files("/data/app/files");
        assert_eq!(locations.staging_dir(), Path::new("/data/app/files/backup"));
        assert_eq!(locations.images_dir(), Path::new("/data/app/files/images"));
        assert_eq!(
            locations.persistence_store_dir().as_deref(),
            Some(Path::new("/data/app/files/databases"))
        );
        assert_eq!(locations.swap_mode(), &SwapMode::Shadow);
        assert_eq!(locations.archive_base_name(), DEFAULT_ARCHIVE_BASE_NAME);
        assert_eq!(
            locations.tmp_images_dir(),
            Path::new("/data/app/files/images/tmp")
        );
    }

    #[test]
    fn test_from_yaml_file_applies_defaults_and_creates_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let staging = temp_dir.path().join("backup");
        let images = temp_dir.path().join("images");
        let config = temp_dir.path().join("config.yml");
        std::fs::write(
            &config,
            format!(
                "staging_dir: {:?}\nimages_dir: {:?}\n",
                staging.to_str().unwrap(),
                images.to_str().unwrap()
            ),
        )
        .unwrap();

        let locations = StorageLocations::from_yaml_file(&config).unwrap();

        assert_eq!(locations.staging_dir(), &staging);
        assert!(locations.persistence_store_dir().is_none());
        assert_eq!(locations.swap_mode(), &SwapMode::Shadow);
        assert!(staging.is_dir());
        assert!(images.is_dir());
    }

    #[test]
    fn test_from_yaml_file_reads_swap_mode() {
        let temp_dir = TempDir::new().unwrap();
        let config = temp_dir.path().join("config.yml");
        std::fs::write(
            &config,
            format!(
                "staging_dir: {:?}\nimages_dir: {:?}\npersistence_store_dir: {:?}\nswap_mode: in_place\n",
                temp_dir.path().join("b").to_str().unwrap(),
                temp_dir.path().join("i").to_str().unwrap(),
                temp_dir.path().join("d").to_str().unwrap(),
            ),
        )
        .unwrap();

        let locations = StorageLocations::from_yaml_file(&config).unwrap();
        assert_eq!(locations.swap_mode(), &SwapMode::InPlace);
        assert!(locations.persistence_store_dir().is_some());
    }

    #[test]
    fn test_from_yaml_file_rejects_unknown_fields() {
        let temp_dir = TempDir::new().unwrap();
        let config = temp_dir.path().join("config.yml");
        std::fs::write(&config, "staging_dir: /a\nimages_dir: /b\nbogus: 1\n").unwrap();

        assert!(StorageLocations::from_yaml_file(&config).is_err());
    }

    #[test]
    fn test_validation_rejects_bad_base_name() {
        let temp_dir = TempDir::new().unwrap();
        let locations = StorageLocations::builder()
            .staging_dir(temp_dir.path().join("b"))
            .images_dir(temp_dir.path().join("i"))
            .archive_base_name("bad/name")
            .build();
        assert!(locations.validate().is_err());
    }

    #[test]
    fn test_clear_tmp_images_dir_keeps_recipe_pictures() {
        let temp_dir = TempDir::new().unwrap();
        let locations = StorageLocations::under_app_files(temp_dir.path());
        let recipe_dir = locations.recipe_images_dir(3).unwrap();
        std::fs::write(recipe_dir.join("p.jpg"), "p").unwrap();
        std::fs::create_dir_all(locations.tmp_images_dir()).unwrap();
        std::fs::write(locations.tmp_images_dir().join("t.jpg"), "t").unwrap();

        locations.clear_tmp_images_dir().unwrap();

        assert!(recipe_dir.join("p.jpg").exists());
        assert!(locations.tmp_images_dir().is_dir());
        assert!(!locations.tmp_images_dir().join("t.jpg").exists());
    }

    #[test]
    fn test_serialization_round_trip() {
        let locations = StorageLocations::under_app_files("/files").with_swap_mode(SwapMode::InPlace);
        let json = serde_json::to_string(&locations).unwrap();
        assert!(json.contains("\"in_place\""));
        let back: StorageLocations = serde_json::from_str(&json).unwrap();
        assert_eq!(back, locations);
    }
}

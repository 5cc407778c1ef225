//! Export the effective castscreen config as TOML.
//!
//! The file is staged next to its destination and renamed into place, so a
//! reader never sees a half-written config.

use std::path::Path;

use castscreen_common::ConfigError;
use tracing::{info, warn};

use crate::schema::{CastScreenConfig, CONFIG_SCHEMA_VERSION};
use crate::validation;

/// Render `config` as TOML, headed by the schema version it was written for.
pub fn render_config(config: &CastScreenConfig) -> Result<String, ConfigError> {
    let body = toml::to_string_pretty(config)
        .map_err(|e| ConfigError::ParseError(format!("cannot render config as TOML: {e}")))?;
    Ok(format!(
        "# castscreen configuration (schema v{CONFIG_SCHEMA_VERSION})\n\n{body}"
    ))
}

/// Validate `config` and write it to `path`. An invalid config is refused
/// rather than written, since the loader would ignore it anyway.
pub fn export_config(config: &CastScreenConfig, path: &Path) -> Result<(), ConfigError> {
    validation::validate(config)?;
    let rendered = render_config(config)?;

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| {
            ConfigError::ParseError(format!("cannot create {}: {e}", dir.display()))
        })?;
    }

    let staged = path.with_extension("toml.tmp");
    std::fs::write(&staged, &rendered)
        .map_err(|e| ConfigError::ParseError(format!("cannot write {}: {e}", staged.display())))?;
    if let Err(e) = std::fs::rename(&staged, path) {
        warn!(path = %path.display(), error = %e, "Rename failed, writing in place");
        let _ = std::fs::remove_file(&staged);
        std::fs::write(path, &rendered)
            .map_err(|e| ConfigError::ParseError(format!("cannot write {}: {e}", path.display())))?;
    }

    info!(path = %path.display(), app_id = %config.cast.app_id, "Config exported");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::RemoteDisplayPreset;
    use crate::toml_loader::load_from_path;

    #[test]
    fn exported_config_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = CastScreenConfig::default();
        config.cast.app_id = "F00DBEEF".into();
        config.remote.preset = RemoteDisplayPreset::HighFrameRate;
        config.capture.density_dpi_override = 320;

        export_config(&config, &path).unwrap();
        assert!(!path.with_extension("toml.tmp").exists());

        let loaded = load_from_path(&path).unwrap();
        assert_eq!(loaded.cast.app_id, "F00DBEEF");
        assert_eq!(loaded.remote.preset, RemoteDisplayPreset::HighFrameRate);
        assert_eq!(loaded.capture.density_dpi_override, 320);
    }

    #[test]
    fn rendered_config_names_schema_version() {
        let rendered = render_config(&CastScreenConfig::default()).unwrap();
        assert!(rendered.starts_with("# castscreen configuration (schema v1)"));
        assert!(rendered.contains("[cast]"));
        assert!(rendered.contains("preset = \"interactive-realtime\""));
    }

    #[test]
    fn invalid_config_is_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = CastScreenConfig::default();
        config.cast.app_id = String::new();

        let err = export_config(&config, &path).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
        assert!(!path.exists());
    }
}

//! Full configuration validation.
//!
//! Collects every violation into a single `ConfigError`.


use crate::schema::CastScreenConfig;
use castscreen_common::ConfigError;

/// Longest receiver application id accepted.
const MAX_APP_ID_LEN: usize = 64;

/// Run all validations on a config, collecting all errors.
pub fn validate(config: &CastScreenConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    validate_cast(&mut errors, config);
    validate_capture(&mut errors, config);
    validate_notifications(&mut errors, config);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(errors.join("; ")))
    }
}

fn validate_cast(errors: &mut Vec<String>, config: &CastScreenConfig) {
    let app_id = &config.cast.app_id;
    if app_id.is_empty() {
        errors.push("cast.app_id must not be empty".into());
    } else if !app_id.chars().all(|c| c.is_ascii_alphanumeric()) {
        errors.push(format!("cast.app_id = {app_id:?} must be alphanumeric"));
    } else if app_id.len() > MAX_APP_ID_LEN {
        errors.push(format!(
            "cast.app_id is {} characters, at most {MAX_APP_ID_LEN} allowed",
            app_id.len()
        ));
    }
}

fn validate_capture(errors: &mut Vec<String>, config: &CastScreenConfig) {
    if config.capture.virtual_display_name.trim().is_empty() {
        errors.push("capture.virtual_display_name must not be empty".into());
    }
    let density = config.capture.density_dpi_override;
    if density != 0 {
        validate_range(errors, "capture.density_dpi_override", density, 72, 640);
    }
}

fn validate_notifications(errors: &mut Vec<String>, config: &CastScreenConfig) {
    if config.notifications.enabled && config.notifications.title.trim().is_empty() {
        errors.push("notifications.title must not be empty when notifications are enabled".into());
    }
}

/// Push an error if `value` is outside `[min, max]`.
fn validate_range(errors: &mut Vec<String>, name: &str, value: u32, min: u32, max: u32) {
    if value < min || value > max {
        errors.push(format!("{name} = {value} is out of range [{min}, {max}]"));
    }
}

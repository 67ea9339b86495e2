use crate::domain::models::AlarmDefaults;
use crate::infrastructure::error::InfraError;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

const APP_JSON: &str = "app.json";
const ALARM_JSON: &str = "alarm.json";
const DEFAULT_LOG_LEVEL: &str = "info";

fn default_files() -> HashMap<&'static str, serde_json::Value> {
    let defaults = AlarmDefaults::default();
    HashMap::from([
        (
            APP_JSON,
            serde_json::json!({
                "schema": 1,
                "appName": "NFC Alarm Clock",
                "logLevel": DEFAULT_LOG_LEVEL
            }),
        ),
        (
            ALARM_JSON,
            serde_json::json!({
                "schema": 1,
                "repeat": defaults.repeat,
                "days": defaults.days,
                "vibrate": defaults.vibrate,
                "useNfc": defaults.use_nfc,
                "sound": defaults.sound,
                "volume": defaults.volume,
                "name": defaults.name,
                "use24HourFormat": defaults.use_24_hour_format,
                "useDismissEarly": defaults.use_dismiss_early,
                "dismissEarlyMinutes": defaults.dismiss_early_minutes,
                "maxAlarms": defaults.max_alarms
            }),
        ),
    ])
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), InfraError> {
    for (name, value) in default_files() {
        let path = config_dir.join(name);
        if !path.exists() {
            let formatted = serde_json::to_string_pretty(&value)?;
            fs::write(path, format!("{formatted}\n"))?;
        }
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != 1 {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

/// Loads the preferences new alarms are seeded from. Keys missing from the
/// file fall back to [`AlarmDefaults::default`].
pub fn load_alarm_defaults(config_dir: &Path) -> Result<AlarmDefaults, InfraError> {
    let path = config_dir.join(ALARM_JSON);
    let mut merged = serde_json::to_value(AlarmDefaults::default())?;
    let configured = read_config(&path)?;

    if let (Some(target), Some(source)) = (merged.as_object_mut(), configured.as_object()) {
        for (key, value) in source {
            if key != "schema" && target.contains_key(key) {
                target.insert(key.clone(), value.clone());
            }
        }
    }

    let defaults: AlarmDefaults = serde_json::from_value(merged)?;
    defaults
        .validate()
        .map_err(|message| InfraError::InvalidConfig(format!("{message} in {}", path.display())))?;
    Ok(defaults)
}

pub fn read_log_level(config_dir: &Path) -> Result<String, InfraError> {
    let app = read_config(&config_dir.join(APP_JSON))?;
    let level = app
        .get("logLevel")
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_LOG_LEVEL);
    Ok(level.to_string())
}

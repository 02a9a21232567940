//! Camera configuration file.
//!
//! The file is a flat JSON object. `name` is the device label and `MMconfig`
//! the driver configuration path; every other key is a property assignment
//! forwarded to the device, in file order, when the camera connects.

use crate::bridge::PropertyValue;
use crate::error::{CameraError, Result};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

const NAME_KEY: &str = "name";
const DRIVER_CONFIG_KEY: &str = "MMconfig";

#[derive(Debug, Clone, PartialEq)]
pub struct CameraConfig {
    pub name: String,
    pub driver_config: PathBuf,
    pub properties: Vec<(String, PropertyValue)>,
}

impl CameraConfig {
    /// Read and parse a configuration file
    ///
    /// A missing file is reported as [`CameraError::ConfigNotFound`].
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                tracing::error!("Config file '{}' not found.", path.display());
                CameraError::ConfigNotFound {
                    path: path.to_path_buf(),
                }
            } else {
                CameraError::ConfigRead {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        Self::parse(&text, path)
    }

    /// Parse configuration text; `origin` is only used in error messages
    pub fn parse(text: &str, origin: &Path) -> Result<Self> {
        let invalid = |reason: String| CameraError::ConfigInvalid {
            path: origin.to_path_buf(),
            reason,
        };

        let object: Map<String, Value> =
            serde_json::from_str(text).map_err(|e| invalid(e.to_string()))?;

        let mut name = None;
        let mut driver_config = None;
        let mut properties = Vec::with_capacity(object.len());

        for (key, value) in object {
            match key.as_str() {
                NAME_KEY => match value {
                    Value::String(s) => name = Some(s),
                    other => return Err(invalid(format!("`name` must be a string, got {other}"))),
                },
                DRIVER_CONFIG_KEY => match value {
                    Value::String(s) => driver_config = Some(PathBuf::from(s)),
                    other => {
                        return Err(invalid(format!("`MMconfig` must be a string, got {other}")))
                    }
                },
                _ => {
                    let value = property_value(&key, value).map_err(invalid)?;
                    properties.push((key, value));
                }
            }
        }

        Ok(Self {
            name: name.ok_or_else(|| invalid("missing `name`".into()))?,
            driver_config: driver_config.ok_or_else(|| invalid("missing `MMconfig`".into()))?,
            properties,
        })
    }
}

fn property_value(key: &str, value: Value) -> std::result::Result<PropertyValue, String> {
    match value {
        Value::Null | Value::Array(_) | Value::Object(_) => Err(format!(
            "property `{key}` must be a string, number or boolean"
        )),
        scalar => serde_json::from_value(scalar).map_err(|e| format!("property `{key}`: {e}")),
    }
}

// Copyright 2025 STARGA Inc.
// Licensed under the Apache License, Version 2.0 (the “License”);
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at:
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an “AS IS” BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Part of the ADGEN project (Algorithmic Differentiation code GENeration).

//! Generation settings read from `adgen.toml`.
//!
//! ```toml
//! library = "adgen_models"
//!
//! [naming]
//! dependent = "y"
//! independent = "x"
//! temporary = "v"
//! array = "a"
//!
//! [bundle]
//! on_close = true
//! thread_pool = false
//! jacobian = true
//! ```
//!
//! Every key is optional.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::bundle::{BundleOptions, ModelOptions, JACOBIAN_OUTPUT};
use crate::naming::{is_c_identifier, DefaultNamer};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct NamingConfig {
    pub dependent: String,
    pub independent: String,
    pub temporary: String,
    pub array: String,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            dependent: "y".to_string(),
            independent: "x".to_string(),
            temporary: "v".to_string(),
            array: "a".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct BundleConfig {
    pub on_close: bool,
    pub on_close_body: Option<String>,
    pub thread_pool: bool,
    pub jacobian: bool,
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            on_close: true,
            on_close_body: None,
            thread_pool: false,
            jacobian: false,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct GenConfig {
    pub library: String,
    pub naming: NamingConfig,
    pub bundle: BundleConfig,
}

impl Default for GenConfig {
    fn default() -> Self {
        Self {
            library: BundleOptions::default().library_name,
            naming: NamingConfig::default(),
            bundle: BundleConfig::default(),
        }
    }
}

impl GenConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: GenConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Names end up as C identifiers. The Jacobian output parameter is
    /// reserved whether or not this file enables Jacobians, since the
    /// command line can turn them on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_c_identifier(&self.library) {
            return Err(ConfigError::Invalid(format!(
                "library = {:?} is not a C identifier",
                self.library
            )));
        }
        self.namer()
            .check_c_names(&[JACOBIAN_OUTPUT])
            .map_err(|err| ConfigError::Invalid(format!("[naming]: {err}")))
    }

    pub fn namer(&self) -> DefaultNamer {
        DefaultNamer::c()
            .with_prefixes(
                &self.naming.dependent,
                &self.naming.independent,
                &self.naming.temporary,
            )
            .with_array_prefix(&self.naming.array)
    }

    pub fn bundle_options(&self) -> BundleOptions {
        BundleOptions {
            library_name: self.library.clone(),
            on_close: self.bundle.on_close,
            on_close_body: self.bundle.on_close_body.clone(),
            thread_pool: self.bundle.thread_pool,
        }
    }

    pub fn model_options(&self) -> ModelOptions {
        ModelOptions {
            jacobian: self.bundle.jacobian,
            namer: self.namer(),
        }
    }
}

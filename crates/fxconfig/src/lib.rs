//! TOML description of a post-processing chain: where resources live, which
//! vertex shader every pass shares, and the ordered list of passes.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub const DEFAULT_VERTEX_SHADER: &str = "shaders/default.vert.glsl";
pub const DEFAULT_LUT_FRAGMENT: &str = "shaders/lut.frag.glsl";
pub const DEFAULT_RETRO_TV_FRAGMENT: &str = "shaders/retro-tv.frag.glsl";
pub const DEFAULT_LUT_IMAGE: &str = "lut.png";
pub const DEFAULT_CURVATURE: f32 = 0.2;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PipelineConfig {
    pub version: u32,
    #[serde(default = "default_resource_base")]
    pub resource_base: String,
    #[serde(default = "default_vertex_shader")]
    pub vertex_shader: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub random_seed: Option<u64>,
    #[serde(default = "default_passes")]
    pub passes: Vec<PassConfig>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum PassConfig {
    Lut {
        #[serde(default = "default_lut_fragment")]
        fragment_shader: String,
        #[serde(default = "default_lut_image")]
        lut: String,
    },
    RetroTv {
        #[serde(default = "default_retro_tv_fragment")]
        fragment_shader: String,
        #[serde(default = "default_curvature")]
        curvature: f32,
    },
}

impl PassConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            PassConfig::Lut { .. } => "lut",
            PassConfig::RetroTv { .. } => "retro-tv",
        }
    }

    pub fn lut() -> Self {
        PassConfig::Lut {
            fragment_shader: default_lut_fragment(),
            lut: default_lut_image(),
        }
    }

    pub fn retro_tv() -> Self {
        PassConfig::RetroTv {
            fragment_shader: default_retro_tv_fragment(),
            curvature: DEFAULT_CURVATURE,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            version: 1,
            resource_base: default_resource_base(),
            vertex_shader: default_vertex_shader(),
            random_seed: None,
            passes: default_passes(),
        }
    }
}

fn default_resource_base() -> String {
    "assets".into()
}

fn default_vertex_shader() -> String {
    DEFAULT_VERTEX_SHADER.into()
}

fn default_lut_fragment() -> String {
    DEFAULT_LUT_FRAGMENT.into()
}

fn default_retro_tv_fragment() -> String {
    DEFAULT_RETRO_TV_FRAGMENT.into()
}

fn default_lut_image() -> String {
    DEFAULT_LUT_IMAGE.into()
}

fn default_curvature() -> f32 {
    DEFAULT_CURVATURE
}

fn default_passes() -> Vec<PassConfig> {
    vec![PassConfig::lut(), PassConfig::retro_tv()]
}

impl PipelineConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: PipelineConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|err| ConfigError::Invalid(err.to_string()))
    }

    /// Replaces the curvature of every Retro-TV pass.
    pub fn override_curvature(&mut self, value: f32) {
        for pass in &mut self.passes {
            if let PassConfig::RetroTv { curvature, .. } = pass {
                *curvature = value;
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != 1 {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected 1",
                self.version
            )));
        }

        if self.resource_base.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "resource_base must not be empty".into(),
            ));
        }

        if self.vertex_shader.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "vertex_shader must not be empty".into(),
            ));
        }

        for (index, pass) in self.passes.iter().enumerate() {
            let kind = pass.kind();
            match pass {
                PassConfig::Lut {
                    fragment_shader,
                    lut,
                } => {
                    require_path(index, kind, "fragment_shader", fragment_shader)?;
                    require_path(index, kind, "lut", lut)?;
                }
                PassConfig::RetroTv {
                    fragment_shader,
                    curvature,
                } => {
                    require_path(index, kind, "fragment_shader", fragment_shader)?;
                    if !curvature.is_finite() || *curvature < 0.0 {
                        return Err(ConfigError::Invalid(format!(
                            "pass #{index} ({kind}) curvature must be a finite value >= 0"
                        )));
                    }
                }
            }
        }

        Ok(())
    }
}

fn require_path(index: usize, kind: &str, field: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Invalid(format!(
            "pass #{index} ({kind}) {field} must not be empty"
        )));
    }
    Ok(())
}

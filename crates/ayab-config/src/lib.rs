//! TOML-on-disk configuration loading, layered under the in-memory
//! [`ayab_machine::Config`] record the engine consumes.
//!
//! Splits a parsed `ConfigFile` (whatever is on disk, all fields optional
//! with sane defaults) from the validated record the rest of the system
//! actually runs with — that validation step is `ayab_machine::Config::validate`,
//! not a crate-local clamp.

use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use ayab_machine::{Alignment, KnittingMode, Machine};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ModeField {
    Singlebed,
    ClassicRibber,
    MiddleColorsTwiceRibber,
    HeartOfPlutoRibber,
    CircularRibber,
}

impl From<ModeField> for KnittingMode {
    fn from(value: ModeField) -> Self {
        match value {
            ModeField::Singlebed => KnittingMode::Singlebed,
            ModeField::ClassicRibber => KnittingMode::ClassicRibber,
            ModeField::MiddleColorsTwiceRibber => KnittingMode::MiddleColorsTwiceRibber,
            ModeField::HeartOfPlutoRibber => KnittingMode::HeartOfPlutoRibber,
            ModeField::CircularRibber => KnittingMode::CircularRibber,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AlignmentField {
    Left,
    Center,
    Right,
}

impl From<AlignmentField> for Alignment {
    fn from(value: AlignmentField) -> Self {
        match value {
            AlignmentField::Left => Alignment::Left,
            AlignmentField::Center => Alignment::Center,
            AlignmentField::Right => Alignment::Right,
        }
    }
}

fn default_width() -> u16 {
    200
}

fn default_knit_stop_needle() -> u16 {
    199
}

fn default_alignment() -> AlignmentField {
    AlignmentField::Center
}

/// Raw, optional-everywhere shape of `ayab.toml`. Unknown keys are ignored
/// so the file stays forward-compatible as fields get added.
#[derive(Debug, Deserialize, Clone)]
pub struct ConfigFile {
    #[serde(default = "default_width")]
    pub machine_width: u16,
    pub num_colors: u8,
    #[serde(default)]
    pub start_row: u32,
    pub mode: ModeField,
    #[serde(default)]
    pub inf_repeat: bool,
    #[serde(default)]
    pub continuous_reporting: bool,
    #[serde(default = "default_alignment")]
    pub alignment: AlignmentField,
    #[serde(default)]
    pub knit_start_needle: u16,
    #[serde(default = "default_knit_stop_needle")]
    pub knit_stop_needle: u16,
    pub port: String,
}

/// Best-effort config path following XDG conventions: a local `ayab.toml`
/// in the working directory takes precedence over the platform config dir.
pub fn discover() -> PathBuf {
    let local = PathBuf::from("ayab.toml");
    if local.exists() {
        return local;
    }
    if let Some(dir) = dirs::config_dir() {
        return dir.join("ayab").join("ayab.toml");
    }
    PathBuf::from("ayab.toml")
}

/// Load and parse the config file at `path` (or the discovered default).
/// A missing or unparsable job configuration is a hard error — there is no
/// sane default knit job to fall back to.
pub fn load_from(path: Option<PathBuf>) -> Result<ConfigFile> {
    let path = path.unwrap_or_else(discover);
    let content = fs::read_to_string(&path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    let file: ConfigFile = toml::from_str(&content)
        .with_context(|| format!("parsing config file {}", path.display()))?;
    tracing::info!(target: "engine.config", path = %path.display(), "loaded config file");
    Ok(file)
}

/// Turn a parsed [`ConfigFile`] into the validated record the engine runs
/// with. Kept as a free function, not a method on `ConfigFile`, so this
/// crate stays the only one that knows about TOML at all.
pub fn validate(file: ConfigFile) -> Result<ayab_machine::Config, ayab_machine::ConfigError> {
    ayab_machine::Config::validate(
        Machine::new(file.machine_width),
        file.num_colors,
        file.start_row,
        file.mode.into(),
        file.inf_repeat,
        file.continuous_reporting,
        file.alignment.into(),
        file.knit_start_needle,
        file.knit_stop_needle,
        file.port,
    )
}

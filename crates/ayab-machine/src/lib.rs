//! Machine geometry, knitting modes and job configuration.
//!
//! This crate has no knowledge of images, serial wire formats or the
//! driving state machine; it only answers the question "given this
//! configuration, where do needles live and how many passes does a mode
//! need per image row".

use thiserror::Error;

/// A flat-bed knitting machine. Only the needle width is configurable; the
/// engine does not support machines other than a 200-needle bed with an
/// optional ribber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Machine {
    pub width: u16,
}

impl Default for Machine {
    fn default() -> Self {
        Self { width: 200 }
    }
}

impl Machine {
    pub const fn new(width: u16) -> Self {
        Self { width }
    }

    pub const fn needle_count(&self) -> u16 {
        self.width
    }
}

/// Position of the (possibly narrower) pattern within the knit window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alignment {
    Left,
    Center,
    Right,
}

/// Knitting mode: encodes how image rows are interleaved into physical
/// carriage passes. Per-mode line formulas live in `ayab-planner`; this enum
/// only carries the mode-level facts every other component needs (valid
/// color counts, passes per row, flanking behavior).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnittingMode {
    Singlebed,
    ClassicRibber,
    MiddleColorsTwiceRibber,
    HeartOfPlutoRibber,
    CircularRibber,
}

impl KnittingMode {
    /// Number of physical carriage passes consumed per image row.
    pub fn row_multiplier(&self, num_colors: u8) -> u32 {
        match self {
            KnittingMode::Singlebed => 1,
            KnittingMode::ClassicRibber if num_colors == 2 => 2,
            KnittingMode::ClassicRibber => 2 * num_colors as u32,
            KnittingMode::MiddleColorsTwiceRibber | KnittingMode::HeartOfPlutoRibber => {
                2 * num_colors as u32 - 2
            }
            KnittingMode::CircularRibber => 2 * num_colors as u32,
        }
    }

    /// Whether `num_colors` is an admissible color count for this mode.
    pub fn valid_color_count(&self, num_colors: u8) -> bool {
        match self {
            KnittingMode::Singlebed | KnittingMode::CircularRibber => num_colors == 2,
            _ => (2..=6).contains(&num_colors),
        }
    }

    /// Whether the pass for `color` (out of `num_colors`) is the ribber
    /// "solid" pass that must fill needles outside the pattern window.
    pub fn flanking_needles(&self, color: u8, num_colors: u8) -> bool {
        match self {
            KnittingMode::ClassicRibber => color == 0,
            KnittingMode::MiddleColorsTwiceRibber | KnittingMode::HeartOfPlutoRibber => {
                color == num_colors.saturating_sub(1)
            }
            KnittingMode::Singlebed | KnittingMode::CircularRibber => false,
        }
    }
}

/// The needle window computed once per configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub pat_start_needle: i32,
    pub start_needle: u16,
    pub end_needle: u16,
    pub start_pixel: u16,
    pub end_pixel: u16,
}

impl Geometry {
    /// Compute the needle window for a pattern of `pat_width` pixels,
    /// aligned within `[knit_start, knit_stop]` on `machine`.
    pub fn compute(
        machine: Machine,
        pat_width: u16,
        alignment: Alignment,
        knit_start_needle: u16,
        knit_stop_needle: u16,
    ) -> Self {
        let needle_width = knit_stop_needle as i32 - knit_start_needle as i32 + 1;
        let pat_start_needle = match alignment {
            Alignment::Center => {
                knit_start_needle as i32 + (needle_width - pat_width as i32 + 1).div_euclid(2)
            }
            Alignment::Left => knit_start_needle as i32,
            Alignment::Right => knit_stop_needle as i32 - pat_width as i32 + 1,
        };

        let start_needle = pat_start_needle.max(0) as u16;
        let end_needle = ((pat_start_needle + pat_width as i32).max(0) as u32)
            .min(machine.width as u32) as u16;
        let start_pixel = (start_needle as i32 - pat_start_needle).max(0) as u16;
        let end_pixel = (end_needle as i32 - pat_start_needle).max(0) as u16;

        Self {
            pat_start_needle,
            start_needle,
            end_needle,
            start_pixel,
            end_pixel,
        }
    }
}

/// Validated, immutable job configuration. Built once from raw option
/// values by [`Config::validate`]; the engine never mutates a `Config` in
/// place, rebuilding it wholesale on any setting change instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub machine: Machine,
    pub num_colors: u8,
    pub start_row: u32,
    pub mode: KnittingMode,
    pub inf_repeat: bool,
    pub continuous_reporting: bool,
    pub alignment: Alignment,
    pub knit_start_needle: u16,
    pub knit_stop_needle: u16,
    pub port: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("num_colors {0} out of range [2,6]")]
    NumColorsOutOfRange(u8),
    #[error("mode {mode:?} does not accept {num_colors} colors")]
    ModeColorMismatch { mode: KnittingMode, num_colors: u8 },
    #[error(
        "knit window invalid: start {start} must be < stop {stop} < machine width {width}"
    )]
    InvalidKnitWindow { start: u16, stop: u16, width: u16 },
    #[error("port must not be empty")]
    EmptyPort,
}

impl Config {
    /// Validate raw option values, returning the immutable record used for
    /// the rest of the job.
    #[allow(clippy::too_many_arguments)]
    pub fn validate(
        machine: Machine,
        num_colors: u8,
        start_row: u32,
        mode: KnittingMode,
        inf_repeat: bool,
        continuous_reporting: bool,
        alignment: Alignment,
        knit_start_needle: u16,
        knit_stop_needle: u16,
        port: String,
    ) -> Result<Self, ConfigError> {
        if !(2..=6).contains(&num_colors) {
            return Err(ConfigError::NumColorsOutOfRange(num_colors));
        }
        if !mode.valid_color_count(num_colors) {
            return Err(ConfigError::ModeColorMismatch { mode, num_colors });
        }
        let window_valid = knit_start_needle < knit_stop_needle
            && knit_stop_needle <= machine.width.saturating_sub(1);
        if !window_valid {
            return Err(ConfigError::InvalidKnitWindow {
                start: knit_start_needle,
                stop: knit_stop_needle,
                width: machine.width,
            });
        }
        if port.is_empty() {
            return Err(ConfigError::EmptyPort);
        }

        Ok(Self {
            machine,
            num_colors,
            start_row,
            mode,
            inf_repeat,
            continuous_reporting,
            alignment,
            knit_start_needle,
            knit_stop_needle,
            port,
        })
    }

    pub fn geometry(&self, pat_width: u16) -> Geometry {
        Geometry::compute(
            self.machine,
            pat_width,
            self.alignment,
            self.knit_start_needle,
            self.knit_stop_needle,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_args(mode: KnittingMode, num_colors: u8) -> Config {
        Config::validate(
            Machine::default(),
            num_colors,
            0,
            mode,
            false,
            false,
            Alignment::Center,
            0,
            199,
            "Simulation".to_string(),
        )
        .unwrap()
    }

    #[test]
    fn singlebed_rejects_wrong_color_count() {
        let err = Config::validate(
            Machine::default(),
            3,
            0,
            KnittingMode::Singlebed,
            false,
            false,
            Alignment::Center,
            0,
            199,
            "Simulation".to_string(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            ConfigError::ModeColorMismatch {
                mode: KnittingMode::Singlebed,
                num_colors: 3
            }
        );
    }

    #[test]
    fn circular_rejects_wrong_color_count() {
        let err = Config::validate(
            Machine::default(),
            3,
            0,
            KnittingMode::CircularRibber,
            false,
            false,
            Alignment::Center,
            0,
            199,
            "Simulation".to_string(),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::ModeColorMismatch { .. }));
    }

    #[test]
    fn classic_ribber_accepts_multicolor() {
        let cfg = valid_args(KnittingMode::ClassicRibber, 4);
        assert_eq!(cfg.num_colors, 4);
    }

    #[test]
    fn rejects_inverted_knit_window() {
        let err = Config::validate(
            Machine::default(),
            2,
            0,
            KnittingMode::Singlebed,
            false,
            false,
            Alignment::Center,
            150,
            100,
            "Simulation".to_string(),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidKnitWindow { .. }));
    }

    #[test]
    fn rejects_empty_port() {
        let err = Config::validate(
            Machine::default(),
            2,
            0,
            KnittingMode::Singlebed,
            false,
            false,
            Alignment::Center,
            0,
            199,
            String::new(),
        )
        .unwrap_err();
        assert_eq!(err, ConfigError::EmptyPort);
    }

    #[test]
    fn geometry_center_4px_on_200_width() {
        // S1: 4-pixel pattern centered on a 200-needle bed knit 0..199.
        let geo = Geometry::compute(Machine::default(), 4, Alignment::Center, 0, 199);
        assert_eq!(geo.start_needle, 98);
        assert_eq!(geo.end_needle, 102);
        assert_eq!(geo.start_pixel, 0);
        assert_eq!(geo.end_pixel, 4);
    }

    #[test]
    fn geometry_round_trip_all_alignments() {
        for alignment in [Alignment::Left, Alignment::Center, Alignment::Right] {
            for pat_width in 1..=200u16 {
                let geo = Geometry::compute(Machine::default(), pat_width, alignment, 0, 199);
                assert_eq!(geo.start_pixel as i32, geo.start_needle as i32 - geo.pat_start_needle);
                assert_eq!(geo.end_pixel as i32, geo.end_needle as i32 - geo.pat_start_needle);
            }
        }
    }

    #[test]
    fn row_multiplier_matches_mode() {
        assert_eq!(KnittingMode::Singlebed.row_multiplier(2), 1);
        assert_eq!(KnittingMode::ClassicRibber.row_multiplier(2), 2);
        assert_eq!(KnittingMode::ClassicRibber.row_multiplier(3), 6);
        assert_eq!(KnittingMode::MiddleColorsTwiceRibber.row_multiplier(3), 4);
        assert_eq!(KnittingMode::HeartOfPlutoRibber.row_multiplier(4), 6);
        assert_eq!(KnittingMode::CircularRibber.row_multiplier(2), 4);
    }
}

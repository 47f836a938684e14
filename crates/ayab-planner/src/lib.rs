//! Line planning and needle-bitmap encoding.
//!
//! Mode dispatch is a plain match over the `KnittingMode` tagged variant
//! with one formula function per arm, not a runtime name lookup.

use ayab_image::PatternBuffer;
use ayab_machine::{Geometry, KnittingMode, Machine};

/// The plan for one physical carriage pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinePlan {
    pub color: u8,
    pub expanded_index: u32,
    pub img_row: u32,
    pub blank: bool,
    pub last: bool,
}

/// Compute the plan for physical pass `line_number` (spec §4.3). All
/// arithmetic is integer and non-negative; intermediate terms that could
/// otherwise go negative (the `-1` offset in the classic-ribber 2-color
/// formula) are carried in `i64` and folded back with `rem_euclid`.
#[allow(clippy::too_many_arguments)]
pub fn plan(
    line_number: u64,
    mode: KnittingMode,
    num_colors: u8,
    start_row: u32,
    img_height: u32,
    expanded_len: u32,
    inf_repeat: bool,
) -> LinePlan {
    let num_colors = num_colors as i64;
    let start_row = start_row as i64;
    let img_height = img_height as i64;
    let expanded_len = expanded_len as i64;
    let line = line_number as i64;

    match mode {
        KnittingMode::Singlebed => singlebed(line, start_row, img_height, inf_repeat),
        KnittingMode::ClassicRibber if num_colors == 2 => {
            classic_ribber_2col(line, start_row, img_height, expanded_len, inf_repeat)
        }
        KnittingMode::ClassicRibber => classic_ribber_multicolor(
            line,
            num_colors,
            start_row,
            img_height,
            expanded_len,
            inf_repeat,
        ),
        KnittingMode::MiddleColorsTwiceRibber => {
            middle_colors_twice(line, num_colors, start_row, img_height, inf_repeat)
        }
        KnittingMode::HeartOfPlutoRibber => {
            heart_of_pluto(line, num_colors, start_row, img_height, inf_repeat)
        }
        KnittingMode::CircularRibber => {
            circular(line, num_colors, start_row, img_height, expanded_len, inf_repeat)
        }
    }
}

fn rem(a: i64, m: i64) -> i64 {
    a.rem_euclid(m)
}

fn singlebed(mut line: i64, start_row: i64, img_height: i64, inf_repeat: bool) -> LinePlan {
    if inf_repeat {
        line = rem(line, img_height);
    }
    let img_row = rem(start_row + line, img_height);
    LinePlan {
        color: 0,
        expanded_index: (2 * img_row) as u32,
        img_row: img_row as u32,
        blank: false,
        last: img_row == img_height - 1,
    }
}

fn classic_ribber_2col(
    mut line: i64,
    start_row: i64,
    img_height: i64,
    expanded_len: i64,
    inf_repeat: bool,
) -> LinePlan {
    let i = rem(line, 4) as usize;
    if inf_repeat {
        line = rem(line, expanded_len);
    }
    let img_row = rem(start_row + line.div_euclid(2), img_height);
    const COLOR: [u8; 4] = [0, 1, 1, 0];
    const OFFSET: [i64; 4] = [0, 0, 1, -1];
    let color = COLOR[i];
    let expanded_index = rem(2 * start_row + line + OFFSET[i], expanded_len);
    LinePlan {
        color,
        expanded_index: expanded_index as u32,
        img_row: img_row as u32,
        blank: false,
        last: img_row == img_height - 1 && (i == 1 || i == 3),
    }
}

fn classic_ribber_multicolor(
    mut line: i64,
    num_colors: i64,
    start_row: i64,
    img_height: i64,
    expanded_len: i64,
    inf_repeat: bool,
) -> LinePlan {
    if inf_repeat {
        line = rem(line, 2 * expanded_len);
    }
    let img_row = rem(start_row + line.div_euclid(2 * num_colors), img_height);
    let color = rem(line.div_euclid(2), num_colors);
    let expanded_index = rem(color + img_row * num_colors, expanded_len);
    let blank = rem(line, 2) == 1;
    let last = expanded_index == expanded_len - 1 && blank;
    LinePlan {
        color: color as u8,
        expanded_index: expanded_index as u32,
        img_row: img_row as u32,
        blank,
        last,
    }
}

fn middle_colors_twice(
    line: i64,
    num_colors: i64,
    start_row: i64,
    img_height: i64,
    inf_repeat: bool,
) -> LinePlan {
    let pass_per_row = 2 * num_colors - 2;
    let q = line.div_euclid(pass_per_row);
    let r = line.rem_euclid(pass_per_row);
    let first = r == 0;
    let last_col = r == pass_per_row - 1;
    let mut img_row = start_row + q;
    if inf_repeat {
        img_row = rem(img_row, img_height);
    }
    let color = if first || last_col {
        rem(last_col as i64 + q, 2)
    } else {
        (r + 3).div_euclid(2)
    };
    let expanded_index = img_row * num_colors + color;
    let blank = !first && !last_col && rem(line, 2) == 1;
    let last = img_row == img_height - 1 && last_col;
    LinePlan {
        color: color as u8,
        expanded_index: expanded_index as u32,
        img_row: img_row as u32,
        blank,
        last,
    }
}

fn heart_of_pluto(
    line: i64,
    num_colors: i64,
    start_row: i64,
    img_height: i64,
    inf_repeat: bool,
) -> LinePlan {
    let pass_per_row = 2 * num_colors - 2;
    let q = line.div_euclid(pass_per_row);
    let r = line.rem_euclid(pass_per_row);
    let first = r == 0;
    let last_col = r == pass_per_row - 1;
    let mut img_row = start_row + q;
    if inf_repeat {
        img_row = rem(img_row, img_height);
    }
    let color = num_colors - 1 - rem(line + 1, 2 * num_colors).div_euclid(2);
    let expanded_index = img_row * num_colors + color;
    let blank = !first && !last_col && rem(line, 2) == 0;
    let last = img_row == img_height - 1 && last_col;
    LinePlan {
        color: color as u8,
        expanded_index: expanded_index as u32,
        img_row: img_row as u32,
        blank,
        last,
    }
}

fn circular(
    line: i64,
    num_colors: i64,
    start_row: i64,
    img_height: i64,
    expanded_len: i64,
    inf_repeat: bool,
) -> LinePlan {
    let blank = rem(line, 2) == 1;
    let mut h = line.div_euclid(2);
    if inf_repeat {
        h = rem(h, expanded_len);
    }
    let q = h.div_euclid(num_colors);
    let color = h.rem_euclid(num_colors);
    let img_row = rem(start_row + q, img_height);
    let expanded_index = rem(img_row * num_colors + color, expanded_len);
    let last = expanded_index == expanded_len - 1 && blank;
    LinePlan {
        color: color as u8,
        expanded_index: expanded_index as u32,
        img_row: img_row as u32,
        blank,
        last,
    }
}

/// 25-byte (200-bit) needle selection bitmap for one physical pass.
/// Needle 0 is the lowest bit of byte 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineFrame {
    bytes: [u8; 25],
}

impl LineFrame {
    pub fn zeroed() -> Self {
        Self { bytes: [0u8; 25] }
    }

    pub fn set(&mut self, needle: u16, value: bool) {
        let byte = (needle / 8) as usize;
        let bit = (needle % 8) as u8;
        if value {
            self.bytes[byte] |= 1 << bit;
        } else {
            self.bytes[byte] &= !(1 << bit);
        }
    }

    pub fn get(&self, needle: u16) -> bool {
        let byte = (needle / 8) as usize;
        let bit = (needle % 8) as u8;
        self.bytes[byte] & (1 << bit) != 0
    }

    pub fn as_bytes(&self) -> &[u8; 25] {
        &self.bytes
    }
}

/// Composes the needle bitmap for one plan.
pub struct LineEncoder;

impl LineEncoder {
    pub fn encode(
        plan: &LinePlan,
        mode: KnittingMode,
        num_colors: u8,
        machine: Machine,
        geometry: Geometry,
        pattern: &PatternBuffer,
    ) -> LineFrame {
        let mut frame = LineFrame::zeroed();

        if mode.flanking_needles(plan.color, num_colors) {
            for needle in 0..geometry.start_needle {
                frame.set(needle, true);
            }
            for needle in geometry.end_needle..machine.width {
                frame.set(needle, true);
            }
        }

        if !plan.blank {
            let row = &pattern.expanded[plan.expanded_index as usize];
            for (offset, pixel) in row[geometry.start_pixel as usize..geometry.end_pixel as usize]
                .iter()
                .enumerate()
            {
                if *pixel != 0 {
                    frame.set(geometry.start_needle + offset as u16, true);
                }
            }
        }

        frame
    }
}

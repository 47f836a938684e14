//! Image capability trait and the `PatternBuffer` that turns a quantised
//! raster into per-color bit-planes.
//!
//! Loading, editing and rendering images is explicitly out of scope;
//! this crate only defines the seam
//! (`Image`/`QuantisedImage`) the engine consumes and ships one reference
//! implementation (`RgbaImage`) so the crate is runnable standalone. A real
//! host can substitute any other `Image` implementation (for example one
//! backed by a full `libimagequant` pipeline) without touching
//! `PatternBuffer`.

use ayab_machine::Machine;
use rgb::RGB8;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ImageError {
    #[error("image has zero width or height")]
    EmptyImage,
}

/// Result of quantising a raster to `num_colors` palette entries. Indices
/// are row-major, `indices[y * width + x]` is the palette index of pixel
/// `(x, y)`. `histogram[i]` is the number of pixels assigned to palette
/// entry `i`, in whatever order the quantizer produced the palette —
/// `PatternBuffer` is responsible for remapping to frequency order.
#[derive(Debug, Clone)]
pub struct QuantisedImage {
    pub width: u32,
    pub height: u32,
    pub indices: Vec<u8>,
    pub histogram: Vec<u32>,
    pub palette: Vec<RGB8>,
}

impl QuantisedImage {
    pub fn index_at(&self, x: u32, y: u32) -> u8 {
        self.indices[(y * self.width + x) as usize]
    }
}

/// External collaborator: a raster image the engine can read pixels from
/// and quantise to a limited palette.
pub trait Image {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn get_pixel(&self, x: u32, y: u32) -> RGB8;
    fn quantise(&self, num_colors: u8) -> QuantisedImage;
}

/// A plain row-major RGB8 buffer with a popularity-based reference
/// quantizer: the `num_colors` most common distinct colors (in order of
/// first appearance) become the palette; every other pixel is assigned to
/// its nearest palette entry by squared Euclidean distance, ties broken
/// toward the lower index.
#[derive(Debug, Clone)]
pub struct RgbaImage {
    width: u32,
    height: u32,
    pixels: Vec<RGB8>,
}

impl RgbaImage {
    pub fn new(width: u32, height: u32, pixels: Vec<RGB8>) -> Self {
        assert_eq!(pixels.len(), (width * height) as usize);
        Self {
            width,
            height,
            pixels,
        }
    }

    fn nearest_palette_index(palette: &[RGB8], color: RGB8) -> u8 {
        let mut best_index = 0u8;
        let mut best_dist = u32::MAX;
        for (i, candidate) in palette.iter().enumerate() {
            let dist = sq_dist(*candidate, color);
            if dist < best_dist {
                best_dist = dist;
                best_index = i as u8;
            }
        }
        best_index
    }
}

fn sq_dist(a: RGB8, b: RGB8) -> u32 {
    let dr = a.r as i32 - b.r as i32;
    let dg = a.g as i32 - b.g as i32;
    let db = a.b as i32 - b.b as i32;
    (dr * dr + dg * dg + db * db) as u32
}

impl Image for RgbaImage {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn get_pixel(&self, x: u32, y: u32) -> RGB8 {
        self.pixels[(y * self.width + x) as usize]
    }

    fn quantise(&self, num_colors: u8) -> QuantisedImage {
        let mut order: Vec<RGB8> = Vec::new();
        for pixel in &self.pixels {
            if !order.contains(pixel) {
                order.push(*pixel);
            }
        }

        let mut palette: Vec<RGB8> = order.into_iter().take(num_colors as usize).collect();
        while palette.len() < num_colors as usize {
            palette.push(RGB8::new(0, 0, 0));
        }

        let mut histogram = vec![0u32; num_colors as usize];
        let mut indices = Vec::with_capacity(self.pixels.len());
        for pixel in &self.pixels {
            let index = Self::nearest_palette_index(&palette, *pixel);
            histogram[index as usize] += 1;
            indices.push(index);
        }

        QuantisedImage {
            width: self.width,
            height: self.height,
            indices,
            histogram,
            palette,
        }
    }
}

/// Per-row, per-color expanded bit-planes built from a quantised image.
/// Read-only once built; callers rebuild atomically on any configuration
/// change rather than mutating in place.
#[derive(Debug, Clone)]
pub struct PatternBuffer {
    pub width: u32,
    pub height: u32,
    pub num_colors: u8,
    /// `intern[row][col]` is the palette index (0 = most frequent) of the
    /// pixel at `(col, row)`.
    pub intern: Vec<Vec<u8>>,
    /// `expanded[num_colors * row + color][col]` is 1 iff pixel `(col,
    /// row)` belongs to `color`.
    pub expanded: Vec<Vec<u8>>,
    pub palette: Vec<RGB8>,
}

impl PatternBuffer {
    pub fn build(image: &dyn Image, num_colors: u8, _machine: Machine) -> Result<Self, ImageError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(ImageError::EmptyImage);
        }

        let quantised = image.quantise(num_colors);
        let width = quantised.width;
        let height = quantised.height;

        // Remap palette indices to descending-frequency order; ties keep
        // the original (first-appearance) relative order, matching a
        // stable sort.
        let mut order: Vec<usize> = (0..num_colors as usize).collect();
        order.sort_by(|&a, &b| quantised.histogram[b].cmp(&quantised.histogram[a]));
        let mut remap = vec![0u8; num_colors as usize];
        for (new_index, &old_index) in order.iter().enumerate() {
            remap[old_index] = new_index as u8;
        }

        let observed = quantised.histogram.iter().filter(|&&c| c > 0).count();
        if observed < num_colors as usize {
            tracing::warn!(
                target: "engine.pattern",
                observed,
                requested = num_colors,
                "fewer distinct colors observed than requested; lower indices kept filled"
            );
        }

        let palette: Vec<RGB8> = order.iter().map(|&old| quantised.palette[old]).collect();

        let mut intern = vec![vec![0u8; width as usize]; height as usize];
        let mut expanded =
            vec![vec![0u8; width as usize]; num_colors as usize * height as usize];

        for row in 0..height {
            for col in 0..width {
                let old_index = quantised.index_at(col, row);
                let new_index = remap[old_index as usize];
                intern[row as usize][col as usize] = new_index;
                expanded[num_colors as usize * row as usize + new_index as usize]
                    [col as usize] = 1;
            }
        }

        Ok(Self {
            width,
            height,
            num_colors,
            intern,
            expanded,
            palette,
        })
    }

    pub fn expanded_len(&self) -> u32 {
        self.num_colors as u32 * self.height
    }
}

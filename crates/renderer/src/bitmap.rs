//! RGBA8 bitmap

use overlay_pro_shared::{OverlayError, OverlayResult, Rgba};

/// Straight-alpha RGBA8 image, row-major, no padding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Bitmap {
    /// Fully transparent bitmap
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize * 4],
        }
    }

    pub fn filled(width: u32, height: u32, color: Rgba) -> Self {
        let mut bitmap = Self::new(width, height);
        bitmap.pixels_mut().fill(color.0);
        bitmap
    }

    /// Wrap raw RGBA bytes, e.g. from `ImageData`
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> OverlayResult<Self> {
        let expected = width as usize * height as usize * 4;
        if data.len() != expected {
            return Err(OverlayError::decode(format!(
                "{}x{} bitmap needs {} bytes, got {}",
                width,
                height,
                expected,
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn pixels(&self) -> &[[u8; 4]] {
        bytemuck::cast_slice(&self.data)
    }

    pub fn pixels_mut(&mut self) -> &mut [[u8; 4]] {
        bytemuck::cast_slice_mut(&mut self.data)
    }

    fn index(&self, x: u32, y: u32) -> Option<usize> {
        (x < self.width && y < self.height).then(|| y as usize * self.width as usize + x as usize)
    }

    pub fn get(&self, x: u32, y: u32) -> Option<Rgba> {
        self.index(x, y).map(|i| Rgba(self.pixels()[i]))
    }

    /// Write one pixel; out-of-bounds writes are ignored
    pub fn put(&mut self, x: u32, y: u32, color: Rgba) {
        if let Some(i) = self.index(x, y) {
            self.pixels_mut()[i] = color.0;
        }
    }

    /// Nearest-neighbour upscale by an integer factor
    pub fn scale_nearest(&self, factor: u32) -> Bitmap {
        let factor = factor.max(1);
        let width = self.width * factor;
        let height = self.height * factor;
        let mut out = Bitmap::new(width, height);
        if width == 0 || height == 0 {
            return out;
        }

        let src = self.pixels();
        let src_width = self.width as usize;
        for (row_index, row) in out.pixels_mut().chunks_exact_mut(width as usize).enumerate() {
            let src_row = row_index / factor as usize;
            let src_row = &src[src_row * src_width..(src_row + 1) * src_width];
            for (x, pixel) in row.iter_mut().enumerate() {
                *pixel = src_row[x / factor as usize];
            }
        }
        out
    }
}

//! Local RGBA raster the renderer draws into.

use crate::error::{ClassroomError, ClassroomResult};
use kurbo::{Point, Rect};

/// An RGBA8 pixel buffer in device pixels. Starts fully transparent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Raster {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

/// How a covered pixel is written.
#[derive(Debug, Clone, Copy)]
enum PixelOp {
    /// Source-over blend of an RGB color at the given opacity.
    Paint { rgb: [u8; 3], alpha: f32 },
    /// Destination-out: the pixel becomes transparent.
    Erase,
}

impl Raster {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize * 4],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// The RGBA value at `(x, y)`, or `None` outside the raster.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = self.index(x, y);
        Some([
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        ])
    }

    /// Reset every pixel to transparent.
    pub fn clear(&mut self) {
        self.pixels.fill(0);
    }

    /// Draw a round-capped line segment of width `line_width`.
    pub fn stroke_segment(&mut self, from: Point, to: Point, rgb: [u8; 3], line_width: f64, alpha: f32) {
        let op = PixelOp::Paint {
            rgb,
            alpha: alpha.clamp(0.0, 1.0),
        };
        self.fill_capsule(from, to, line_width / 2.0, op);
    }

    /// Punch a transparent disc of the given radius.
    pub fn erase_circle(&mut self, center: Point, radius: f64) {
        self.fill_capsule(center, center, radius, PixelOp::Erase);
    }

    /// Encode the raster as PNG.
    pub fn to_png(&self) -> ClassroomResult<Vec<u8>> {
        let mut png_data = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut png_data, self.width, self.height);
            encoder.set_color(png::ColorType::Rgba);
            encoder.set_depth(png::BitDepth::Eight);

            let mut writer = encoder
                .write_header()
                .map_err(|e| ClassroomError::Validation(format!("PNG header: {}", e)))?;
            writer
                .write_image_data(&self.pixels)
                .map_err(|e| ClassroomError::Validation(format!("PNG data: {}", e)))?;
        }
        Ok(png_data)
    }

    fn index(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * 4
    }

    /// Apply `op` to every pixel whose center lies within `radius` of the
    /// segment `a`-`b`.
    fn fill_capsule(&mut self, a: Point, b: Point, radius: f64, op: PixelOp) {
        if self.width == 0 || self.height == 0 || radius <= 0.0 {
            return;
        }
        let bounds = Rect::from_points(a, b).inflate(radius, radius);
        let x0 = bounds.x0.floor().max(0.0) as u32;
        let y0 = bounds.y0.floor().max(0.0) as u32;
        let x1 = (bounds.x1.ceil().max(0.0) as u32).min(self.width - 1);
        let y1 = (bounds.y1.ceil().max(0.0) as u32).min(self.height - 1);
        if x0 > x1 || y0 > y1 {
            return;
        }

        let r2 = radius * radius;
        for y in y0..=y1 {
            for x in x0..=x1 {
                let p = Point::new(x as f64 + 0.5, y as f64 + 0.5);
                if distance_sq_to_segment(p, a, b) <= r2 {
                    self.apply(x, y, op);
                }
            }
        }
    }

    fn apply(&mut self, x: u32, y: u32, op: PixelOp) {
        let i = self.index(x, y);
        match op {
            PixelOp::Erase => {
                self.pixels[i..i + 4].fill(0);
            }
            PixelOp::Paint { rgb, alpha } => {
                let dst_a = self.pixels[i + 3] as f32 / 255.0;
                let out_a = alpha + dst_a * (1.0 - alpha);
                if out_a <= 0.0 {
                    return;
                }
                for c in 0..3 {
                    let src = rgb[c] as f32;
                    let dst = self.pixels[i + c] as f32;
                    let blended = (src * alpha + dst * dst_a * (1.0 - alpha)) / out_a;
                    self.pixels[i + c] = blended.round().clamp(0.0, 255.0) as u8;
                }
                self.pixels[i + 3] = (out_a * 255.0).round() as u8;
            }
        }
    }
}

fn distance_sq_to_segment(p: Point, a: Point, b: Point) -> f64 {
    let ab = b - a;
    let len_sq = ab.hypot2();
    if len_sq == 0.0 {
        return (p - a).hypot2();
    }
    let t = ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    let closest = a + ab * t;
    (p - closest).hypot2()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_raster_is_transparent() {
        let raster = Raster::new(4, 4);
        assert_eq!(raster.pixel(0, 0), Some([0, 0, 0, 0]));
        assert_eq!(raster.pixel(4, 0), None);
    }

    #[test]
    fn test_stroke_paints_along_segment() {
        let mut raster = Raster::new(20, 20);
        raster.stroke_segment(Point::new(2.0, 10.0), Point::new(18.0, 10.0), [255, 0, 0], 3.0, 1.0);

        assert_eq!(raster.pixel(10, 10), Some([255, 0, 0, 255]));
        assert_eq!(raster.pixel(10, 2), Some([0, 0, 0, 0]));
    }

    #[test]
    fn test_half_alpha_stroke() {
        let mut raster = Raster::new(10, 10);
        raster.stroke_segment(Point::new(5.0, 5.0), Point::new(5.0, 5.0), [0, 0, 255], 4.0, 0.5);

        let [_, _, b, a] = raster.pixel(5, 5).unwrap();
        assert_eq!(b, 255);
        assert_eq!(a, 128);
    }

    #[test]
    fn test_erase_circle_clears_pixels() {
        let mut raster = Raster::new(20, 20);
        raster.stroke_segment(Point::new(0.0, 10.0), Point::new(20.0, 10.0), [0, 0, 0], 6.0, 1.0);
        raster.erase_circle(Point::new(10.0, 10.0), 3.0);

        assert_eq!(raster.pixel(10, 10), Some([0, 0, 0, 0]));
        assert_eq!(raster.pixel(2, 10).unwrap()[3], 255);
    }

    #[test]
    fn test_png_signature() {
        let raster = Raster::new(3, 2);
        let png = raster.to_png().unwrap();
        assert_eq!(&png[..8], &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]);
    }
}

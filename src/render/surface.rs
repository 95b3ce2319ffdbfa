use std::io::Cursor;

use image::ImageEncoder;

use crate::{
    core::Canvas,
    error::{EngineError, EngineResult},
    render::composite,
};

/// One drawable buffer of premultiplied RGBA8 pixels (r,g,b already
/// multiplied by a).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Surface {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Surface {
    pub fn new(canvas: Canvas) -> Self {
        Self {
            width: canvas.width,
            height: canvas.height,
            data: vec![0u8; canvas.byte_len()],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Reset every pixel to `bg` (straight RGBA, premultiplied on the way
    /// in). Called before each frame's drawing begins.
    pub fn clear(&mut self, bg: [u8; 4]) {
        let px = composite::premultiply(bg);
        for chunk in self.data.chunks_exact_mut(4) {
            chunk.copy_from_slice(&px);
        }
    }

    /// Fill an axis-aligned rectangle with a straight-RGBA color, clipped to
    /// the surface. Alpha composites over existing pixels.
    pub fn fill_rect(&mut self, x: i32, y: i32, w: u32, h: u32, color: [u8; 4]) {
        let src = composite::premultiply(color);
        let x0 = x.max(0) as u32;
        let y0 = y.max(0) as u32;
        let x1 = (x.saturating_add(w as i32)).clamp(0, self.width as i32) as u32;
        let y1 = (y.saturating_add(h as i32)).clamp(0, self.height as i32) as u32;
        if x0 >= x1 || y0 >= y1 {
            return;
        }
        let opaque = src[3] == 255;
        for row in y0..y1 {
            let start = ((row * self.width + x0) * 4) as usize;
            let end = ((row * self.width + x1) * 4) as usize;
            let span = &mut self.data[start..end];
            if opaque {
                for chunk in span.chunks_exact_mut(4) {
                    chunk.copy_from_slice(&src);
                }
            } else {
                for chunk in span.chunks_exact_mut(4) {
                    let out = composite::over([chunk[0], chunk[1], chunk[2], chunk[3]], src, 1.0);
                    chunk.copy_from_slice(&out);
                }
            }
        }
    }

    /// Copy another equally-sized surface's pixels verbatim.
    pub fn copy_from(&mut self, src: &Surface) -> EngineResult<()> {
        self.check_same_size(src)?;
        self.data.copy_from_slice(&src.data);
        Ok(())
    }

    /// Composite an equally-sized surface over this one at the given
    /// opacity.
    pub fn composite_over(&mut self, src: &Surface, opacity: f32) -> EngineResult<()> {
        self.check_same_size(src)?;
        composite::over_in_place(&mut self.data, &src.data, opacity)
    }

    /// Composite a (possibly smaller) surface over this one with its top-left
    /// corner at (x, y), clipped to this surface.
    pub fn blit(&mut self, src: &Surface, x: i32, y: i32) {
        for src_row in 0..src.height {
            let dst_row = y + src_row as i32;
            if dst_row < 0 || dst_row >= self.height as i32 {
                continue;
            }
            for src_col in 0..src.width {
                let dst_col = x + src_col as i32;
                if dst_col < 0 || dst_col >= self.width as i32 {
                    continue;
                }
                let s = ((src_row * src.width + src_col) * 4) as usize;
                let d = ((dst_row as u32 * self.width + dst_col as u32) * 4) as usize;
                let out = composite::over(
                    [
                        self.data[d],
                        self.data[d + 1],
                        self.data[d + 2],
                        self.data[d + 3],
                    ],
                    [
                        src.data[s],
                        src.data[s + 1],
                        src.data[s + 2],
                        src.data[s + 3],
                    ],
                    1.0,
                );
                self.data[d..d + 4].copy_from_slice(&out);
            }
        }
    }

    /// Encode this surface as a PNG. On-demand only; never on the hot path.
    pub fn encode_png(&self) -> EngineResult<Vec<u8>> {
        let mut out = Cursor::new(Vec::new());
        image::codecs::png::PngEncoder::new(&mut out)
            .write_image(
                &self.data,
                self.width,
                self.height,
                image::ExtendedColorType::Rgba8,
            )
            .map_err(|e| EngineError::render(format!("png encode failed: {e}")))?;
        Ok(out.into_inner())
    }

    fn check_same_size(&self, other: &Surface) -> EngineResult<()> {
        if self.width != other.width || self.height != other.height {
            return Err(EngineError::render(format!(
                "surface size mismatch: {}x{} vs {}x{}",
                self.width, self.height, other.width, other.height
            )));
        }
        Ok(())
    }
}

/// The double buffer: an arena of two equally-sized surfaces plus a parity
/// bit naming the front one. The renderer draws only into the back surface;
/// `swap` is the only operation that changes which buffer the sink sees, so
/// a draw can never target the exposed buffer.
#[derive(Debug)]
pub struct FramePair {
    surfaces: [Surface; 2],
    front: usize,
}

impl FramePair {
    pub fn new(canvas: Canvas) -> Self {
        Self {
            surfaces: [Surface::new(canvas), Surface::new(canvas)],
            front: 0,
        }
    }

    pub fn front(&self) -> &Surface {
        &self.surfaces[self.front]
    }

    pub fn back_mut(&mut self) -> &mut Surface {
        &mut self.surfaces[1 - self.front]
    }

    /// Exchange the front/back roles. Content is untouched: the buffer
    /// exposed as front after the swap is exactly the back buffer from
    /// before it.
    pub fn swap(&mut self) {
        self.front = 1 - self.front;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canvas(w: u32, h: u32) -> Canvas {
        Canvas {
            width: w,
            height: h,
        }
    }

    #[test]
    fn clear_premultiplies_background() {
        let mut s = Surface::new(canvas(2, 1));
        s.clear([255, 0, 0, 128]);
        assert_eq!(&s.data()[0..4], &[128, 0, 0, 128]);
    }

    #[test]
    fn fill_rect_clips_to_surface() {
        let mut s = Surface::new(canvas(4, 4));
        s.clear([0, 0, 0, 255]);
        s.fill_rect(-2, -2, 4, 4, [255, 255, 255, 255]);
        // Only the 2x2 intersection at the origin was touched.
        assert_eq!(&s.data()[0..4], &[255, 255, 255, 255]);
        let outside = ((2 * 4 + 2) * 4) as usize;
        assert_eq!(&s.data()[outside..outside + 4], &[0, 0, 0, 255]);
    }

    #[test]
    fn swap_exchanges_buffers_without_touching_content() {
        let mut pair = FramePair::new(canvas(2, 2));
        pair.back_mut().clear([10, 20, 30, 255]);
        let drawn = pair.back_mut().clone();

        pair.swap();
        assert_eq!(pair.front(), &drawn);

        pair.swap();
        assert_ne!(pair.front(), &drawn);
    }

    #[test]
    fn draw_never_targets_the_front_buffer() {
        let mut pair = FramePair::new(canvas(2, 2));
        pair.back_mut().clear([1, 1, 1, 255]);
        pair.swap();
        let front_before = pair.front().clone();

        pair.back_mut().clear([200, 200, 200, 255]);
        assert_eq!(pair.front(), &front_before);
    }

    #[test]
    fn snapshot_before_and_after_swap_yields_both_buffers() {
        let mut pair = FramePair::new(canvas(1, 1));
        pair.back_mut().clear([5, 6, 7, 255]);
        pair.swap();
        let png_a = pair.front().encode_png().unwrap();

        pair.back_mut().clear([90, 91, 92, 255]);
        pair.swap();
        let png_b = pair.front().encode_png().unwrap();

        assert_ne!(png_a, png_b);
    }

    #[test]
    fn blit_clips_and_composites() {
        let mut dst = Surface::new(canvas(4, 4));
        dst.clear([0, 0, 0, 255]);
        let mut src = Surface::new(canvas(2, 2));
        src.clear([255, 0, 0, 255]);

        dst.blit(&src, 3, 3);
        let corner = ((3u32 * 4 + 3) * 4) as usize;
        assert_eq!(&dst.data()[corner..corner + 4], &[255, 0, 0, 255]);
        // Off-surface portion silently clipped.
        let origin = 0usize;
        assert_eq!(&dst.data()[origin..origin + 4], &[0, 0, 0, 255]);
    }
}

use crate::{
    error::{EngineError, EngineResult},
    render::surface::Surface,
};

pub type PremulRgba8 = [u8; 4];

/// Convert a straight-alpha RGBA color to premultiplied form.
pub fn premultiply(c: [u8; 4]) -> PremulRgba8 {
    fn mul(c: u8, a: u8) -> u8 {
        let c = u16::from(c);
        let a = u16::from(a);
        (((c * a) + 127) / 255) as u8
    }
    [mul(c[0], c[3]), mul(c[1], c[3]), mul(c[2], c[3]), c[3]]
}

/// Source-over for premultiplied pixels, with an extra opacity factor
/// applied to the source.
pub fn over(dst: PremulRgba8, src: PremulRgba8, opacity: f32) -> PremulRgba8 {
    let opacity = opacity.clamp(0.0, 1.0);
    if opacity <= 0.0 || src[3] == 0 {
        return dst;
    }

    let op = ((opacity * 255.0).round() as i32).clamp(0, 255) as u16;
    let sa = mul_div255(u16::from(src[3]), op);
    if sa == 0 {
        return dst;
    }

    let inv = 255u16 - u16::from(sa);

    let mut out = [0u8; 4];
    out[3] = sa.saturating_add(mul_div255(u16::from(dst[3]), inv));
    for i in 0..3 {
        let sc = mul_div255(u16::from(src[i]), op);
        let dc = mul_div255(u16::from(dst[i]), inv);
        out[i] = sc.saturating_add(dc);
    }
    out
}

/// Composite `src` over `dst` in place at the given opacity. Both buffers
/// must be equal-length premultiplied RGBA8.
pub fn over_in_place(dst: &mut [u8], src: &[u8], opacity: f32) -> EngineResult<()> {
    if dst.len() != src.len() || !dst.len().is_multiple_of(4) {
        return Err(EngineError::render(
            "over_in_place expects equal-length rgba8 buffers",
        ));
    }
    for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
        let out = over([d[0], d[1], d[2], d[3]], [s[0], s[1], s[2], s[3]], opacity);
        d.copy_from_slice(&out);
    }
    Ok(())
}

/// Horizontal push: `current` translated left by `progress × width` while
/// `next` enters from the right, leading edge flush with the outgoing
/// trailing edge at every progress value. Writes the composed row set into
/// `dst`. All three surfaces must share dimensions.
pub fn push_into(
    dst: &mut Surface,
    current: &Surface,
    next: &Surface,
    progress: f32,
) -> EngineResult<()> {
    if dst.width() != current.width()
        || dst.height() != current.height()
        || dst.width() != next.width()
        || dst.height() != next.height()
    {
        return Err(EngineError::render(
            "push_into expects three equal-sized surfaces",
        ));
    }

    let width = dst.width() as usize;
    let height = dst.height() as usize;
    let progress = progress.clamp(0.0, 1.0);
    let offset = ((progress as f64) * (width as f64)).round() as usize;
    let offset = offset.min(width);
    let keep = width - offset;

    let row_bytes = width * 4;
    let dst_data = dst.data_mut();
    for row in 0..height {
        let base = row * row_bytes;
        let out_row = &mut dst_data[base..base + row_bytes];
        // Tail of the outgoing slide, then the head of the incoming one.
        out_row[..keep * 4]
            .copy_from_slice(&current.data()[base + offset * 4..base + row_bytes]);
        out_row[keep * 4..].copy_from_slice(&next.data()[base..base + offset * 4]);
    }
    Ok(())
}

fn mul_div255(x: u16, y: u16) -> u8 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Canvas;

    #[test]
    fn premultiply_scales_color_by_alpha() {
        assert_eq!(premultiply([255, 0, 0, 128]), [128, 0, 0, 128]);
        assert_eq!(premultiply([10, 20, 30, 255]), [10, 20, 30, 255]);
    }

    #[test]
    fn over_opacity_0_is_noop() {
        let dst = [1, 2, 3, 4];
        let src = [200, 200, 200, 200];
        assert_eq!(over(dst, src, 0.0), dst);
    }

    #[test]
    fn over_src_alpha_0_is_noop() {
        let dst = [10, 20, 30, 40];
        let src = [255, 255, 255, 0];
        assert_eq!(over(dst, src, 1.0), dst);
    }

    #[test]
    fn over_src_opaque_replaces_dst() {
        let dst = [0, 0, 0, 255];
        let src = [255, 0, 0, 255];
        assert_eq!(over(dst, src, 1.0), src);
    }

    #[test]
    fn over_in_place_rejects_mismatched_buffers() {
        let mut dst = vec![0u8; 8];
        let src = vec![0u8; 4];
        assert!(over_in_place(&mut dst, &src, 1.0).is_err());
    }

    fn solid(canvas: Canvas, color: [u8; 4]) -> Surface {
        let mut s = Surface::new(canvas);
        s.clear(color);
        s
    }

    #[test]
    fn push_endpoints_match_current_and_next() {
        let canvas = Canvas {
            width: 4,
            height: 2,
        };
        let current = solid(canvas, [255, 0, 0, 255]);
        let next = solid(canvas, [0, 0, 255, 255]);
        let mut dst = Surface::new(canvas);

        push_into(&mut dst, &current, &next, 0.0).unwrap();
        assert_eq!(dst.data(), current.data());

        push_into(&mut dst, &current, &next, 1.0).unwrap();
        assert_eq!(dst.data(), next.data());
    }

    #[test]
    fn push_midpoint_splits_each_row() {
        let canvas = Canvas {
            width: 4,
            height: 1,
        };
        let current = solid(canvas, [255, 0, 0, 255]);
        let next = solid(canvas, [0, 0, 255, 255]);
        let mut dst = Surface::new(canvas);

        push_into(&mut dst, &current, &next, 0.5).unwrap();
        // Two outgoing pixels then two incoming ones.
        assert_eq!(&dst.data()[0..4], &[255, 0, 0, 255]);
        assert_eq!(&dst.data()[4..8], &[255, 0, 0, 255]);
        assert_eq!(&dst.data()[8..12], &[0, 0, 255, 255]);
        assert_eq!(&dst.data()[12..16], &[0, 0, 255, 255]);
    }
}

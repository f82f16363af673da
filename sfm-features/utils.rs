//! Helpers shared by the FAST detector and the descriptor generators

/// Bresenham circle of radius 3 used by the FAST segment test, clockwise from 12 o'clock
pub const FAST_CIRCLE: [(i32, i32); 16] = [
    (0, -3), (1, -3), (2, -2), (3, -1),
    (3, 0), (3, 1), (2, 2), (1, 3),
    (0, 3), (-1, 3), (-2, 2), (-3, 1),
    (-3, 0), (-3, -1), (-2, -2), (-1, -3),
];

/// Arc length for FAST-9
pub const FAST_ARC: usize = 9;

/// True when the circular mask holds a run of at least `min_count` set bits.
///
/// Each rotate-and-AND step shortens every run by one; a run survives all
/// `min_count - 1` steps only if it was long enough.
pub fn has_consecutive_bits(mask: u16, min_count: usize) -> bool {
    if min_count == 0 || min_count > 16 {
        return false;
    }
    let mut acc = mask;
    for i in 1..min_count as u32 {
        acc &= mask.rotate_right(i);
        if acc == 0 {
            return false;
        }
    }
    acc != 0
}

/// Bilinear sample of a row-major f32 plane with edge clamping
pub fn bilinear(plane: &[f32], width: usize, height: usize, x: f32, y: f32) -> f32 {
    let max_x = (width - 1) as f32;
    let max_y = (height - 1) as f32;
    let x = x.clamp(0.0, max_x);
    let y = y.clamp(0.0, max_y);

    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let top = plane[y0 * width + x0] * (1.0 - fx) + plane[y0 * width + x1] * fx;
    let bottom = plane[y1 * width + x0] * (1.0 - fx) + plane[y1 * width + x1] * fx;
    top * (1.0 - fy) + bottom * fy
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Packs a 16-entry circle test into a bitmask, bit i set when `pixels[i]`
    fn circle_mask(pixels: &[bool; 16]) -> u16 {
        pixels
            .iter()
            .enumerate()
            .fold(0u16, |mask, (i, &p)| if p { mask | (1 << i) } else { mask })
    }

    fn has_consecutive_pixels(pixels: &[bool; 16], min_count: usize) -> bool {
        has_consecutive_bits(circle_mask(pixels), min_count)
    }

    fn run_fallback(pixels: &[bool; 16], min_count: usize) -> bool {
        let mut current = 0;
        for i in 0..32 {
            if pixels[i % 16] {
                current += 1;
                if current >= min_count {
                    return true;
                }
            } else {
                current = 0;
            }
        }
        false
    }

    #[test]
    fn test_consecutive_pixels_simple() {
        let mut pixels = [false; 16];
        for p in pixels.iter_mut().take(9) {
            *p = true;
        }
        assert!(has_consecutive_pixels(&pixels, 9));
        assert!(!has_consecutive_pixels(&pixels, 10));
    }

    #[test]
    fn test_consecutive_pixels_wrap_around() {
        let mut pixels = [false; 16];
        for i in (12..16).chain(0..5) {
            pixels[i] = true;
        }
        assert!(has_consecutive_pixels(&pixels, 9));
    }

    #[test]
    fn test_alternating_pixels() {
        let mut pixels = [false; 16];
        for i in (0..16).step_by(2) {
            pixels[i] = true;
        }
        assert!(has_consecutive_pixels(&pixels, 1));
        assert!(!has_consecutive_pixels(&pixels, 2));
    }

    #[test]
    fn test_bitmask_matches_linear_scan() {
        for mask in (0u32..=0xffff).step_by(97) {
            let mut pixels = [false; 16];
            for (i, p) in pixels.iter_mut().enumerate() {
                *p = mask & (1 << i) != 0;
            }
            for n in [1, 3, 9, 12, 16] {
                assert_eq!(
                    has_consecutive_pixels(&pixels, n),
                    run_fallback(&pixels, n),
                    "mask={:#06x} n={}",
                    mask,
                    n
                );
            }
        }
    }

    #[test]
    fn test_bilinear_interpolates_and_clamps() {
        let plane = vec![0.0, 10.0, 20.0, 30.0];
        assert_eq!(bilinear(&plane, 2, 2, 0.5, 0.0), 5.0);
        assert_eq!(bilinear(&plane, 2, 2, 0.5, 0.5), 15.0);
        assert_eq!(bilinear(&plane, 2, 2, -3.0, 5.0), 20.0);
    }
}

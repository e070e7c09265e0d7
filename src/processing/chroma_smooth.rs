//! Pass 5: chroma smoothing. Within a same-Bayer-color window, replace
//! each sample by the window median to suppress color noise without
//! touching luminance detail.

/// Same-color samples sit two rows/columns apart in a 2x2 Bayer
/// mosaic, so a "3x3 window of same-color samples" spans 5 actual
/// rows/columns; `window` here is the same-color grid size (2, 3, 5).
pub fn smooth_chroma(samples: &mut [u16], width: usize, height: usize, window: usize) {
    if window < 2 {
        return;
    }
    let radius = (window / 2) as i32;
    let original = samples.to_vec();

    for row in 0..height {
        for col in 0..width {
            let mut neighborhood = Vec::with_capacity(window * window);
            for dr in -radius..=radius {
                for dc in -radius..=radius {
                    let r = row as i32 + dr * 2;
                    let c = col as i32 + dc * 2;
                    if r >= 0 && c >= 0 && (r as usize) < height && (c as usize) < width {
                        neighborhood.push(original[r as usize * width + c as usize]);
                    }
                }
            }
            if neighborhood.is_empty() {
                continue;
            }
            neighborhood.sort_unstable();
            samples[row * width + col] = neighborhood[neighborhood.len() / 2];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_zero_or_one_is_a_no_op() {
        let mut samples = vec![10u16, 20, 30, 40];
        let before = samples.clone();
        smooth_chroma(&mut samples, 2, 2, 0);
        assert_eq!(samples, before);
    }

    #[test]
    fn removes_a_single_same_color_outlier() {
        let width = 10;
        let height = 10;
        let mut samples = vec![500u16; width * height];
        samples[4 * width + 4] = 30000;
        smooth_chroma(&mut samples, width, height, 3);
        assert!(samples[4 * width + 4] < 1000);
    }
}

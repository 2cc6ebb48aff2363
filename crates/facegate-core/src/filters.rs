//! Grayscale image statistics used by the liveness heuristics.

/// Reflect-101 border handling (`gfedcb|abcdefgh|gfedcba`).
fn reflect101(i: isize, n: usize) -> usize {
    if n == 1 {
        return 0;
    }
    let n = n as isize;
    let mut i = i;
    while i < 0 || i >= n {
        i = if i < 0 { -i } else { 2 * n - 2 - i };
    }
    i as usize
}

/// Variance of the 4-neighbour Laplacian over every pixel of the image.
///
/// A flat image has variance zero; printed or blurred surfaces score low.
pub fn laplacian_variance(gray: &[u8], width: usize, height: usize) -> f64 {
    if width == 0 || height == 0 || gray.len() < width * height {
        return 0.0;
    }
    let px = |x: isize, y: isize| -> f64 {
        gray[reflect101(y, height) * width + reflect101(x, width)] as f64
    };

    let mut values = Vec::with_capacity(width * height);
    for y in 0..height as isize {
        for x in 0..width as isize {
            let lap = px(x - 1, y) + px(x + 1, y) + px(x, y - 1) + px(x, y + 1) - 4.0 * px(x, y);
            values.push(lap);
        }
    }

    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n
}

/// Canny edge map with 3×3 Sobel gradients, L1 magnitude, non-maximum
/// suppression and hysteresis between `low` and `high`.
pub fn canny(gray: &[u8], width: usize, height: usize, low: f32, high: f32) -> Vec<bool> {
    let mut edges = vec![false; width * height];
    if width == 0 || height == 0 || gray.len() < width * height {
        return edges;
    }

    let px = |x: isize, y: isize| -> f32 {
        let cx = x.clamp(0, width as isize - 1) as usize;
        let cy = y.clamp(0, height as isize - 1) as usize;
        gray[cy * width + cx] as f32
    };

    let mut gx = vec![0.0f32; width * height];
    let mut gy = vec![0.0f32; width * height];
    let mut mag = vec![0.0f32; width * height];
    for y in 0..height as isize {
        for x in 0..width as isize {
            let dx = (px(x + 1, y - 1) + 2.0 * px(x + 1, y) + px(x + 1, y + 1))
                - (px(x - 1, y - 1) + 2.0 * px(x - 1, y) + px(x - 1, y + 1));
            let dy = (px(x - 1, y + 1) + 2.0 * px(x, y + 1) + px(x + 1, y + 1))
                - (px(x - 1, y - 1) + 2.0 * px(x, y - 1) + px(x + 1, y - 1));
            let i = y as usize * width + x as usize;
            gx[i] = dx;
            gy[i] = dy;
            mag[i] = dx.abs() + dy.abs();
        }
    }

    let mag_at = |x: isize, y: isize| -> f32 {
        if x < 0 || y < 0 || x >= width as isize || y >= height as isize {
            0.0
        } else {
            mag[y as usize * width + x as usize]
        }
    };

    let tan_22_5 = std::f32::consts::FRAC_PI_8.tan();
    let mut strong = Vec::new();
    let mut candidate = vec![false; width * height];

    for y in 0..height as isize {
        for x in 0..width as isize {
            let i = y as usize * width + x as usize;
            let m = mag[i];
            if m <= low {
                continue;
            }
            let (ax, ay) = (gx[i].abs(), gy[i].abs());
            let tg22 = ax * tan_22_5;
            let tg67 = tg22 + 2.0 * ax;

            let is_max = if ay < tg22 {
                m > mag_at(x - 1, y) && m >= mag_at(x + 1, y)
            } else if ay > tg67 {
                m > mag_at(x, y - 1) && m >= mag_at(x, y + 1)
            } else {
                let s = if (gx[i] < 0.0) != (gy[i] < 0.0) { -1 } else { 1 };
                m > mag_at(x - s, y - 1) && m > mag_at(x + s, y + 1)
            };
            if !is_max {
                continue;
            }

            candidate[i] = true;
            if m > high {
                edges[i] = true;
                strong.push((x, y));
            }
        }
    }

    // Hysteresis: grow strong edges through 8-connected candidates.
    while let Some((x, y)) = strong.pop() {
        for ny in y - 1..=y + 1 {
            for nx in x - 1..=x + 1 {
                if nx < 0 || ny < 0 || nx >= width as isize || ny >= height as isize {
                    continue;
                }
                let j = ny as usize * width + nx as usize;
                if candidate[j] && !edges[j] {
                    edges[j] = true;
                    strong.push((nx, ny));
                }
            }
        }
    }

    edges
}

/// Fraction of pixels Canny marks as edges.
pub fn edge_density(gray: &[u8], width: usize, height: usize, low: f32, high: f32) -> f64 {
    if width == 0 || height == 0 {
        return 0.0;
    }
    let count = canny(gray, width, height, low, high)
        .iter()
        .filter(|&&e| e)
        .count();
    count as f64 / (width * height) as f64
}

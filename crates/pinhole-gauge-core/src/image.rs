#[derive(Clone, Copy, Debug)]
pub struct GrayImageView<'a> {
    pub width: usize,
    pub height: usize,
    pub data: &'a [u8], // row-major, len = w*h
}

#[derive(Clone, Debug, PartialEq)]
pub struct GrayImage {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl GrayImage {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0; width * height],
        }
    }

    /// Build an image by evaluating `f(x, y)` at every pixel.
    pub fn from_fn(width: usize, height: usize, mut f: impl FnMut(usize, usize) -> u8) -> Self {
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            data,
        }
    }

    pub fn view(&self) -> GrayImageView<'_> {
        GrayImageView {
            width: self.width,
            height: self.height,
            data: &self.data,
        }
    }
}

impl GrayImageView<'_> {
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.width + x]
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0 || self.data.len() < self.width * self.height
    }
}

#[inline]
fn get_gray(src: &GrayImageView<'_>, x: i32, y: i32) -> u8 {
    // Clamp to edge so that gradients at the border stay finite.
    let x = x.clamp(0, src.width as i32 - 1) as usize;
    let y = y.clamp(0, src.height as i32 - 1) as usize;
    src.data[y * src.width + x]
}

#[inline]
pub fn sample_bilinear(src: &GrayImageView<'_>, x: f32, y: f32) -> f32 {
    let x0 = x.floor() as i32;
    let y0 = y.floor() as i32;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p00 = get_gray(src, x0, y0) as f32;
    let p10 = get_gray(src, x0 + 1, y0) as f32;
    let p01 = get_gray(src, x0, y0 + 1) as f32;
    let p11 = get_gray(src, x0 + 1, y0 + 1) as f32;

    let a = p00 + fx * (p10 - p00);
    let b = p01 + fx * (p11 - p01);
    a + fy * (b - a)
}

#[inline]
pub fn sample_bilinear_u8(src: &GrayImageView<'_>, x: f32, y: f32) -> u8 {
    sample_bilinear(src, x, y).round().clamp(0.0, 255.0) as u8
}

/// Global histogram equalization.
///
/// The lookup table maps the cumulative histogram onto `[0, 255]` starting at
/// the first occupied bin, so a constant image stays constant.
pub fn equalize_hist(src: &GrayImageView<'_>) -> GrayImage {
    let n = src.width * src.height;
    let mut hist = [0usize; 256];
    for &v in &src.data[..n] {
        hist[v as usize] += 1;
    }

    let cdf_min = hist.iter().copied().find(|&c| c > 0).unwrap_or(0);
    let mut lut = [0u8; 256];
    if n > cdf_min {
        let scale = 255.0 / (n - cdf_min) as f64;
        let mut acc = 0usize;
        for (v, &count) in hist.iter().enumerate() {
            acc += count;
            lut[v] = ((acc.saturating_sub(cdf_min)) as f64 * scale).round() as u8;
        }
    } else {
        for (v, slot) in lut.iter_mut().enumerate() {
            *slot = v as u8;
        }
    }

    GrayImage {
        width: src.width,
        height: src.height,
        data: src.data[..n].iter().map(|&v| lut[v as usize]).collect(),
    }
}

fn gaussian_kernel(sigma: f32) -> Vec<f32> {
    let radius = (3.0 * sigma).ceil().max(1.0) as i32;
    let two_s2 = 2.0 * sigma * sigma;
    let mut k: Vec<f32> = (-radius..=radius)
        .map(|i| (-((i * i) as f32) / two_s2).exp())
        .collect();
    let sum: f32 = k.iter().sum();
    for v in &mut k {
        *v /= sum;
    }
    k
}

/// Separable Gaussian blur with edge clamping. `sigma <= 0` copies the input.
pub fn gaussian_blur(src: &GrayImageView<'_>, sigma: f32) -> GrayImage {
    let (w, h) = (src.width, src.height);
    if sigma <= 0.0 || w == 0 || h == 0 {
        return GrayImage {
            width: w,
            height: h,
            data: src.data[..w * h].to_vec(),
        };
    }

    let kernel = gaussian_kernel(sigma);
    let r = (kernel.len() / 2) as i32;

    let mut tmp = vec![0f32; w * h];
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0;
            for (k, &kv) in kernel.iter().enumerate() {
                acc += kv * get_gray(src, x as i32 + k as i32 - r, y as i32) as f32;
            }
            tmp[y * w + x] = acc;
        }
    }

    let mut out = vec![0u8; w * h];
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0;
            for (k, &kv) in kernel.iter().enumerate() {
                let yy = (y as i32 + k as i32 - r).clamp(0, h as i32 - 1) as usize;
                acc += kv * tmp[yy * w + x];
            }
            out[y * w + x] = acc.round().clamp(0.0, 255.0) as u8;
        }
    }

    GrayImage {
        width: w,
        height: h,
        data: out,
    }
}

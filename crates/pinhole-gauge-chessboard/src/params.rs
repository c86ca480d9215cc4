use serde::{Deserialize, Serialize};

/// Thresholds handed to the `chess-corners` detector.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ResponseParams {
    /// Peaks must exceed `threshold_rel * max(R)` (and be positive).
    pub threshold_rel: f32,
    /// Half-size of the non-maximum suppression window, in pixels.
    pub nms_radius: u32,
}

impl Default for ResponseParams {
    fn default() -> Self {
        Self {
            threshold_rel: 0.2,
            nms_radius: 2,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GridGraphParams {
    pub min_spacing_pix: f32,
    pub max_spacing_pix: f32,
    pub k_neighbors: usize,
    pub orientation_tolerance_deg: f32,
}

impl Default for GridGraphParams {
    fn default() -> Self {
        Self {
            min_spacing_pix: 8.0,
            max_spacing_pix: 400.0,
            k_neighbors: 8,
            orientation_tolerance_deg: 22.5,
        }
    }
}

/// Gradient-orthogonality refinement used by the classical strategy.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SubPixParams {
    /// Search window is `(2 * half_window + 1)^2` pixels.
    pub half_window: usize,
    pub max_iters: usize,
    /// Stop once an update moves the corner by less than this (pixels).
    pub eps: f32,
}

impl Default for SubPixParams {
    fn default() -> Self {
        Self {
            half_window: 5,
            max_iters: 30,
            eps: 1e-3,
        }
    }
}

/// Quadratic saddle fit used by the normalized strategy.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SaddleParams {
    pub half_window: usize,
    pub max_iters: usize,
    pub eps: f32,
}

impl Default for SaddleParams {
    fn default() -> Self {
        Self {
            half_window: 3,
            max_iters: 10,
            eps: 1e-3,
        }
    }
}

/// Preprocessing applied by the normalized strategy.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct NormalizeParams {
    pub equalize: bool,
    /// Gaussian sigma in pixels; `0` disables smoothing.
    pub blur_sigma: f32,
}

impl Default for NormalizeParams {
    fn default() -> Self {
        Self {
            equalize: true,
            blur_sigma: 1.5,
        }
    }
}

/// Parameters shared by both detector strategies.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DetectorParams {
    pub response: ResponseParams,
    pub graph: GridGraphParams,
    pub subpix: SubPixParams,
    pub saddle: SaddleParams,
    pub normalize: NormalizeParams,
}

impl DetectorParams {
    /// Largest distance a refined corner may drift from its response peak.
    pub fn max_refine_shift(&self) -> f32 {
        0.5 * self.graph.min_spacing_pix
    }
}

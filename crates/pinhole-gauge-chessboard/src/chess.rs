//! Raw X-corner candidates from the `chess-corners` ChESS detector.

use crate::params::ResponseParams;
use chess_corners::{find_chess_corners_image, ChessConfig, CornerDescriptor};
use pinhole_gauge_core::{Corner, GrayImageView};

/// Single-scale `chess-corners` settings for `params`.
pub fn chess_config(params: &ResponseParams) -> ChessConfig {
    let mut cfg = ChessConfig::single_scale();
    cfg.params.threshold_rel = params.threshold_rel;
    cfg.params.nms_radius = params.nms_radius;
    cfg
}

fn to_gray_image(view: &GrayImageView<'_>) -> Option<::image::GrayImage> {
    let len = view.width.checked_mul(view.height)?;
    let data = view.data.get(..len)?.to_vec();
    ::image::GrayImage::from_raw(view.width as u32, view.height as u32, data)
}

/// Only positive responses are X-junctions.
fn adapt_chess_corner(c: &CornerDescriptor) -> Option<Corner> {
    let strength = c.response as f32;
    (strength > 0.0).then(|| Corner::new(c.x as f32, c.y as f32, c.orientation as f32, strength))
}

/// ChESS corner candidates in `image`, strongest first.
pub fn detect_candidates(image: &GrayImageView<'_>, params: &ResponseParams) -> Vec<Corner> {
    let Some(img) = to_gray_image(image) else {
        return Vec::new();
    };
    let mut corners: Vec<Corner> = find_chess_corners_image(&img, &chess_config(params))
        .iter()
        .filter_map(adapt_chess_corner)
        .collect();
    corners.sort_by(|a, b| b.strength.total_cmp(&a.strength));
    corners
}

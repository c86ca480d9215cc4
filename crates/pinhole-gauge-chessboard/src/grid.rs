//! Turn a lattice component into a canonical row-major corner order.

use nalgebra::Point2;
use pinhole_gauge_core::Corner;

/// Rigid relabelling of a `w x h` lattice onto itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Relabel {
    Identity,
    Rot90,
    Rot180,
    Rot270,
}

impl Relabel {
    fn apply(self, i: usize, j: usize, w: usize, h: usize) -> (usize, usize) {
        match self {
            Self::Identity => (i, j),
            Self::Rot180 => (w - 1 - i, h - 1 - j),
            // Only used for square grids, where w == h.
            Self::Rot90 => (w - 1 - j, i),
            Self::Rot270 => (j, w - 1 - i),
        }
    }
}

/// Order one component's corners row-major over a `width x height` grid.
///
/// `coords` holds `(corner index, i, j)` from the breadth-first walk. The
/// component must cover exactly the grid, in either orientation; a lattice
/// found as `height x width` is rotated by 90°, never mirrored. Among the
/// relabellings that keep the grid shape, the one whose `(0, 0)` corner has
/// the smallest `x + y` in the image (then smallest `y`) wins.
pub fn order_component(
    coords: &[(usize, i32, i32)],
    corners: &[Corner],
    width: usize,
    height: usize,
) -> Option<Vec<usize>> {
    if coords.len() != width * height {
        return None;
    }

    let min_i = coords.iter().map(|c| c.1).min()?;
    let min_j = coords.iter().map(|c| c.2).min()?;
    let mut cells: Vec<(usize, usize, usize)> = coords
        .iter()
        .map(|&(n, i, j)| (n, (i - min_i) as usize, (j - min_j) as usize))
        .collect();
    let nw = cells.iter().map(|c| c.1).max()? + 1;
    let nh = cells.iter().map(|c| c.2).max()? + 1;

    if (nw, nh) != (width, height) {
        if (nw, nh) != (height, width) {
            return None;
        }
        for cell in &mut cells {
            let (i, j) = (cell.1, cell.2);
            cell.1 = nh - 1 - j;
            cell.2 = i;
        }
    }

    let mut options = vec![Relabel::Identity, Relabel::Rot180];
    if width == height {
        options.extend([Relabel::Rot90, Relabel::Rot270]);
    }

    let origin_key = |relabel: Relabel| -> Option<(f32, f32)> {
        let &(n, _, _) = cells
            .iter()
            .find(|&&(_, i, j)| relabel.apply(i, j, width, height) == (0, 0))?;
        let p: Point2<f32> = corners[n].position;
        Some((p.x + p.y, p.y))
    };

    let mut best: Option<(Relabel, (f32, f32))> = None;
    for relabel in options {
        let key = origin_key(relabel)?;
        let better = match best {
            None => true,
            Some((_, current)) => key.0 < current.0 || (key.0 == current.0 && key.1 < current.1),
        };
        if better {
            best = Some((relabel, key));
        }
    }
    let (relabel, _) = best?;

    let mut order = vec![usize::MAX; width * height];
    for &(n, i, j) in &cells {
        let (ci, cj) = relabel.apply(i, j, width, height);
        let slot = order.get_mut(cj * width + ci)?;
        if *slot != usize::MAX {
            return None;
        }
        *slot = n;
    }
    Some(order)
}

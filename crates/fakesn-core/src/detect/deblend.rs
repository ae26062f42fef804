//! Multi-threshold deblending of one segment into overlapping sources.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use ndarray::Array2;

use super::segmentation::{label_regions, Segment, SegmentationMap};

#[derive(Clone, Copy, Debug)]
pub struct DeblendParams {
    pub npixels: usize,
    pub nlevels: usize,
    pub contrast: f64,
}

/// Split a segment into children.
///
/// Thresholds are spaced exponentially between the segment minimum and
/// maximum of `smoothed` (linearly when the minimum is not positive). At
/// each level a region splits when at least two of its connected pieces
/// above the level carry `contrast` times the segment's total flux. The
/// surviving pieces seed a watershed that hands every segment pixel to the
/// brightest adjacent seed. Returns one pixel list per child; a single
/// entry means no split.
pub fn deblend_segment(
    smoothed: &Array2<f64>,
    segmap: &SegmentationMap,
    segment: &Segment,
    params: &DeblendParams,
) -> Vec<Vec<(usize, usize)>> {
    let pixels = segmap.pixels(segment);
    if pixels.len() < 2 * params.npixels.max(1) || params.nlevels == 0 {
        return vec![pixels];
    }

    let values: Vec<f64> = pixels.iter().map(|&p| smoothed[p]).collect();
    let lo = values.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let total: f64 = values.iter().sum();
    if hi <= lo || total <= 0.0 {
        return vec![pixels];
    }

    let levels: Vec<f64> = (1..=params.nlevels)
        .map(|i| {
            let t = i as f64 / (params.nlevels + 1) as f64;
            if lo > 0.0 {
                lo * (hi / lo).powf(t)
            } else {
                lo + (hi - lo) * t
            }
        })
        .collect();

    let mut regions: Vec<Vec<(usize, usize)>> = vec![pixels.clone()];
    for &level in &levels {
        let mut next = Vec::with_capacity(regions.len());
        for region in regions {
            let pieces = pieces_above(smoothed, &region, level, params.npixels);
            let significant: Vec<Vec<(usize, usize)>> = pieces
                .into_iter()
                .filter(|p| p.iter().map(|&px| smoothed[px]).sum::<f64>() >= params.contrast * total)
                .collect();
            if significant.len() >= 2 {
                next.extend(significant);
            } else {
                next.push(region);
            }
        }
        regions = next;
    }

    if regions.len() < 2 {
        return vec![pixels];
    }
    watershed(smoothed, &pixels, &regions)
}

/// Connected pieces of `region` strictly above `level` with at least
/// `npixels` pixels.
fn pieces_above(
    data: &Array2<f64>,
    region: &[(usize, usize)],
    level: f64,
    npixels: usize,
) -> Vec<Vec<(usize, usize)>> {
    let (r0, c0, mask) = local_mask(region, |p| data[p] > level);
    let map = label_regions(&mask, npixels);
    map.segments
        .iter()
        .map(|s| {
            map.pixels(s)
                .into_iter()
                .map(|(r, c)| (r + r0, c + c0))
                .collect()
        })
        .collect()
}

/// Boolean mask over the bounding box of `pixels`, with its origin.
fn local_mask<F>(pixels: &[(usize, usize)], keep: F) -> (usize, usize, Array2<bool>)
where
    F: Fn((usize, usize)) -> bool,
{
    let r0 = pixels.iter().map(|p| p.0).min().unwrap_or(0);
    let r1 = pixels.iter().map(|p| p.0).max().unwrap_or(0);
    let c0 = pixels.iter().map(|p| p.1).min().unwrap_or(0);
    let c1 = pixels.iter().map(|p| p.1).max().unwrap_or(0);
    let mut mask = Array2::from_elem((r1 - r0 + 1, c1 - c0 + 1), false);
    for &p in pixels {
        if keep(p) {
            mask[[p.0 - r0, p.1 - c0]] = true;
        }
    }
    (r0, c0, mask)
}

#[derive(PartialEq)]
struct Candidate {
    value: f64,
    pixel: (usize, usize),
    owner: usize,
}

impl Eq for Candidate {}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.value
            .total_cmp(&other.value)
            .then_with(|| other.pixel.cmp(&self.pixel))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Priority flood from `seeds` over `pixels`, brightest first.
fn watershed(
    data: &Array2<f64>,
    pixels: &[(usize, usize)],
    seeds: &[Vec<(usize, usize)>],
) -> Vec<Vec<(usize, usize)>> {
    let (r0, c0, inside) = local_mask(pixels, |_| true);
    let (h, w) = inside.dim();
    let mut owner: Array2<Option<usize>> = Array2::from_elem((h, w), None);
    let mut heap = BinaryHeap::new();

    for (k, seed) in seeds.iter().enumerate() {
        for &(r, c) in seed {
            owner[[r - r0, c - c0]] = Some(k);
            heap.push(Candidate {
                value: data[[r, c]],
                pixel: (r - r0, c - c0),
                owner: k,
            });
        }
    }

    while let Some(Candidate { pixel: (r, c), owner: k, .. }) = heap.pop() {
        for dr in -1i64..=1 {
            for dc in -1i64..=1 {
                let (nr, nc) = (r as i64 + dr, c as i64 + dc);
                if nr < 0 || nc < 0 || nr >= h as i64 || nc >= w as i64 {
                    continue;
                }
                let (nr, nc) = (nr as usize, nc as usize);
                if !inside[[nr, nc]] || owner[[nr, nc]].is_some() {
                    continue;
                }
                owner[[nr, nc]] = Some(k);
                heap.push(Candidate {
                    value: data[[nr + r0, nc + c0]],
                    pixel: (nr, nc),
                    owner: k,
                });
            }
        }
    }

    let mut children = vec![Vec::new(); seeds.len()];
    for ((r, c), o) in owner.indexed_iter() {
        if let Some(k) = o {
            children[*k].push((r + r0, c + c0));
        }
    }
    children.retain(|c| !c.is_empty());
    children
}

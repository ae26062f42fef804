use std::collections::HashMap;

use ndarray::Array2;

/// One connected region of a segmentation map.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Segment {
    /// Label in the segmentation map (1-based).
    pub label: u32,
    pub area: usize,
    /// Inclusive bounds: (min_row, max_row, min_col, max_col).
    pub bbox: (usize, usize, usize, usize),
}

/// Label image plus its regions. Label 0 is background.
#[derive(Clone, Debug)]
pub struct SegmentationMap {
    pub labels: Array2<u32>,
    pub segments: Vec<Segment>,
}

impl SegmentationMap {
    /// Pixel coordinates (row, col) belonging to `label`, scanning only its
    /// bounding box.
    pub fn pixels(&self, segment: &Segment) -> Vec<(usize, usize)> {
        let (r0, r1, c0, c1) = segment.bbox;
        let mut out = Vec::with_capacity(segment.area);
        for r in r0..=r1 {
            for c in c0..=c1 {
                if self.labels[[r, c]] == segment.label {
                    out.push((r, c));
                }
            }
        }
        out
    }
}

/// Two-pass union-find labelling with 8-connectivity. Regions smaller than
/// `min_area` are dropped from the map. Labels are renumbered 1..=n in
/// raster order of each region's first pixel.
pub fn label_regions(mask: &Array2<bool>, min_area: usize) -> SegmentationMap {
    let (h, w) = mask.dim();
    let mut labels = Array2::<u32>::zeros((h, w));
    if h == 0 || w == 0 {
        return SegmentationMap {
            labels,
            segments: Vec::new(),
        };
    }

    let mut next_label: u32 = 1;
    // Index 0 unused; provisional labels start at 1.
    let mut parent: Vec<u32> = vec![0; 2];

    for row in 0..h {
        for col in 0..w {
            if !mask[[row, col]] {
                continue;
            }

            // Already-visited neighbours: W, NW, N, NE.
            let mut neighbours = [0u32; 4];
            if col > 0 {
                neighbours[0] = labels[[row, col - 1]];
            }
            if row > 0 {
                if col > 0 {
                    neighbours[1] = labels[[row - 1, col - 1]];
                }
                neighbours[2] = labels[[row - 1, col]];
                if col + 1 < w {
                    neighbours[3] = labels[[row - 1, col + 1]];
                }
            }

            match neighbours.iter().copied().filter(|&l| l > 0).min() {
                None => {
                    if next_label as usize >= parent.len() {
                        parent.resize(parent.len() * 2, 0);
                    }
                    parent[next_label as usize] = next_label;
                    labels[[row, col]] = next_label;
                    next_label += 1;
                }
                Some(smallest) => {
                    labels[[row, col]] = smallest;
                    for &l in neighbours.iter().filter(|&&l| l > 0 && l != smallest) {
                        union(&mut parent, smallest, l);
                    }
                }
            }
        }
    }

    for i in 1..next_label as usize {
        parent[i] = find(&parent, i as u32);
    }

    let mut stats: HashMap<u32, Segment> = HashMap::new();
    let mut order: Vec<u32> = Vec::new();
    for row in 0..h {
        for col in 0..w {
            let lbl = labels[[row, col]];
            if lbl == 0 {
                continue;
            }
            let root = parent[lbl as usize];
            labels[[row, col]] = root;
            let entry = stats.entry(root).or_insert_with(|| {
                order.push(root);
                Segment {
                    label: root,
                    area: 0,
                    bbox: (row, row, col, col),
                }
            });
            entry.area += 1;
            entry.bbox.0 = entry.bbox.0.min(row);
            entry.bbox.1 = entry.bbox.1.max(row);
            entry.bbox.2 = entry.bbox.2.min(col);
            entry.bbox.3 = entry.bbox.3.max(col);
        }
    }

    let mut relabel: HashMap<u32, u32> = HashMap::new();
    let mut segments = Vec::new();
    for root in order {
        let Some(mut seg) = stats.remove(&root) else {
            continue;
        };
        if seg.area < min_area {
            continue;
        }
        let new_label = segments.len() as u32 + 1;
        relabel.insert(root, new_label);
        seg.label = new_label;
        segments.push(seg);
    }
    labels.mapv_inplace(|l| if l == 0 { 0 } else { relabel.get(&l).copied().unwrap_or(0) });

    SegmentationMap { labels, segments }
}

fn find(parent: &[u32], mut x: u32) -> u32 {
    while parent[x as usize] != x {
        x = parent[x as usize];
    }
    x
}

fn union(parent: &mut [u32], a: u32, b: u32) {
    let ra = find(parent, a);
    let rb = find(parent, b);
    if ra != rb {
        let (small, big) = if ra < rb { (ra, rb) } else { (rb, ra) };
        parent[big as usize] = small;
    }
}

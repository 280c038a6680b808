use ndarray::Array2;

/// One connected region of above-threshold pixels.
#[derive(Clone, Debug)]
pub struct Segment {
    /// Label in the label map (1-based).
    pub label: u32,
    /// Number of pixels in the segment.
    pub area: usize,
    /// Bounding box: (min_row, max_row, min_col, max_col).
    pub bbox: (usize, usize, usize, usize),
}

/// Label the 8-connected regions of a binary mask.
///
/// Two-pass union-find labelling. Returns the label map (0 = background,
/// labels compacted to 1..=n in raster order of first appearance) and the
/// per-segment statistics indexed by `label - 1`.
pub fn label_segments(mask: &Array2<bool>) -> (Array2<u32>, Vec<Segment>) {
    let (h, w) = mask.dim();
    let mut labels = Array2::<u32>::zeros((h, w));
    // parent[0] is unused; provisional labels start at 1.
    let mut parent: Vec<u32> = vec![0];

    for row in 0..h {
        for col in 0..w {
            if !mask[[row, col]] {
                continue;
            }
            let mut neighbors = [0u32; 4];
            if col > 0 {
                neighbors[0] = labels[[row, col - 1]];
            }
            if row > 0 {
                neighbors[1] = labels[[row - 1, col]];
                if col > 0 {
                    neighbors[2] = labels[[row - 1, col - 1]];
                }
                if col + 1 < w {
                    neighbors[3] = labels[[row - 1, col + 1]];
                }
            }

            let smallest = neighbors.iter().copied().filter(|&l| l > 0).min();
            match smallest {
                None => {
                    let label = parent.len() as u32;
                    parent.push(label);
                    labels[[row, col]] = label;
                }
                Some(min) => {
                    labels[[row, col]] = min;
                    for &n in neighbors.iter().filter(|&&l| l > 0 && l != min) {
                        union(&mut parent, min, n);
                    }
                }
            }
        }
    }

    // Resolve roots and compact them to consecutive labels.
    let mut compact = vec![0u32; parent.len()];
    let mut segments: Vec<Segment> = Vec::new();
    for row in 0..h {
        for col in 0..w {
            let provisional = labels[[row, col]];
            if provisional == 0 {
                continue;
            }
            let root = find(&parent, provisional) as usize;
            if compact[root] == 0 {
                segments.push(Segment {
                    label: segments.len() as u32 + 1,
                    area: 0,
                    bbox: (row, row, col, col),
                });
                compact[root] = segments.len() as u32;
            }
            let label = compact[root];
            labels[[row, col]] = label;

            let seg = &mut segments[label as usize - 1];
            seg.area += 1;
            seg.bbox.0 = seg.bbox.0.min(row);
            seg.bbox.1 = seg.bbox.1.max(row);
            seg.bbox.2 = seg.bbox.2.min(col);
            seg.bbox.3 = seg.bbox.3.max(col);
        }
    }

    (labels, segments)
}

/// Grow a mask by a disk of the given radius (pixels).
pub fn dilate_disk(mask: &Array2<bool>, radius: usize) -> Array2<bool> {
    if radius == 0 {
        return mask.clone();
    }
    let (h, w) = mask.dim();
    let r = radius as isize;
    let r2 = r * r;
    let offsets: Vec<(isize, isize)> = (-r..=r)
        .flat_map(|dy| (-r..=r).map(move |dx| (dy, dx)))
        .filter(|(dy, dx)| dy * dy + dx * dx <= r2)
        .collect();

    let mut out = Array2::from_elem((h, w), false);
    for ((row, col), _) in mask.indexed_iter().filter(|(_, &m)| m) {
        for &(dy, dx) in &offsets {
            let rr = row as isize + dy;
            let cc = col as isize + dx;
            if rr >= 0 && cc >= 0 && (rr as usize) < h && (cc as usize) < w {
                out[[rr as usize, cc as usize]] = true;
            }
        }
    }
    out
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

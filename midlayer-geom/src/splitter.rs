//! Length-bounded linestring chunking (4.G).
//!
//! Grounded on `examples/original_source/geometry-builder.cpp`'s
//! `get_wkt_split`: walk the chain accumulating segment length, and each
//! time the running total would cross an integer multiple of the split
//! length, insert an exact interpolated vertex and start a new chunk
//! there.

use geo::{Coord, LineString};

/// Split `coords` into chunks no longer than `max_len`.
///
/// Chains of fewer than 2 points produce no output (there is no segment
/// to measure). A non-positive `max_len` is a no-op: the whole chain is
/// returned as a single chunk, matching "for closed input with `L=0`,
/// the splitter is a no-op".
#[must_use]
#[expect(
    clippy::float_arithmetic,
    reason = "exact fractional interpolation along a segment is inherently float arithmetic"
)]
pub fn split(coords: &[Coord<f64>], max_len: f64) -> Vec<LineString<f64>> {
    if coords.len() < 2 {
        return Vec::new();
    }
    if max_len <= 0.0 {
        return vec![LineString::new(coords.to_vec())];
    }

    let mut chunks = Vec::new();
    let mut segment: Vec<Coord<f64>> = Vec::new();
    let Some(&first) = coords.first() else {
        return Vec::new();
    };
    segment.push(first);
    let mut distance = 0.0;

    for window in coords.windows(2) {
        let &[prev_pt, this_pt] = window else {
            continue;
        };
        let delta = euclidean_distance(prev_pt, this_pt);

        if distance + delta > max_len {
            #[expect(
                clippy::cast_sign_loss,
                reason = "(distance + delta) / max_len is always non-negative here"
            )]
            #[expect(
                clippy::cast_possible_truncation,
                reason = "floor() already produced an integral value before this cast"
            )]
            let splits = ((distance + delta) / max_len).floor() as usize;
            for k in 0..splits {
                #[expect(
                    clippy::cast_precision_loss,
                    reason = "k indexes a small, bounded number of sub-splits of one segment"
                )]
                let frac = ((k as f64 + 1.0) * max_len - distance) / delta;
                let interpolated = Coord {
                    x: frac.mul_add(this_pt.x - prev_pt.x, prev_pt.x),
                    y: frac.mul_add(this_pt.y - prev_pt.y, prev_pt.y),
                };
                segment.push(interpolated);
                chunks.push(LineString::new(std::mem::take(&mut segment)));
                segment.push(interpolated);
            }
            distance = segment
                .first()
                .map(|&start| euclidean_distance(start, this_pt))
                .unwrap_or(0.0);
        } else {
            distance += delta;
        }

        segment.push(this_pt);
    }

    if segment.len() >= 2 {
        chunks.push(LineString::new(segment));
    }

    chunks
}

#[expect(
    clippy::float_arithmetic,
    reason = "planar distance between two resolved coordinates requires arithmetic"
)]
fn euclidean_distance(a: Coord<f64>, b: Coord<f64>) -> f64 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    (dx * dx + dy * dy).sqrt()
}

#[cfg(test)]
mod tests {
    use super::split;
    use geo::Coord;
    use rstest::rstest;

    fn straight_line(len: f64) -> Vec<Coord<f64>> {
        vec![Coord { x: 0.0, y: 0.0 }, Coord { x: len, y: 0.0 }]
    }

    #[rstest]
    fn a_line_shorter_than_the_limit_is_not_split() {
        let chunks = split(&straight_line(5.0), 10.0);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].0.len(), 2);
    }

    #[rstest]
    fn a_line_exactly_three_times_the_limit_splits_into_three_chunks() {
        let chunks = split(&straight_line(300.0), 100.0);
        assert_eq!(chunks.len(), 3);
        for chunk in &chunks {
            let start = chunk.0.first().expect("chunk has a start");
            let end = chunk.0.last().expect("chunk has an end");
            assert!((end.x - start.x - 100.0).abs() < 1e-9);
        }
    }

    #[rstest]
    fn the_final_chunk_keeps_its_short_remainder() {
        let chunks = split(&straight_line(250.0), 100.0);
        assert_eq!(chunks.len(), 3);
        let last = chunks.last().expect("three chunks were produced");
        let start = last.0.first().expect("chunk has a start");
        let end = last.0.last().expect("chunk has an end");
        assert!((end.x - start.x - 50.0).abs() < 1e-9);
    }

    #[rstest]
    fn concatenating_the_chunks_reproduces_the_input() {
        let chunks = split(&straight_line(250.0), 100.0);
        for pair in chunks.windows(2) {
            let &[ref a, ref b] = pair else {
                continue;
            };
            assert_eq!(a.0.last(), b.0.first());
        }
    }

    #[rstest]
    fn a_non_positive_limit_is_a_no_op() {
        let coords = straight_line(42.0);
        let chunks = split(&coords, 0.0);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].0, coords);
    }

    #[rstest]
    fn a_degenerate_chain_produces_no_chunks() {
        let coords = vec![Coord { x: 0.0, y: 0.0 }];
        assert!(split(&coords, 10.0).is_empty());
    }
}

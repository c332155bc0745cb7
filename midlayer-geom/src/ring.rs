//! Closed-chain rings: construction, signed area, and the bounding
//! rectangle used by the assembler's prepared containment index.
//!
//! Grounded on `examples/original_source/geometry-builder.cpp`'s
//! `polygondata` (a ring paired with its precomputed area) and
//! `polygondata_comparearea` (area-descending ordering).

use geo::{Area, BoundingRect, Coord, LineString, Polygon, Rect};

/// A closed linear ring with its unsigned area precomputed.
///
/// Construction enforces the two invariants step 3 of the assembler
/// relies on: at least 4 points (3 distinct vertices plus the closing
/// repeat), and a nonzero area. Degenerate chains are filtered out by
/// [`Ring::try_new`] returning `None` rather than by a caller-visible
/// error, matching "Ways with < 2 resolved nodes are skipped" and
/// "discard rings of area 0" as ordinary filtering, not failure.
#[derive(Debug, Clone)]
pub struct Ring {
    line_string: LineString<f64>,
    area: f64,
    bounding_rect: Rect<f64>,
}

impl Ring {
    /// Build a ring from a closed coordinate chain, or return `None` if
    /// it has fewer than 4 points, is not closed, or encloses zero area.
    #[must_use]
    pub fn try_new(coords: Vec<Coord<f64>>) -> Option<Self> {
        if coords.len() < 4 {
            return None;
        }
        let first = coords.first().copied()?;
        let last = coords.last().copied()?;
        if first != last {
            return None;
        }

        let line_string = LineString::new(coords);
        let area = Polygon::new(line_string.clone(), Vec::new()).unsigned_area();
        if area == 0.0 {
            return None;
        }
        let bounding_rect = line_string.bounding_rect()?;

        Some(Self {
            line_string,
            area,
            bounding_rect,
        })
    }

    /// The ring's unsigned area, used for the descending sort in step 4.
    #[must_use]
    pub const fn area(&self) -> f64 {
        self.area
    }

    /// The ring's axis-aligned bounding rectangle, used to seed the
    /// prepared containment index.
    #[must_use]
    pub const fn bounding_rect(&self) -> Rect<f64> {
        self.bounding_rect
    }

    /// Borrow the underlying closed coordinate sequence.
    #[must_use]
    pub const fn line_string(&self) -> &LineString<f64> {
        &self.line_string
    }

    /// Build a holeless polygon over this ring, for containment testing
    /// and validity checks.
    #[must_use]
    pub fn as_polygon(&self) -> Polygon<f64> {
        Polygon::new(self.line_string.clone(), Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::Ring;
    use geo::Coord;
    use rstest::rstest;

    fn square(x0: f64, y0: f64, side: f64) -> Vec<Coord<f64>> {
        vec![
            Coord { x: x0, y: y0 },
            Coord { x: x0 + side, y: y0 },
            Coord {
                x: x0 + side,
                y: y0 + side,
            },
            Coord { x: x0, y: y0 + side },
            Coord { x: x0, y: y0 },
        ]
    }

    #[rstest]
    fn builds_from_a_closed_square() {
        let ring = Ring::try_new(square(0.0, 0.0, 1.0)).expect("valid ring");
        assert!((ring.area() - 1.0).abs() < 1e-9);
    }

    #[rstest]
    fn rejects_chains_shorter_than_four_points() {
        let coords = vec![
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 1.0, y: 0.0 },
            Coord { x: 0.0, y: 0.0 },
        ];
        assert!(Ring::try_new(coords).is_none());
    }

    #[rstest]
    fn rejects_unclosed_chains() {
        let mut coords = square(0.0, 0.0, 1.0);
        coords.pop();
        assert!(Ring::try_new(coords).is_none());
    }

    #[rstest]
    fn rejects_zero_area_rings() {
        let coords = vec![
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 1.0, y: 0.0 },
            Coord { x: 2.0, y: 0.0 },
            Coord { x: 0.0, y: 0.0 },
        ];
        assert!(Ring::try_new(coords).is_none());
    }
}

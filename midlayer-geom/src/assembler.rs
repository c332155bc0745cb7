//! The multipolygon assembler (4.F): turns a relation's member way
//! coordinates into validated polygons, merging them into a single
//! multipolygon when configured to.
//!
//! Grounded on `examples/original_source/geometry-builder.cpp`'s
//! `build_polygons`, including its area-descending `polygondata` sort and
//! its nested "is it actually top-level after all" containment check.

use geo::{Area, BooleanOps, Contains, Coord, Intersects, Line, LineString, MultiPolygon, Polygon};
use rstar::{AABB, RTree, RTreeObject};

use crate::ring::Ring;

/// Construction-time flags controlling assembly (steps 7-8).
#[derive(Debug, Clone, Copy, Default)]
pub struct AssemblerConfig {
    /// When `true`, more than one top-level outer ring is packaged as a
    /// single [`MultiPolygon`]; otherwise each is emitted separately.
    pub multi_output: bool,
    /// When `true`, an invalid top-level polygon is dropped outright
    /// (step 7(a)) without attempting the zero-width-buffer repair;
    /// when `false` (the default), repair is attempted first (step
    /// 7(b)) and the polygon is dropped only if it is still invalid
    /// afterwards.
    pub exclude_broken: bool,
}

/// Why a candidate ring or polygon was dropped during assembly, kept for
/// diagnostics rather than surfaced as an error: none of these represent
/// a caller bug, only an unusable or unrepairable input shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscardReason {
    /// A merged chain never closed into a ring.
    UnclosedChain,
    /// A closed chain enclosed zero area.
    ZeroAreaRing,
    /// A top-level polygon was invalid and `exclude_broken` was set, so
    /// it was dropped without attempting repair (step 7(a)).
    ExcludedBroken,
    /// A top-level polygon was invalid both before and after the
    /// self-union repair attempt (Open Question 2: dropped
    /// unconditionally, independent of the multi-output flag).
    InvalidAfterRepair,
}

/// The result of assembling one relation's member ways into geometry.
#[derive(Debug, Clone, Default)]
pub struct AssembledGeometry {
    /// Validated top-level polygons, outer ring plus holes, in the order
    /// they were assembled (area-descending by outer ring).
    pub polygons: Vec<Polygon<f64>>,
    /// `Some` when `config.multi_output` was set and more than one
    /// top-level polygon resulted; packages all of `polygons` together.
    pub multi_polygon: Option<MultiPolygon<f64>>,
    /// Rings and polygons dropped along the way, for the caller's
    /// diagnostic log; an empty `polygons` with a non-empty `discarded`
    /// distinguishes "nothing usable was found" from "nothing was
    /// attempted".
    pub discarded: Vec<DiscardReason>,
}

/// Assemble a relation's member way coordinate lists into zero or more
/// polygons.
///
/// `way_coords` holds the resolved coordinate list for each member way in
/// relation order. Ways with fewer than 2 resolved points are skipped
/// (step 1).
#[must_use]
pub fn assemble_multipolygon(
    way_coords: &[Vec<Coord<f64>>],
    config: AssemblerConfig,
) -> AssembledGeometry {
    let chains: Vec<Vec<Coord<f64>>> = way_coords
        .iter()
        .filter(|coords| coords.len() >= 2)
        .cloned()
        .collect();

    let merged = merge_chains(chains);

    let mut discarded = Vec::new();
    let mut rings: Vec<Ring> = Vec::with_capacity(merged.len());
    for chain in merged {
        let closed = chain.first() == chain.last();
        if !closed {
            discarded.push(DiscardReason::UnclosedChain);
            continue;
        }
        match Ring::try_new(chain) {
            Some(ring) => rings.push(ring),
            None => discarded.push(DiscardReason::ZeroAreaRing),
        }
    }

    if rings.is_empty() {
        return AssembledGeometry {
            polygons: Vec::new(),
            multi_polygon: None,
            discarded,
        };
    }

    rings.sort_by(|a, b| b.area().total_cmp(&a.area()));

    let contained_by = classify_holes(&rings);
    let polygons = build_polygons(&rings, &contained_by, config, &mut discarded);

    let multi_polygon = if config.multi_output && polygons.len() > 1 {
        Some(MultiPolygon::new(polygons.clone()))
    } else {
        None
    };

    AssembledGeometry {
        polygons,
        multi_polygon,
        discarded,
    }
}

/// Step 5: classify each ring as top-level (`None`) or a hole of the
/// outer ring at the returned index, using a prepared bounding-box index
/// to narrow the candidates before the exact `geo::Contains` check.
fn classify_holes(rings: &[Ring]) -> Vec<Option<usize>> {
    let index = build_envelope_index(rings);
    let mut contained_by: Vec<Option<usize>> = vec![None; rings.len()];

    for (i, ring_i) in rings.iter().enumerate() {
        if owner_of(&contained_by, i).is_some() {
            continue;
        }
        let outer = ring_i.as_polygon();
        let envelope = rect_envelope(ring_i.bounding_rect());

        let mut candidates: Vec<usize> = index
            .locate_in_envelope_intersecting(&envelope)
            .map(|entry| entry.index)
            .filter(|&j| j > i)
            .collect();
        candidates.sort_unstable();

        for j in candidates {
            if owner_of(&contained_by, j).is_some() {
                continue;
            }
            let Some(ring_j) = rings.get(j) else {
                continue;
            };
            if !outer.contains(&ring_j.as_polygon()) {
                continue;
            }

            let nested_under_inner = rings
                .get(i + 1..j)
                .map(|between| {
                    between.iter().enumerate().any(|(offset, ring_k)| {
                        let k = i + 1 + offset;
                        owner_of(&contained_by, k) == Some(i)
                            && ring_k.as_polygon().contains(&ring_j.as_polygon())
                    })
                })
                .unwrap_or(false);

            if !nested_under_inner {
                set_owner(&mut contained_by, j, i);
            }
        }
    }

    contained_by
}

fn owner_of(contained_by: &[Option<usize>], index: usize) -> Option<usize> {
    contained_by.get(index).copied().flatten()
}

fn set_owner(contained_by: &mut [Option<usize>], index: usize, owner: usize) {
    if let Some(slot) = contained_by.get_mut(index) {
        *slot = Some(owner);
    }
}

/// Step 6-7: build each top-level ring into a polygon with its
/// classified holes, repairing or discarding invalid results.
fn build_polygons(
    rings: &[Ring],
    contained_by: &[Option<usize>],
    config: AssemblerConfig,
    discarded: &mut Vec<DiscardReason>,
) -> Vec<Polygon<f64>> {
    let mut polygons = Vec::new();
    for (i, ring) in rings.iter().enumerate() {
        if owner_of(contained_by, i).is_some() {
            continue;
        }
        let holes: Vec<LineString<f64>> = contained_by
            .iter()
            .enumerate()
            .filter(|&(_, owner)| *owner == Some(i))
            .filter_map(|(j, _)| rings.get(j).map(|ring| ring.line_string().clone()))
            .collect();

        let polygon = Polygon::new(ring.line_string().clone(), holes);
        match repair_if_needed(polygon, config.exclude_broken) {
            Ok(polygon) => polygons.push(polygon),
            Err(reason) => discarded.push(reason),
        }
    }
    polygons
}

/// Step 7: repair a polygon via self-union if invalid, or discard it
/// without attempting repair when `exclude_broken` is set (step 7(a));
/// a polygon still invalid after repair is always discarded (Open
/// Question 2), independent of `exclude_broken`.
fn repair_if_needed(
    polygon: Polygon<f64>,
    exclude_broken: bool,
) -> Result<Polygon<f64>, DiscardReason> {
    if is_valid(&polygon) {
        return Ok(polygon);
    }
    if exclude_broken {
        return Err(DiscardReason::ExcludedBroken);
    }

    let repaired = polygon.union(&polygon);
    repaired
        .0
        .into_iter()
        .find(is_valid)
        .ok_or(DiscardReason::InvalidAfterRepair)
}

/// A lightweight validity check: closed exterior, nonzero area, and no
/// self-intersecting exterior segments. `geo` in this dependency stack
/// has no `is_valid` oracle (unlike GEOS's `isValid`), so this predicate
/// is assembled from the properties steps 3 and 6 already require.
fn is_valid(polygon: &Polygon<f64>) -> bool {
    let exterior = polygon.exterior();
    exterior.0.len() >= 4
        && exterior.0.first() == exterior.0.last()
        && polygon.unsigned_area() > 0.0
        && !self_intersects(exterior)
}

/// Whether any two non-adjacent segments of a closed ring cross.
fn self_intersects(ring: &LineString<f64>) -> bool {
    let coords = &ring.0;
    let segment_count = coords.len().saturating_sub(1);
    if segment_count < 4 {
        return false;
    }

    for i in 0..segment_count {
        let Some(a) = segment_at(coords, i) else {
            continue;
        };
        for j in (i + 1)..segment_count {
            let shares_endpoint = j == i + 1 || (i == 0 && j == segment_count - 1);
            if shares_endpoint {
                continue;
            }
            let Some(b) = segment_at(coords, j) else {
                continue;
            };
            if a.intersects(&b) {
                return true;
            }
        }
    }
    false
}

fn segment_at(coords: &[Coord<f64>], index: usize) -> Option<Line<f64>> {
    let start = *coords.get(index)?;
    let end = *coords.get(index + 1)?;
    Some(Line::new(start, end))
}

struct RingEnvelope {
    index: usize,
    min: [f64; 2],
    max: [f64; 2],
}

impl RTreeObject for RingEnvelope {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(self.min, self.max)
    }
}

fn rect_envelope(rect: geo::Rect<f64>) -> AABB<[f64; 2]> {
    AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y])
}

/// Build a prepared bounding-box index over every ring's envelope, used
/// as a cheap pre-filter before the exact `geo::Contains` check in step
/// 5 (the workspace's equivalent of `geos::prep::PreparedGeometry`).
fn build_envelope_index(rings: &[Ring]) -> RTree<RingEnvelope> {
    let entries = rings
        .iter()
        .enumerate()
        .map(|(index, ring)| {
            let rect = ring.bounding_rect();
            RingEnvelope {
                index,
                min: [rect.min().x, rect.min().y],
                max: [rect.max().x, rect.max().y],
            }
        })
        .collect();
    RTree::bulk_load(entries)
}

/// Merge contiguous chains end-to-end wherever they share an endpoint
/// under exact floating-point equality (step 2). No snapping tolerance
/// is introduced, matching GEOS's `LineMerger` (nearly-but-not-exactly
/// touching ways do not join).
fn merge_chains(mut chains: Vec<Vec<Coord<f64>>>) -> Vec<Vec<Coord<f64>>> {
    loop {
        let mut merged_pair = None;
        'search: for i in 0..chains.len() {
            for j in 0..chains.len() {
                if i == j {
                    continue;
                }
                let Some((chain_i, chain_j)) = chains.get(i).zip(chains.get(j)) else {
                    continue;
                };
                if chain_is_closed(chain_i) || chain_is_closed(chain_j) {
                    continue;
                }
                if let Some(merged) = try_merge(chain_i, chain_j) {
                    merged_pair = Some((i, j, merged));
                    break 'search;
                }
            }
        }

        let Some((i, j, merged)) = merged_pair else {
            break;
        };
        let (keep, drop) = if i < j { (i, j) } else { (j, i) };
        if let Some(slot) = chains.get_mut(keep) {
            *slot = merged;
        }
        chains.remove(drop);
    }
    chains
}

fn chain_is_closed(chain: &[Coord<f64>]) -> bool {
    chain.len() >= 2 && chain.first() == chain.last()
}

fn try_merge(a: &[Coord<f64>], b: &[Coord<f64>]) -> Option<Vec<Coord<f64>>> {
    let a_first = *a.first()?;
    let a_last = *a.last()?;
    let b_first = *b.first()?;
    let b_last = *b.last()?;

    if a_last == b_first {
        let mut merged = a.to_vec();
        merged.extend(b.iter().skip(1));
        return Some(merged);
    }
    if a_last == b_last {
        let mut merged = a.to_vec();
        merged.extend(b.iter().rev().skip(1));
        return Some(merged);
    }
    if a_first == b_last {
        let mut merged = b.to_vec();
        merged.extend(a.iter().skip(1));
        return Some(merged);
    }
    if a_first == b_first {
        let mut merged: Vec<Coord<f64>> = a.iter().rev().copied().collect();
        merged.extend(b.iter().skip(1));
        return Some(merged);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::{AssemblerConfig, DiscardReason, assemble_multipolygon};
    use geo::Coord;

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

    #[test]
    fn assembles_a_single_closed_square() {
        let result = assemble_multipolygon(&[square(0.0, 0.0, 10.0)], AssemblerConfig::default());
        assert_eq!(result.polygons.len(), 1);
        assert!(result.multi_polygon.is_none());
        assert!(result.discarded.is_empty());
    }

    #[test]
    fn assembles_a_square_with_a_hole() {
        let outer = square(0.0, 0.0, 10.0);
        let inner = square(2.0, 2.0, 2.0);
        let result = assemble_multipolygon(&[outer, inner], AssemblerConfig::default());
        assert_eq!(result.polygons.len(), 1);
        assert_eq!(result.polygons[0].interiors().len(), 1);
    }

    #[test]
    fn two_disjoint_squares_emit_two_polygons_without_multi_output() {
        let a = square(0.0, 0.0, 1.0);
        let b = square(10.0, 10.0, 1.0);
        let result = assemble_multipolygon(&[a, b], AssemblerConfig::default());
        assert_eq!(result.polygons.len(), 2);
        assert!(result.multi_polygon.is_none());
    }

    #[test]
    fn two_disjoint_squares_package_as_multipolygon_when_enabled() {
        let a = square(0.0, 0.0, 1.0);
        let b = square(10.0, 10.0, 1.0);
        let result = assemble_multipolygon(
            &[a, b],
            AssemblerConfig {
                multi_output: true,
                exclude_broken: false,
            },
        );
        assert_eq!(result.polygons.len(), 2);
        let multi = result.multi_polygon.expect("multi-output configured");
        assert_eq!(multi.0.len(), 2);
    }

    #[test]
    fn nested_ring_trio_classifies_middle_as_hole_and_innermost_as_separate_outer() {
        // A (largest, outer) contains B (hole of A) contains C (outer again).
        let a = square(0.0, 0.0, 10.0);
        let b = square(2.0, 2.0, 6.0);
        let c = square(3.0, 3.0, 2.0);
        let result = assemble_multipolygon(&[a, b, c], AssemblerConfig::default());
        assert_eq!(result.polygons.len(), 2);
        let hole_counts: Vec<usize> = result
            .polygons
            .iter()
            .map(|p| p.interiors().len())
            .collect();
        assert!(hole_counts.contains(&1));
        assert!(hole_counts.contains(&0));
    }

    #[test]
    fn ways_joined_across_two_segments_form_one_ring() {
        let first = vec![
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 5.0, y: 0.0 },
            Coord { x: 5.0, y: 5.0 },
        ];
        let second = vec![
            Coord { x: 5.0, y: 5.0 },
            Coord { x: 0.0, y: 5.0 },
            Coord { x: 0.0, y: 0.0 },
        ];
        let result = assemble_multipolygon(&[first, second], AssemblerConfig::default());
        assert_eq!(result.polygons.len(), 1);
    }

    #[test]
    fn chains_that_never_close_are_discarded_without_panicking() {
        let open = vec![
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 1.0, y: 0.0 },
            Coord { x: 1.0, y: 1.0 },
        ];
        let result = assemble_multipolygon(&[open], AssemblerConfig::default());
        assert!(result.polygons.is_empty());
        assert_eq!(result.discarded, vec![DiscardReason::UnclosedChain]);
    }

    #[test]
    fn ways_with_fewer_than_two_points_are_skipped() {
        let lone_point = vec![Coord { x: 0.0, y: 0.0 }];
        let result = assemble_multipolygon(
            &[square(0.0, 0.0, 1.0), lone_point],
            AssemblerConfig::default(),
        );
        assert_eq!(result.polygons.len(), 1);
    }

    #[test]
    fn exclude_broken_drops_an_invalid_ring_without_attempting_repair() {
        // Same asymmetric bowtie as the self-intersection repair test:
        // it has nonzero net area, so it survives ring construction, but
        // its exterior self-intersects and is therefore invalid.
        let bowtie = vec![
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 10.0, y: 0.0 },
            Coord { x: 2.0, y: 8.0 },
            Coord { x: 8.0, y: 8.0 },
            Coord { x: 0.0, y: 0.0 },
        ];
        let result = assemble_multipolygon(
            &[bowtie],
            AssemblerConfig {
                multi_output: false,
                exclude_broken: true,
            },
        );
        assert!(result.polygons.is_empty());
        assert_eq!(result.discarded, vec![DiscardReason::ExcludedBroken]);
    }
}

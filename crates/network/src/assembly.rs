//! Shape assembly: merge the unordered ways of one route into a single path.
//!
//! Fragments arrive in arbitrary order and direction. Each round attaches
//! the first unplaced fragment that shares an endpoint with either end of
//! the growing path; when nothing touches, the fragment nearest to either
//! end is bridged with a straight edge and reported. Closed fragments
//! (turning circles, balloon loops) are cut open beforehand at the points
//! where the fragments touching them meet them, wherever those sit in the
//! input.

use geo::algorithm::line_intersection::{line_intersection, LineIntersection};
use geo::{Coord, Line};

use crate::diagnostics::{DiagnosticKind, DiagnosticSink};
use crate::geometry::{coords_eq, dedup_coords, distance, nearest_on_polyline, polyline_length};
use crate::geometry::{Fragment, Path};
use crate::models::types::{Result, TransitError};

/// How a fragment was attached to the path
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Join {
    /// Path tail meets fragment head: append
    TailToHead,
    /// Path tail meets fragment tail: append reversed
    TailToTail,
    /// Path head meets fragment head: flip the path, then append
    HeadToHead,
    /// Path head meets fragment tail: prepend
    HeadToTail,
}

pub struct ShapeAssembler<'a> {
    epsilon: f64,
    sink: &'a dyn DiagnosticSink,
}

impl<'a> ShapeAssembler<'a> {
    pub fn new(epsilon: f64, sink: &'a dyn DiagnosticSink) -> Self {
        Self { epsilon, sink }
    }

    /// Assemble planar fragments into one ordered path
    pub fn assemble(&self, fragments: Vec<Fragment>) -> Result<Path> {
        let mut pieces: Vec<Vec<Coord<f64>>> = fragments
            .into_iter()
            .map(|f| {
                let mut coords = f.0;
                dedup_coords(&mut coords, self.epsilon);
                coords
            })
            .filter(|coords| coords.len() >= 2)
            .collect();

        if pieces.is_empty() {
            return Err(TransitError::DegeneratePath(
                "route has no usable fragments".into(),
            ));
        }

        self.open_loops(&mut pieces);

        let mut slots: Vec<Option<Vec<Coord<f64>>>> = pieces.into_iter().map(Some).collect();
        let mut path = slots[0].take().unwrap_or_default();
        let mut remaining = slots.len() - 1;

        while remaining > 0 {
            match self.find_join(&path, &slots) {
                Some((idx, join)) => {
                    if let Some(fragment) = slots[idx].take() {
                        apply_join(&mut path, fragment, join, true);
                    }
                }
                None => {
                    let Some(bridge) = nearest_fragment(&path, &slots) else {
                        break;
                    };
                    if let Some(fragment) = slots[bridge.index].take() {
                        self.sink.warn(DiagnosticKind::BridgedGap {
                            from: bridge.from,
                            to: bridge.to,
                            distance: bridge.gap(),
                        });
                        apply_join(&mut path, fragment, bridge.join, false);
                    }
                }
            }
            dedup_coords(&mut path, self.epsilon);
            remaining -= 1;
        }

        log::trace!("Assembled path with {} vertices", path.len());
        Path::new(path)
    }

    /// First unplaced fragment sharing an endpoint with the path
    fn find_join(
        &self,
        path: &[Coord<f64>],
        slots: &[Option<Vec<Coord<f64>>>],
    ) -> Option<(usize, Join)> {
        let head = path[0];
        let tail = path[path.len() - 1];

        slots.iter().enumerate().find_map(|(idx, slot)| {
            let fragment = slot.as_ref()?;
            let first = fragment[0];
            let last = fragment[fragment.len() - 1];

            let join = if coords_eq(tail, first, self.epsilon) {
                Join::TailToHead
            } else if coords_eq(tail, last, self.epsilon) {
                Join::TailToTail
            } else if coords_eq(head, first, self.epsilon) {
                Join::HeadToHead
            } else if coords_eq(head, last, self.epsilon) {
                Join::HeadToTail
            } else {
                return None;
            };
            Some((idx, join))
        })
    }

    /// Replace each closed fragment with the arc between the fragments
    /// that meet it
    fn open_loops(&self, pieces: &mut [Vec<Coord<f64>>]) {
        if pieces.len() < 2 {
            return;
        }

        let cuts: Vec<(usize, Vec<Coord<f64>>)> = (0..pieces.len())
            .filter(|&i| is_closed(&pieces[i], self.epsilon))
            .map(|i| {
                let (entry, exit) = self.neighbours(&pieces[..], i);
                let before = entry.map(|j| pieces[j].as_slice());
                let after = exit.map(|j| pieces[j].as_slice());
                (i, self.cut_loop(&pieces[i], before, after))
            })
            .collect();

        for (i, arc) in cuts {
            log::trace!(
                "Opened loop fragment {} ({} -> {} vertices)",
                i,
                pieces[i].len(),
                arc.len()
            );
            pieces[i] = arc;
        }
    }

    /// Open fragments touching ring `i`: the nearest one ending on it
    /// (entry) and the nearest one starting from it (exit).
    ///
    /// A side with no fragment drawn that way takes the nearest remaining
    /// toucher.
    fn neighbours(
        &self,
        pieces: &[Vec<Coord<f64>>],
        i: usize,
    ) -> (Option<usize>, Option<usize>) {
        let ring = &pieces[i];
        let gap = |c: Coord<f64>| {
            nearest_on_polyline(ring, c).map_or(f64::INFINITY, |(_, p)| p.distance)
        };

        let mut touching: Vec<(f64, bool, usize)> = pieces
            .iter()
            .enumerate()
            .filter(|&(j, piece)| j != i && !is_closed(piece, self.epsilon))
            .filter_map(|(j, piece)| {
                let head = gap(piece[0]);
                let tail = gap(piece[piece.len() - 1]);
                let near = head.min(tail);
                let touches = near <= self.epsilon || !crossings(ring, piece).is_empty();
                touches.then_some((near, tail <= head, j))
            })
            .collect();
        touching.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.2.cmp(&b.2)));

        let entry = touching.iter().find(|t| t.1).map(|t| t.2);
        let exit = touching.iter().find(|t| !t.1).map(|t| t.2);
        let other = |taken: usize| touching.iter().map(|t| t.2).find(|&j| j != taken);

        match (entry, exit) {
            (Some(e), None) => (Some(e), other(e)),
            (None, Some(x)) => (other(x), Some(x)),
            pair => pair,
        }
    }

    /// Cut a closed ring open between the points where its neighbours meet it.
    ///
    /// With two distinct transition points the shorter arc between them is
    /// kept (the forward arc on a tie). With one transition point the whole
    /// ring is kept, starting and ending there.
    fn cut_loop(
        &self,
        closed: &[Coord<f64>],
        before: Option<&[Coord<f64>]>,
        after: Option<&[Coord<f64>]>,
    ) -> Vec<Coord<f64>> {
        let entry = before.and_then(|n| transition_point(closed, n));
        let exit = after.and_then(|n| transition_point(closed, n));

        let mut ring = closed[..closed.len() - 1].to_vec();
        let (a, b) = match (entry, exit) {
            (Some(p), Some(q)) => {
                let p = anchor(&mut ring, p, self.epsilon);
                let q = anchor(&mut ring, q, self.epsilon);
                (index_of(&ring, p), index_of(&ring, q))
            }
            (Some(p), None) | (None, Some(p)) => {
                let p = anchor(&mut ring, p, self.epsilon);
                let i = index_of(&ring, p);
                (i, i)
            }
            (None, None) => return closed.to_vec(),
        };

        let m = ring.len();
        let doubled: Vec<Coord<f64>> = ring.iter().chain(ring.iter()).copied().collect();

        if a == b {
            return doubled[a..=a + m].to_vec();
        }

        let b_fwd = if b > a { b } else { b + m };
        let forward = &doubled[a..=b_fwd];

        let a_bwd = if a > b { a } else { a + m };
        let mut backward = doubled[b..=a_bwd].to_vec();
        backward.reverse();

        if polyline_length(&backward) < polyline_length(forward) {
            backward
        } else {
            forward.to_vec()
        }
    }
}

fn is_closed(coords: &[Coord<f64>], epsilon: f64) -> bool {
    coords.len() >= 4 && coords_eq(coords[0], coords[coords.len() - 1], epsilon)
}

/// Attach `fragment` at the path end named by `join`. A `shared` end
/// coordinate is kept once; otherwise both ends stay and the gap between
/// them becomes an edge.
fn apply_join(
    path: &mut Vec<Coord<f64>>,
    mut fragment: Vec<Coord<f64>>,
    join: Join,
    shared: bool,
) {
    let skip = usize::from(shared);
    match join {
        Join::TailToHead => path.extend(fragment.into_iter().skip(skip)),
        Join::TailToTail => path.extend(fragment.into_iter().rev().skip(skip)),
        Join::HeadToHead => {
            path.reverse();
            path.extend(fragment.into_iter().skip(skip));
        }
        Join::HeadToTail => {
            if shared {
                fragment.pop();
            }
            fragment.append(path);
            *path = fragment;
        }
    }
}

/// Straight edge closing the smallest gap between a path end and an
/// unplaced fragment
struct Bridge {
    index: usize,
    join: Join,
    from: Coord<f64>,
    to: Coord<f64>,
}

impl Bridge {
    fn gap(&self) -> f64 {
        distance(self.from, self.to)
    }
}

fn nearest_fragment(path: &[Coord<f64>], slots: &[Option<Vec<Coord<f64>>>]) -> Option<Bridge> {
    let head = path[0];
    let tail = path[path.len() - 1];

    slots
        .iter()
        .enumerate()
        .filter_map(|(index, slot)| slot.as_ref().map(|f| (index, f)))
        .flat_map(|(index, f)| {
            let first = f[0];
            let last = f[f.len() - 1];
            [
                (Join::TailToHead, tail, first),
                (Join::TailToTail, tail, last),
                (Join::HeadToHead, head, first),
                (Join::HeadToTail, head, last),
            ]
            .map(|(join, from, to)| Bridge {
                index,
                join,
                from,
                to,
            })
        })
        .min_by(|a, b| a.gap().total_cmp(&b.gap()))
}

/// Points where `line` crosses or touches `ring`
fn crossings(ring: &[Coord<f64>], line: &[Coord<f64>]) -> Vec<Coord<f64>> {
    let mut points = Vec::new();
    for n in line.windows(2) {
        for r in ring.windows(2) {
            match line_intersection(Line::new(n[0], n[1]), Line::new(r[0], r[1])) {
                Some(LineIntersection::SinglePoint { intersection, .. }) => {
                    points.push(intersection)
                }
                Some(LineIntersection::Collinear { intersection }) => {
                    points.push(intersection.start);
                    points.push(intersection.end);
                }
                None => {}
            }
        }
    }
    points
}

/// Where a neighbouring fragment meets a ring: the crossing closest to the
/// neighbour's nearer end, or that end's projection onto the ring
fn transition_point(ring: &[Coord<f64>], neighbour: &[Coord<f64>]) -> Option<Coord<f64>> {
    let (end, projected) = [neighbour[0], neighbour[neighbour.len() - 1]]
        .into_iter()
        .filter_map(|end| nearest_on_polyline(ring, end).map(|(_, p)| (end, p)))
        .min_by(|a, b| a.1.distance.total_cmp(&b.1.distance))?;

    let crossing = crossings(ring, neighbour)
        .into_iter()
        .min_by(|a, b| distance(end, *a).total_cmp(&distance(end, *b)));

    Some(crossing.unwrap_or(projected.point))
}

/// Make `p` a vertex of the open ring and return the stored coordinate
fn anchor(ring: &mut Vec<Coord<f64>>, p: Coord<f64>, epsilon: f64) -> Coord<f64> {
    if let Some(existing) = ring.iter().find(|c| coords_eq(**c, p, epsilon)) {
        return *existing;
    }

    let m = ring.len();
    let mut closed = ring.clone();
    closed.push(ring[0]);

    let Some((edge, projection)) = nearest_on_polyline(&closed, p) else {
        return p;
    };
    let a = ring[edge];
    let b = ring[(edge + 1) % m];
    if coords_eq(projection.point, a, epsilon) {
        return a;
    }
    if coords_eq(projection.point, b, epsilon) {
        return b;
    }

    ring.insert(edge + 1, projection.point);
    projection.point
}

fn index_of(ring: &[Coord<f64>], p: Coord<f64>) -> usize {
    ring.iter().position(|c| *c == p).unwrap_or(0)
}

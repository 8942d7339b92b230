//! Beams joining groups on two adjacent staffs.
//!
//! The beam line is fitted to the tips of default-length stems by least
//! squares, then moved so that the shortest stems get the default length
//! again. Every stem of the beam is then cut or extended to reach it.

use super::cross_staff::{neighbour, staff_at, staff_records};
use crate::error::{Error, Result};
use crate::timeline::geometry::{BEAM_SEP, FUDGE, STEPSIZE};
use crate::timeline::group::{BeamLoc, CrossStaff, StemDir};
use crate::timeline::{GroupId, ParamId, ParameterContext, Timeline};
use std::ops::Range;

/// One stem taking part in a beam
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeamStem {
    pub x: f64,
    /// Y of the note the stem starts from
    pub base: f64,
    pub dir: StemDir,
    pub levels: u8,
    /// Length the user asked for
    pub forced: Option<f64>,
}

/// Settings governing one beam
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeamParams {
    pub stem_len: f64,
    /// Most a stem may fall short of `stem_len` when the staffs crowd the beam
    pub beam_short: f64,
    pub factor: f64,
    /// Steepest allowed slope, in degrees
    pub max_angle: f64,
    pub forced_slope: Option<f64>,
}

impl BeamParams {
    pub fn from_context(ctx: &ParameterContext, staff: usize, voice: usize) -> Self {
        let num = |id| ctx.voice_num(Some(staff), Some(voice), id);
        Self {
            stem_len: num(ParamId::StemLen),
            beam_short: num(ParamId::BeamShort),
            factor: num(ParamId::BeamFactor),
            max_angle: num(ParamId::BeamMaxAngle),
            forced_slope: None,
        }
    }

    /// Shortest stem tolerated before the beam is reported as crowded
    fn min_stem(&self) -> f64 {
        (self.stem_len - self.beam_short).max(0.0)
    }
}

/// The primary beam line `y = intercept + slope * x`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeamLine {
    pub slope: f64,
    pub intercept: f64,
}

impl BeamLine {
    pub fn y_at(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }
}

/// Secondary beams hang below the primary line, so down stems crossing to
/// a beam below their notes reach past it to the lowest one.
fn extra(stem: &BeamStem, opposite: bool) -> f64 {
    if opposite && stem.dir == StemDir::Down {
        f64::from(stem.levels.max(1) - 1) * BEAM_SEP
    } else {
        0.0
    }
}

/// Y of the primary line where a stem of `len` would meet it
fn line_point(stem: &BeamStem, len: f64, opposite: bool) -> f64 {
    match stem.dir {
        StemDir::Up => stem.base + len,
        StemDir::Down => stem.base - len + extra(stem, opposite),
    }
}

/// Length of `stem` when it ends on `line`
pub fn stem_length(line: &BeamLine, stem: &BeamStem, opposite: bool) -> f64 {
    let y = line.y_at(stem.x);
    match stem.dir {
        StemDir::Up => y - stem.base,
        StemDir::Down => stem.base - y + extra(stem, opposite),
    }
}

/// Ordinary least squares slope, zero when all x coincide
fn regression_slope(points: &[(f64, f64)]) -> f64 {
    let n = points.len() as f64;
    let mean_x = points.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = points.iter().map(|p| p.1).sum::<f64>() / n;
    let sxy: f64 = points.iter().map(|p| (p.0 - mean_x) * (p.1 - mean_y)).sum();
    let sxx: f64 = points.iter().map(|p| (p.0 - mean_x).powi(2)).sum();
    if sxx < FUDGE {
        0.0
    } else {
        sxy / sxx
    }
}

/// Fit the primary beam line for `stems`, given in left to right order.
pub fn fit_beam(stems: &[BeamStem], params: &BeamParams) -> BeamLine {
    let (Some(first), Some(last)) = (stems.first(), stems.last()) else {
        return BeamLine { slope: 0.0, intercept: 0.0 };
    };
    let opposite = stems.iter().any(|s| s.dir != first.dir);
    let run = last.x - first.x;

    if let (Some(f1), Some(f2)) = (first.forced, last.forced) {
        let y1 = line_point(first, f1, opposite);
        let y2 = line_point(last, f2, opposite);
        let slope = if run.abs() < FUDGE { 0.0 } else { (y2 - y1) / run };
        return BeamLine {
            slope,
            intercept: y1 - slope * first.x,
        };
    }

    let slope = match params.forced_slope {
        Some(slope) => slope,
        None => {
            let ideal: Vec<(f64, f64)> = stems
                .iter()
                .map(|s| (s.x, line_point(s, params.stem_len, opposite)))
                .collect();
            let limit = params.max_angle.to_radians().tan();
            let slope = (regression_slope(&ideal) * params.factor).clamp(-limit, limit);
            if (slope * run).abs() <= STEPSIZE + FUDGE {
                0.0
            } else {
                slope
            }
        }
    };

    let forced_end = [first, last]
        .into_iter()
        .find_map(|s| s.forced.map(|len| (s, len)));
    let intercept = if let Some((stem, len)) = forced_end {
        line_point(stem, len, opposite) - slope * stem.x
    } else {
        let target = params.stem_len;
        let up = stems
            .iter()
            .filter(|s| s.dir == StemDir::Up)
            .map(|s| s.base + target - slope * s.x)
            .fold(f64::NEG_INFINITY, f64::max);
        let down = stems
            .iter()
            .filter(|s| s.dir == StemDir::Down)
            .map(|s| s.base - target + extra(s, opposite) - slope * s.x)
            .fold(f64::INFINITY, f64::min);
        match (up.is_finite(), down.is_finite()) {
            (true, true) => (up + down) / 2.0,
            (true, false) => up,
            _ => down,
        }
    };
    BeamLine { slope, intercept }
}

/// Groups of the beam starting at `start`, in voice order
fn beam_chain(timeline: &Timeline, start: GroupId) -> Vec<GroupId> {
    let mut chain = vec![start];
    let mut current = start;
    while timeline.group(current).beam != BeamLoc::End {
        match timeline.group(current).next {
            Some(next) if timeline.group(next).is_beamed() => {
                chain.push(next);
                current = next;
            }
            _ => break,
        }
    }
    chain
}

/// Beam starts on the staff of record `index` pointing toward `dir`
fn beam_starts(
    timeline: &Timeline,
    index: usize,
    dir: CrossStaff,
) -> Result<Vec<(GroupId, usize)>> {
    let staff = staff_at(timeline, index)?;
    let mut starts = Vec::new();
    for (v, voice) in staff.voices.iter().enumerate() {
        for &id in voice {
            let g = timeline.group(id);
            if g.beam == BeamLoc::Start && g.beam_to == dir {
                starts.push((id, v + 1));
            }
        }
    }
    Ok(starts)
}

/// A matched pair of beam starts, one per staff
#[derive(Debug, Clone, Copy)]
struct CrossBeam {
    upper_record: usize,
    upper: (GroupId, usize),
    lower: GroupId,
}

fn pair_beams(timeline: &Timeline, measure: Range<usize>) -> Result<Vec<CrossBeam>> {
    let staffs = staff_records(timeline, measure);
    let mut pairs = Vec::new();
    for (k, &index) in staffs.iter().enumerate() {
        let upper_starts = beam_starts(timeline, index, CrossStaff::Below)?;
        if upper_starts.is_empty() {
            continue;
        }
        let Some(lower_index) = neighbour(timeline, &staffs, k, CrossStaff::Below) else {
            for (id, _) in upper_starts {
                log::warn!(
                    "{}: cross-staff beam has no staff below",
                    timeline.group(id).loc
                );
            }
            continue;
        };
        let mut lower_starts = beam_starts(timeline, lower_index, CrossStaff::Above)?;
        for upper in upper_starts {
            let time = timeline.group(upper.0).time;
            match lower_starts.iter().position(|&(id, _)| timeline.group(id).time == time) {
                Some(p) => {
                    let (lower, _) = lower_starts.remove(p);
                    pairs.push(CrossBeam {
                        upper_record: index,
                        upper,
                        lower,
                    });
                }
                None => log::warn!(
                    "{}: cross-staff beam start has no partner on the staff below",
                    timeline.group(upper.0).loc
                ),
            }
        }
        for (id, _) in lower_starts {
            log::warn!(
                "{}: cross-staff beam start has no partner on the staff above",
                timeline.group(id).loc
            );
        }
    }
    Ok(pairs)
}

pub fn solve_cross_beams(timeline: &mut Timeline, ctx: &mut ParameterContext) -> Result<()> {
    let mut beams = Vec::new();
    for system in timeline.systems() {
        for measure in timeline.measures(system) {
            beams.extend(pair_beams(timeline, measure)?);
        }
    }
    for beam in &beams {
        solve_beam(timeline, ctx, beam)?;
    }
    if !beams.is_empty() {
        log::info!("{} cross-staff beams solved", beams.len());
    }
    Ok(())
}

fn solve_beam(
    timeline: &mut Timeline,
    ctx: &mut ParameterContext,
    beam: &CrossBeam,
) -> Result<()> {
    ctx.advance_to(timeline, beam.upper_record)?;
    let staff = staff_at(timeline, beam.upper_record)?.staff;
    let (upper_id, voice) = beam.upper;
    let mut params = BeamParams::from_context(ctx, staff, voice);
    params.forced_slope = timeline
        .group(upper_id)
        .beam_slope
        .or(timeline.group(beam.lower).beam_slope);

    let mut ids: Vec<GroupId> = beam_chain(timeline, upper_id);
    ids.extend(beam_chain(timeline, beam.lower));
    ids.retain(|&id| timeline.group(id).has_notes());
    ids.sort_by(|&a, &b| timeline.group(a).abs.x.total_cmp(&timeline.group(b).abs.x));

    let stems: Vec<BeamStem> = ids
        .iter()
        .map(|&id| {
            let g = timeline.group(id);
            BeamStem {
                x: g.abs.x,
                base: g.stem_base_y(),
                dir: g.stem_dir,
                levels: g.beam_levels,
                forced: g.stem_forced,
            }
        })
        .collect();
    let Some(first) = stems.first() else {
        return Ok(());
    };
    let opposite = stems.iter().any(|s| s.dir != first.dir);
    let line = fit_beam(&stems, &params);
    log::debug!(
        "{}: cross-staff beam slope {:.3}, intercept {:.3}",
        timeline.group(upper_id).loc,
        line.slope,
        line.intercept
    );

    let mut shortest = f64::INFINITY;
    for (&id, stem) in ids.iter().zip(&stems) {
        let length = stem_length(&line, stem, opposite);
        let group = timeline.group_mut(id);
        if length < -FUDGE {
            return Err(Error::StemNegative {
                loc: group.loc.clone(),
                length,
            });
        }
        group.stem_len = length.max(0.0);
        group.refresh_vertical_bounds();
        shortest = shortest.min(group.stem_len);
    }
    if shortest < params.min_stem() - FUDGE {
        log::warn!(
            "{}: cross-staff beam leaves a stem of {:.2}, shorter than {:.2}",
            timeline.group(upper_id).loc,
            shortest,
            params.min_stem()
        );
    }
    Ok(())
}

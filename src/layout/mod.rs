//! Vertical layout driver
//!
//! Runs the passes in order over one timeline: staffs within systems,
//! systems onto pages, absolute coordinates, then the cross-staff fixups
//! that need absolute coordinates on both staffs.

pub mod absolute;
pub mod cross_beam;
pub mod cross_staff;
pub mod grids;
pub mod page;
pub mod paginate;
pub mod relative;
pub mod slack;

pub use page::{Page, PageVariant, PlacedGrid};

use crate::error::{Error, Result};
use crate::timeline::records::Side;
use crate::timeline::{ParameterContext, Timeline};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

/// Settings for one layout run that are not score parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutOptions {
    /// Number printed on the first page
    pub first_page: u32,
    /// Side of the first page; by default odd pages are right pages
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_page_side: Option<Side>,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            first_page: 1,
            first_page_side: None,
        }
    }
}

/// Pages plus the timeline with every absolute box filled in
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutResult {
    pub pages: Vec<Page>,
    pub timeline: Timeline,
}

pub struct Layout {
    options: LayoutOptions,
    /// Pretty-print JSON output
    pretty: bool,
}

impl Layout {
    pub fn new(options: LayoutOptions) -> Self {
        Self {
            options,
            pretty: true,
        }
    }

    /// Write compact instead of pretty-printed JSON
    pub fn compact(mut self, compact: bool) -> Self {
        self.pretty = !compact;
        self
    }

    /// Lay out `timeline` in place and return its pages.
    pub fn run(&self, timeline: &mut Timeline) -> Result<Vec<Page>> {
        timeline.validate()?;
        let mut ctx = ParameterContext::new();

        relative::position_systems(timeline, &mut ctx)?;

        let plans = paginate::assign_pages(timeline, &mut ctx, &self.options)?;
        let mut pages = Vec::with_capacity(plans.len());
        for plan in &plans {
            pages.push(absolute::place_page(timeline, &mut ctx, plan)?);
        }

        cross_staff::reposition_cross_staff(timeline, &mut ctx)?;
        cross_beam::solve_cross_beams(timeline, &mut ctx)?;

        log::info!(
            "laid out {} systems on {} pages",
            pages.iter().map(|p| p.systems.len()).sum::<usize>(),
            pages.len()
        );
        Ok(pages)
    }

    /// Read a timeline as JSON from `input` and write the layout to `output`
    pub fn layout<R: Read>(&self, input: R, output: &Path) -> Result<()> {
        let timeline: Timeline = serde_json::from_reader(input)?;
        let result = self.layout_timeline(timeline)?;
        self.write_output(&result, output)
    }

    /// Lay out the timeline stored in the file `input`
    pub fn layout_file(&self, input: &Path, output: &Path) -> Result<()> {
        let file = File::open(input).map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to open '{}': {}", input.display(), e),
            ))
        })?;
        self.layout(std::io::BufReader::new(file), output)
    }

    fn layout_timeline(&self, mut timeline: Timeline) -> Result<LayoutResult> {
        let pages = self.run(&mut timeline)?;
        Ok(LayoutResult { pages, timeline })
    }

    fn write_output(&self, result: &LayoutResult, output: &Path) -> Result<()> {
        let json = if self.pretty {
            serde_json::to_string_pretty(result)?
        } else {
            serde_json::to_string(result)?
        };
        let mut file = File::create(output)?;
        file.write_all(json.as_bytes())?;
        file.write_all(b"\n")?;
        Ok(())
    }
}

impl Default for Layout {
    fn default() -> Self {
        Self::new(LayoutOptions::default())
    }
}

/// Lay out a timeline given as JSON text.
pub fn layout_json(input: &str, options: LayoutOptions) -> Result<LayoutResult> {
    let timeline: Timeline = serde_json::from_str(input)?;
    Layout::new(options).layout_timeline(timeline)
}

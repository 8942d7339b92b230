//! Pages and their printable area

use super::LayoutOptions;
use crate::timeline::records::{DecorationSet, Decorations, Side};
use crate::timeline::{Bbox, ParamId, ParameterContext};
use serde::{Deserialize, Serialize};

/// First page of the run or any page after it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageVariant {
    First,
    Later,
}

/// Geometry of one page, fixed when the page is opened
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageFrame {
    /// Position of the page in the run, from 0
    pub index: usize,
    pub number: u32,
    pub side: Side,
    pub variant: PageVariant,
    pub sheet: u32,
    pub panel: u32,
    pub decorations: DecorationSet,
    pub page_width: f64,
    pub left: f64,
    pub right: f64,
    /// Y of the top of the music area
    pub top_y: f64,
    /// Height of the music area
    pub available: f64,
}

impl PageFrame {
    pub fn new(
        index: usize,
        ctx: &ParameterContext,
        decorations: &Decorations,
        options: &LayoutOptions,
    ) -> Self {
        let index_u32 = u32::try_from(index).unwrap_or(u32::MAX);
        let number = options.first_page.saturating_add(index_u32);
        let side = page_side(index, number, options.first_page_side);
        let variant = if index == 0 {
            PageVariant::First
        } else {
            PageVariant::Later
        };
        let decorations = match variant {
            PageVariant::First => decorations.first.get(side),
            PageVariant::Later => decorations.later.get(side),
        };

        let page_height = ctx.num(ParamId::PageHeight);
        let top_margin = ctx.num(ParamId::TopMargin);
        let bottom_margin = ctx.num(ParamId::BottomMargin);
        let (mut left, mut right) = (ctx.num(ParamId::LeftMargin), ctx.num(ParamId::RightMargin));
        if side == Side::Left && ctx.flag(ParamId::FlipMargins) {
            std::mem::swap(&mut left, &mut right);
        }
        let panels = (ctx.num(ParamId::PanelsPerPage).round() as u32).max(1);

        Self {
            index,
            number,
            side,
            variant,
            sheet: index_u32 / panels,
            panel: index_u32 % panels,
            decorations,
            page_width: ctx.num(ParamId::PageWidth),
            left,
            right,
            top_y: page_height - top_margin - decorations.above(),
            available: page_height
                - top_margin
                - bottom_margin
                - decorations.above()
                - decorations.below(),
        }
    }

    /// Horizontal room between the margins
    pub fn width(&self) -> f64 {
        self.page_width - self.left - self.right
    }
}

/// Odd page numbers are right pages, unless the first side was chosen.
fn page_side(index: usize, number: u32, first_side: Option<Side>) -> Side {
    match first_side {
        Some(first) if index % 2 == 0 => first,
        Some(Side::Left) => Side::Right,
        Some(Side::Right) => Side::Left,
        None if number % 2 == 1 => Side::Right,
        None => Side::Left,
    }
}

/// A chord grid placed on a page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacedGrid {
    /// Index into `Timeline::grids`
    pub grid: usize,
    pub name: String,
    pub abs: Bbox,
}

/// One finished page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub number: u32,
    pub side: Side,
    pub sheet: u32,
    pub panel: u32,
    pub variant: PageVariant,
    pub decorations: DecorationSet,
    /// System break record indices, top to bottom
    pub systems: Vec<usize>,
    pub top_y: f64,
    pub available: f64,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub grids: Vec<PlacedGrid>,
}

impl Page {
    pub fn from_frame(frame: &PageFrame) -> Self {
        Self {
            number: frame.number,
            side: frame.side,
            sheet: frame.sheet,
            panel: frame.panel,
            variant: frame.variant,
            decorations: frame.decorations,
            systems: Vec::new(),
            top_y: frame.top_y,
            available: frame.available,
            grids: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::records::Sided;

    #[test]
    fn test_sides_alternate() {
        assert_eq!(page_side(0, 1, None), Side::Right);
        assert_eq!(page_side(1, 2, None), Side::Left);
        assert_eq!(page_side(0, 1, Some(Side::Left)), Side::Left);
        assert_eq!(page_side(1, 2, Some(Side::Left)), Side::Right);
    }

    #[test]
    fn test_frame_uses_variant_and_side() {
        let ctx = ParameterContext::new();
        let first = DecorationSet {
            header: 4.0,
            ..DecorationSet::default()
        };
        let later_left = DecorationSet {
            footer: 3.0,
            ..DecorationSet::default()
        };
        let decorations = Decorations {
            first: Sided { left: first, right: first },
            later: Sided {
                left: later_left,
                right: DecorationSet::default(),
            },
        };
        let options = LayoutOptions::default();

        let p1 = PageFrame::new(0, &ctx, &decorations, &options);
        assert_eq!(p1.variant, PageVariant::First);
        assert_eq!(p1.top_y, 132.0 - 6.0 - 4.0);
        assert_eq!(p1.available, 132.0 - 12.0 - 4.0);

        let p2 = PageFrame::new(1, &ctx, &decorations, &options);
        assert_eq!(p2.side, Side::Left);
        assert_eq!(p2.available, 132.0 - 12.0 - 3.0);
        assert_eq!(p2.width(), 90.0);
    }

    #[test]
    fn test_page_number_saturates() {
        let options = LayoutOptions {
            first_page: u32::MAX - 1,
            ..LayoutOptions::default()
        };
        let ctx = ParameterContext::new();
        let decorations = Decorations::default();
        assert_eq!(PageFrame::new(1, &ctx, &decorations, &options).number, u32::MAX);
        assert_eq!(PageFrame::new(5, &ctx, &decorations, &options).number, u32::MAX);
    }
}

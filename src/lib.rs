pub mod error;
pub mod layout;
pub mod timeline;

pub use error::Error;
pub use layout::{layout_json, Layout, LayoutOptions, LayoutResult, Page};
pub use timeline::Timeline;

mod report;
mod root;

pub use report::{render_change, render_funds, render_header, render_stage_stats, stage_glyphs};
pub use root::App;

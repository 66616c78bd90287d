pub mod charts;
pub mod footer;
pub mod header;
pub mod utils;

pub use charts::{dataset_series, draw_bar_chart, draw_line_chart, Series};
pub use footer::draw_footer;
pub use header::draw_header;
pub use utils::{
  centered_rect, feed_color, fmt_opt, overlay_rect, severity_color, status_color, truncate,
};

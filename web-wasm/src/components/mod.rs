pub mod step_indicator;
pub mod upload_area;

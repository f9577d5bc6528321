pub mod object_detector;
pub mod target_class;

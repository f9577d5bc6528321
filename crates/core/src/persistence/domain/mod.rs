pub mod detection_record;
pub mod detection_sink;
pub mod detection_store;
